//! Certificate chain handling for SCP11
//!
//! The Security Domain presents its static key inside an X.509 chain. Every link
//! is an ECDSA P-256 signature with SHA-256.

use p256::{
    PublicKey,
    ecdsa::{Signature, VerifyingKey, signature::Verifier},
};
use tracing::debug;
use x509_cert::{
    Certificate,
    der::{Decode, Encode, asn1::ObjectIdentifier},
    ext::pkix::SubjectKeyIdentifier,
};

use crate::{Error, Result};

/// ecdsa-with-SHA256
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

/// id-ce-subjectKeyIdentifier
const SUBJECT_KEY_IDENTIFIER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.14");

fn parse(der: &[u8]) -> Result<Certificate> {
    Certificate::from_der(der).map_err(|_| Error::Authentication("malformed certificate"))
}

/// Public key carried in a certificate
pub fn public_key(cert: &Certificate) -> Result<PublicKey> {
    let spki = &cert.tbs_certificate.subject_public_key_info;
    PublicKey::from_sec1_bytes(spki.subject_public_key.raw_bytes())
        .map_err(|_| Error::Authentication("certificate key is not a P-256 point"))
}

fn verify_signature(cert: &Certificate, issuer: &PublicKey) -> Result<()> {
    if cert.signature_algorithm.oid != ECDSA_WITH_SHA256 {
        return Err(Error::Authentication("unsupported certificate signature algorithm"));
    }

    let tbs = cert
        .tbs_certificate
        .to_der()
        .map_err(|_| Error::Authentication("certificate body cannot be re-encoded"))?;
    let raw = cert
        .signature
        .as_bytes()
        .ok_or(Error::Authentication("certificate signature has unused bits"))?;
    let signature =
        Signature::from_der(raw).map_err(|_| Error::Authentication("malformed certificate signature"))?;

    VerifyingKey::from(issuer)
        .verify(&tbs, &signature)
        .map_err(|_| Error::Authentication("certificate signature does not verify"))
}

/// Verify a certificate chain ordered from the anchor's child to the leaf
///
/// Returns the leaf's public key.
pub fn verify_chain(anchor: &PublicKey, chain: &[Vec<u8>]) -> Result<PublicKey> {
    if chain.is_empty() {
        return Err(Error::Authentication("empty certificate chain"));
    }

    let mut issuer = *anchor;
    for (depth, der) in chain.iter().enumerate() {
        let cert = parse(der)?;
        verify_signature(&cert, &issuer)?;
        debug!(depth, "Certificate verified");
        issuer = public_key(&cert)?;
    }

    Ok(issuer)
}

/// Subject key identifier extension of a DER certificate, if present
pub fn subject_key_identifier(der: &[u8]) -> Result<Option<Vec<u8>>> {
    let cert = parse(der)?;
    let Some(extensions) = cert.tbs_certificate.extensions.as_ref() else {
        return Ok(None);
    };

    extensions
        .iter()
        .find(|ext| ext.extn_id == SUBJECT_KEY_IDENTIFIER)
        .map(|ext| {
            SubjectKeyIdentifier::from_der(ext.extn_value.as_bytes())
                .map(|ski| ski.0.as_bytes().to_vec())
                .map_err(|_| Error::Authentication("malformed subject key identifier"))
        })
        .transpose()
}
