//! SCP11 handshake
//!
//! One ECDH key agreement round trip yields the session keys and a receipt the
//! token computed over the exchange. For SCP11a and SCP11c the OCE certificate
//! chain is uploaded first so the token can authenticate the host's static key.

use bytes::BytesMut;
use nexum_apdu_core::{ApduCommand, ApduResponse, CardTransport, Command};
use p256::{
    PublicKey, SecretKey,
    ecdh::diffie_hellman,
    elliptic_curve::sec1::ToEncodedPoint,
};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::ScpState;
use crate::{
    Error, Reply, Result,
    commands::{
        ExternalAuthenticateCommand, InternalAuthenticateCommand, PerformSecurityOperationCommand,
    },
    constants::{KEY_LENGTH, scp11, tag},
    crypto::{Block, cmac, ct_eq, x963_kdf},
    keys::SessionKeys,
    params::{Scp11KeyParams, Scp11Variant},
    processor::ApduProcessor,
    tlv,
};

/// Receipt key, S-ENC, S-MAC, S-RMAC and DEK
const KEY_MATERIAL_LENGTH: usize = 5 * KEY_LENGTH;

/// Build the key agreement request carrying the ephemeral OCE public key
fn key_agreement_data(variant: Scp11Variant, epk_oce: &PublicKey) -> Vec<u8> {
    let mut crt = BytesMut::new();
    tlv::put(&mut crt, tag::SCP_IDENTIFIER, &[scp11::SCP_ID, variant.parameters()]);
    tlv::put(&mut crt, tag::KEY_USAGE, &[scp11::KEY_USAGE]);
    tlv::put(&mut crt, tag::KEY_TYPE, &[scp11::KEY_TYPE]);
    tlv::put(&mut crt, tag::KEY_LENGTH, &[scp11::KEY_LENGTH]);

    let mut data = BytesMut::new();
    tlv::put(&mut data, tag::CONTROL_REFERENCE, &crt);
    tlv::put(
        &mut data,
        tag::EPHEMERAL_PUBLIC_KEY,
        epk_oce.to_encoded_point(false).as_bytes(),
    );
    data.to_vec()
}

fn ecdh(secret: &SecretKey, public: &PublicKey) -> Zeroizing<Vec<u8>> {
    let shared = diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    Zeroizing::new(shared.raw_secret_bytes().to_vec())
}

/// Upload the OCE certificate chain, stopping at the first refusal
fn upload_oce_certificates<T: CardTransport>(
    processor: &mut ApduProcessor<T>,
    params: &Scp11KeyParams,
) -> Result<Reply<()>> {
    let Some(oce) = params.oce() else {
        return Ok(Reply::Ok(()));
    };

    let certificates = oce.certificates();
    for (index, certificate) in certificates.iter().enumerate() {
        let last = index + 1 == certificates.len();
        let command =
            PerformSecurityOperationCommand::certificate(oce.key_ref(), certificate.clone(), last);
        let response = processor.transmit(&command.to_command())?;
        if !response.is_success() {
            debug!(index, status = %response.status(), "OCE certificate refused");
            return Ok(Reply::Declined(response.status()));
        }
    }
    Ok(Reply::Ok(()))
}

/// Run the SCP11 handshake with the given ephemeral OCE key
pub fn open<T: CardTransport>(
    processor: &mut ApduProcessor<T>,
    params: &Scp11KeyParams,
    esk_oce: SecretKey,
) -> Result<Reply<ScpState>> {
    let key_ref = params.key_ref();
    let variant = params.variant();
    debug!(%key_ref, ?variant, "Starting SCP11 handshake");

    if let Reply::Declined(status) = upload_oce_certificates(processor, params)? {
        return Ok(Reply::Declined(status));
    }

    let data = key_agreement_data(variant, &esk_oce.public_key());
    let command: Command = match variant {
        Scp11Variant::B => InternalAuthenticateCommand::new(key_ref, data.clone()).to_command(),
        Scp11Variant::A | Scp11Variant::C => {
            ExternalAuthenticateCommand::scp11(key_ref, data.clone()).to_command()
        }
    };

    let response = processor.transmit(&command)?;
    if !response.is_success() {
        debug!(status = %response.status(), "Key agreement declined");
        return Ok(Reply::Declined(response.status()));
    }

    let mut epk_sd_tlv = None;
    let mut receipt = None;
    for item in tlv::split(response.payload())? {
        match item.tag {
            tag::EPHEMERAL_PUBLIC_KEY => epk_sd_tlv = Some(item),
            tag::RECEIPT => receipt = Some(item.value),
            _ => {}
        }
    }
    let epk_sd_tlv = epk_sd_tlv.ok_or(Error::Framing("key agreement response lacks SD key"))?;
    let receipt = receipt.ok_or(Error::Framing("key agreement response lacks receipt"))?;
    let epk_sd = PublicKey::from_sec1_bytes(epk_sd_tlv.value)
        .map_err(|_| Error::Framing("SD ephemeral key is not a P-256 point"))?;

    let static_secret = match params.oce() {
        Some(oce) => oce.secret_key(),
        None => &esk_oce,
    };
    let mut shared = ecdh(&esk_oce, &epk_sd);
    shared.extend_from_slice(&ecdh(static_secret, params.pk_sd()));

    let shared_info = [scp11::KEY_USAGE, scp11::KEY_TYPE, scp11::KEY_LENGTH];
    let material = x963_kdf(&shared, &shared_info, KEY_MATERIAL_LENGTH);
    let (receipt_key, session) = material.split_at(KEY_LENGTH);

    let expected: Block = cmac(receipt_key, &[&data, epk_sd_tlv.raw])?;
    if !ct_eq(&expected, receipt) {
        warn!(%key_ref, "SCP11 receipt mismatch");
        return Err(Error::Authentication("receipt mismatch"));
    }

    let keys = SessionKeys::from_slices(
        &session[..KEY_LENGTH],
        &session[KEY_LENGTH..2 * KEY_LENGTH],
        &session[2 * KEY_LENGTH..3 * KEY_LENGTH],
        Some(&session[3 * KEY_LENGTH..]),
    )?;

    debug!("SCP11 channel established");
    Ok(Reply::Ok(ScpState::new(keys, expected)))
}
