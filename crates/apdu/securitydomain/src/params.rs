//! Parameters for opening a secure channel
//!
//! [`ScpKeyParams`] is a closed set: SCP03 carries static symmetric keys, SCP11
//! carries the Security Domain public key and, for the mutually authenticated
//! variants, the off-card entity credentials.

use p256::{PublicKey, SecretKey};

use crate::{
    Error, Result,
    certificate::verify_chain,
    constants::ins,
    key_ref::{KeyFamily, KeyRef},
    keys::StaticKeys,
};

/// Parameters for an SCP03 session
#[derive(Debug, Clone)]
pub struct Scp03KeyParams {
    key_ref: KeyRef,
    keys: StaticKeys,
}

impl Scp03KeyParams {
    /// Create SCP03 parameters for the key set at `key_ref`
    pub fn new(key_ref: KeyRef, keys: StaticKeys) -> Result<Self> {
        if key_ref.family() != KeyFamily::Scp03 {
            return Err(Error::configuration(format!(
                "{key_ref} is not an SCP03 key set"
            )));
        }
        Ok(Self { key_ref, keys })
    }

    /// Key set the channel authenticates against
    pub const fn key_ref(&self) -> KeyRef {
        self.key_ref
    }

    /// Static keys
    pub const fn keys(&self) -> &StaticKeys {
        &self.keys
    }
}

impl Default for Scp03KeyParams {
    /// Factory key set `KeyRef(0x01, 0xFF)` with the well-known keys
    fn default() -> Self {
        Self {
            key_ref: KeyRef::default_scp03(),
            keys: StaticKeys::default_keys(),
        }
    }
}

/// Credentials of the off-card entity for SCP11a and SCP11c
#[derive(Debug, Clone)]
pub struct OceCredentials {
    key_ref: KeyRef,
    secret_key: SecretKey,
    certificates: Vec<Vec<u8>>,
}

impl OceCredentials {
    /// Create OCE credentials
    ///
    /// `certificates` is the OCE chain in DER, ordered from the CA's child to
    /// the leaf matching `secret_key`.
    pub fn new(key_ref: KeyRef, secret_key: SecretKey, certificates: Vec<Vec<u8>>) -> Result<Self> {
        if certificates.is_empty() {
            return Err(Error::configuration("OCE certificate chain is empty"));
        }
        Ok(Self {
            key_ref,
            secret_key,
            certificates,
        })
    }

    /// Reference of the OCE CA key on the token
    pub const fn key_ref(&self) -> KeyRef {
        self.key_ref
    }

    /// Static OCE private key
    pub const fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// OCE certificate chain
    pub fn certificates(&self) -> &[Vec<u8>] {
        &self.certificates
    }
}

/// The three SCP11 variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scp11Variant {
    /// Mutual authentication, OCE certificate uploaded
    A,
    /// Card authentication only
    B,
    /// Mutual authentication with offline scripting support
    C,
}

impl Scp11Variant {
    /// Variant selected by an SD key identifier
    pub const fn from_family(family: KeyFamily) -> Option<Self> {
        match family {
            KeyFamily::Scp11a => Some(Self::A),
            KeyFamily::Scp11b => Some(Self::B),
            KeyFamily::Scp11c => Some(Self::C),
            _ => None,
        }
    }

    /// Parameter byte sent alongside the SCP identifier
    pub const fn parameters(self) -> u8 {
        match self {
            Self::A => 0x01,
            Self::B => 0x00,
            Self::C => 0x03,
        }
    }

    /// Instruction carrying the key agreement
    pub const fn instruction(self) -> u8 {
        match self {
            Self::B => ins::INTERNAL_AUTHENTICATE,
            Self::A | Self::C => ins::EXTERNAL_AUTHENTICATE,
        }
    }

    /// Whether OCE credentials take part in the handshake
    pub const fn is_mutual(self) -> bool {
        !matches!(self, Self::B)
    }
}

/// Parameters for an SCP11 session
#[derive(Debug, Clone)]
pub struct Scp11KeyParams {
    key_ref: KeyRef,
    variant: Scp11Variant,
    pk_sd: PublicKey,
    oce: Option<OceCredentials>,
}

impl Scp11KeyParams {
    /// Create SCP11 parameters
    ///
    /// SCP11b must not carry OCE credentials; SCP11a and SCP11c require them.
    pub fn new(key_ref: KeyRef, pk_sd: PublicKey, oce: Option<OceCredentials>) -> Result<Self> {
        let variant = Scp11Variant::from_family(key_ref.family()).ok_or_else(|| {
            Error::configuration(format!("{key_ref} is not an SCP11 key"))
        })?;

        match (variant.is_mutual(), oce.is_some()) {
            (true, false) => {
                return Err(Error::configuration(
                    "SCP11a and SCP11c require OCE credentials",
                ));
            }
            (false, true) => {
                return Err(Error::configuration("SCP11b takes no OCE credentials"));
            }
            _ => {}
        }

        Ok(Self {
            key_ref,
            variant,
            pk_sd,
            oce,
        })
    }

    /// Create SCP11 parameters from the SD certificate chain
    ///
    /// The chain is verified from `anchor` down and the leaf key becomes the SD
    /// static public key.
    pub fn from_certificate_chain(
        key_ref: KeyRef,
        anchor: &PublicKey,
        chain: &[Vec<u8>],
        oce: Option<OceCredentials>,
    ) -> Result<Self> {
        let pk_sd = verify_chain(anchor, chain)?;
        Self::new(key_ref, pk_sd, oce)
    }

    /// SD key the channel authenticates against
    pub const fn key_ref(&self) -> KeyRef {
        self.key_ref
    }

    /// SCP11 variant
    pub const fn variant(&self) -> Scp11Variant {
        self.variant
    }

    /// SD static public key
    pub const fn pk_sd(&self) -> &PublicKey {
        &self.pk_sd
    }

    /// OCE credentials, present for SCP11a and SCP11c
    pub const fn oce(&self) -> Option<&OceCredentials> {
        self.oce.as_ref()
    }
}

/// Parameters for any supported secure channel
#[derive(Debug, Clone)]
pub enum ScpKeyParams {
    /// SCP03
    Scp03(Scp03KeyParams),
    /// SCP11a, SCP11b or SCP11c
    Scp11(Scp11KeyParams),
}

impl ScpKeyParams {
    /// Key the channel authenticates against
    pub const fn key_ref(&self) -> KeyRef {
        match self {
            Self::Scp03(params) => params.key_ref(),
            Self::Scp11(params) => params.key_ref(),
        }
    }
}

impl From<Scp03KeyParams> for ScpKeyParams {
    fn from(params: Scp03KeyParams) -> Self {
        Self::Scp03(params)
    }
}

impl From<Scp11KeyParams> for ScpKeyParams {
    fn from(params: Scp11KeyParams) -> Self {
        Self::Scp11(params)
    }
}
