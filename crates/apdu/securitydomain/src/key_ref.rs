//! Key references and key information
//!
//! A [`KeyRef`] names one key slot on the token by key identifier (KID) and
//! key version number (KVN). [`KeyInfo`] describes what a slot currently holds,
//! as reported by GET DATA.

use derive_more::Display;

use crate::{Error, Result, constants::kid};

/// Protocol family a key identifier belongs to
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    /// SCP03 static key set (KIDs 0x01 to 0x03)
    #[display("SCP03")]
    Scp03,
    /// SCP11a SD key
    #[display("SCP11a")]
    Scp11a,
    /// SCP11b SD key
    #[display("SCP11b")]
    Scp11b,
    /// SCP11c SD key
    #[display("SCP11c")]
    Scp11c,
    /// Off-card entity or CA public key (0x10, 0x20 to 0x2F)
    #[display("OCE")]
    Oce,
    /// Anything the token may define beyond the above
    #[display("unknown")]
    Unknown,
}

impl KeyFamily {
    /// Classify a key identifier
    pub const fn of(kid: u8) -> Self {
        match kid {
            kid::SCP03 | kid::SCP03_MAC | kid::SCP03_DEK => Self::Scp03,
            kid::SCP11A => Self::Scp11a,
            kid::SCP11B => Self::Scp11b,
            kid::SCP11C => Self::Scp11c,
            kid::OCE_CA | 0x20..=0x2F => Self::Oce,
            _ => Self::Unknown,
        }
    }

    /// Whether KVN `0xFF` is a meaningful version for this family
    ///
    /// Only the factory SCP03 key set uses it. For SCP11 and OCE keys it would
    /// name no real key.
    pub const fn allows_default_version(self) -> bool {
        !matches!(
            self,
            Self::Scp11a | Self::Scp11b | Self::Scp11c | Self::Oce
        )
    }

    /// Whether this family is one of the SCP11 SD key families
    pub const fn is_scp11(self) -> bool {
        matches!(self, Self::Scp11a | Self::Scp11b | Self::Scp11c)
    }
}

/// Reference to a key slot: key identifier and key version number
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("KeyRef(kid={kid:#04x}, kvn={kvn:#04x})")]
pub struct KeyRef {
    kid: u8,
    kvn: u8,
}

impl KeyRef {
    /// KVN marking factory-default key material
    pub const DEFAULT_KVN: u8 = 0xFF;

    /// Create a validated key reference
    pub fn new(kid: u8, kvn: u8) -> Result<Self> {
        let family = KeyFamily::of(kid);
        if kvn == Self::DEFAULT_KVN && !family.allows_default_version() {
            return Err(Error::configuration(format!(
                "KVN 0xFF is not valid for {family} key {kid:#04x}"
            )));
        }
        Ok(Self { kid, kvn })
    }

    /// Key reference as reported by the token, without validation
    pub(crate) const fn reported(kid: u8, kvn: u8) -> Self {
        Self { kid, kvn }
    }

    /// The factory default SCP03 key set
    pub const fn default_scp03() -> Self {
        Self {
            kid: kid::SCP03,
            kvn: Self::DEFAULT_KVN,
        }
    }

    /// Key identifier
    pub const fn kid(&self) -> u8 {
        self.kid
    }

    /// Key version number
    pub const fn kvn(&self) -> u8 {
        self.kvn
    }

    /// Protocol family of this key
    pub const fn family(&self) -> KeyFamily {
        KeyFamily::of(self.kid)
    }

    /// Wire form used inside tag `0x83`
    pub const fn to_bytes(&self) -> [u8; 2] {
        [self.kid, self.kvn]
    }
}

/// One component of a provisioned key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyComponent {
    /// Key type (for example `0x88` AES, `0xB0` EC public, `0xB1` EC private)
    pub component_type: u8,
    /// Component length in bytes, or a curve reference for EC keys
    pub length: u8,
}

/// Key information entry as returned by enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Slot the entry describes
    pub key_ref: KeyRef,
    /// Components in token order
    pub components: Vec<KeyComponent>,
}

impl KeyInfo {
    /// Parse the value of a `C0` key information data object
    ///
    /// Layout: KID, KVN, then (type, length) pairs. Extended entries carrying
    /// access conditions are truncated to their basic form.
    pub fn from_key_information_data(data: &[u8]) -> Result<Self> {
        let [kid, kvn, rest @ ..] = data else {
            return Err(Error::Framing("key information entry shorter than two bytes"));
        };

        let components = rest
            .chunks_exact(2)
            .map(|pair| KeyComponent {
                component_type: pair[0],
                length: pair[1],
            })
            .collect();

        Ok(Self {
            key_ref: KeyRef::reported(*kid, *kvn),
            components,
        })
    }

    /// Number of key components
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Type of the first component
    pub fn key_type(&self) -> Option<u8> {
        self.components.first().map(|c| c.component_type)
    }
}
