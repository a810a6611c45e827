//! Static and session key sets
//!
//! Both types wipe their key material when dropped.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Result, constants::KEY_LENGTH, crypto::check_key};

/// A single AES-128 key
pub type AesKey = [u8; KEY_LENGTH];

/// Factory default SCP03 key value
const DEFAULT_KEY: AesKey = [
    0x40, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4A, 0x4B, 0x4C, 0x4D, 0x4E, 0x4F,
];

fn key_from_slice(key: &[u8]) -> Result<AesKey> {
    Ok(*check_key(key)?)
}

/// Static SCP03 keys shared with the token
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StaticKeys {
    enc: AesKey,
    mac: AesKey,
    dek: Option<AesKey>,
}

impl StaticKeys {
    /// Create a key set without a data encryption key
    pub const fn new(enc: AesKey, mac: AesKey) -> Self {
        Self { enc, mac, dek: None }
    }

    /// Create a key set with all three keys
    pub const fn new_with_dek(enc: AesKey, mac: AesKey, dek: AesKey) -> Self {
        Self {
            enc,
            mac,
            dek: Some(dek),
        }
    }

    /// Create a key set from slices, checking every length
    pub fn from_slices(enc: &[u8], mac: &[u8], dek: Option<&[u8]>) -> Result<Self> {
        Ok(Self {
            enc: key_from_slice(enc)?,
            mac: key_from_slice(mac)?,
            dek: dek.map(key_from_slice).transpose()?,
        })
    }

    /// The well-known factory key set
    pub const fn default_keys() -> Self {
        Self::new_with_dek(DEFAULT_KEY, DEFAULT_KEY, DEFAULT_KEY)
    }

    /// Key encryption key
    pub fn enc(&self) -> &[u8] {
        &self.enc
    }

    /// Key MAC key
    pub fn mac(&self) -> &[u8] {
        &self.mac
    }

    /// Data encryption key
    pub fn dek(&self) -> Option<&[u8]> {
        self.dek.as_ref().map(|key| key.as_slice())
    }
}

impl std::fmt::Debug for StaticKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKeys")
            .field("has_dek", &self.dek.is_some())
            .finish_non_exhaustive()
    }
}

/// Keys of one established secure channel session
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    s_enc: AesKey,
    s_mac: AesKey,
    s_rmac: AesKey,
    dek: Option<AesKey>,
}

impl SessionKeys {
    /// Create a session key set
    pub const fn new(s_enc: AesKey, s_mac: AesKey, s_rmac: AesKey, dek: Option<AesKey>) -> Self {
        Self {
            s_enc,
            s_mac,
            s_rmac,
            dek,
        }
    }

    /// Create a session key set from slices, checking every length
    pub fn from_slices(
        s_enc: &[u8],
        s_mac: &[u8],
        s_rmac: &[u8],
        dek: Option<&[u8]>,
    ) -> Result<Self> {
        Ok(Self {
            s_enc: key_from_slice(s_enc)?,
            s_mac: key_from_slice(s_mac)?,
            s_rmac: key_from_slice(s_rmac)?,
            dek: dek.map(key_from_slice).transpose()?,
        })
    }

    /// Session encryption key
    pub fn s_enc(&self) -> &[u8] {
        &self.s_enc
    }

    /// Session command MAC key
    pub fn s_mac(&self) -> &[u8] {
        &self.s_mac
    }

    /// Session response MAC key
    pub fn s_rmac(&self) -> &[u8] {
        &self.s_rmac
    }

    /// Data encryption key for key provisioning
    pub fn dek(&self) -> Option<&[u8]> {
        self.dek.as_ref().map(|key| key.as_slice())
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("has_dek", &self.dek.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;
    use crate::Error;

    #[test]
    fn test_default_keys() {
        let keys = StaticKeys::default_keys();
        assert_eq!(keys.enc(), hex!("404142434445464748494A4B4C4D4E4F"));
        assert_eq!(keys.mac(), keys.enc());
        assert_eq!(keys.dek(), Some(keys.enc()));
    }

    #[test]
    fn test_from_slices_checks_lengths() {
        let key = [0x11; 16];
        assert!(StaticKeys::from_slices(&key, &key, None).is_ok());
        assert!(matches!(
            StaticKeys::from_slices(&key, &key[..8], None),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            SessionKeys::from_slices(&key, &key, &key, Some(&[0u8; 24])),
            Err(Error::Configuration(_))
        ));
        let session = SessionKeys::from_slices(&key, &key, &[0x22; 16], None).unwrap();
        assert_eq!(session.s_rmac(), [0x22; 16]);
        assert!(session.dek().is_none());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let rendered = format!("{:?}", StaticKeys::default_keys());
        assert!(!rendered.contains("64"));
        assert!(rendered.contains("has_dek"));
    }
}
