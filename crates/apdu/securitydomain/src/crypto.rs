//! Cryptographic primitives shared by SCP03 and SCP11
//!
//! AES-128 block operations, AES-CMAC, the NIST SP800-108 counter mode KDF used
//! by SCP03 and the ANSI X9.63 KDF used by SCP11.

use aes::Aes128;
use cipher::{
    BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit, block_padding::NoPadding,
    generic_array::GenericArray,
};
use cmac::{Cmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::{
    Error, Result,
    constants::{BLOCK_SIZE, KEY_LENGTH},
};

/// A 16-byte AES block or key
pub type Block = [u8; BLOCK_SIZE];

/// Check that `key` is an AES-128 key
///
/// Runs before any cipher is instantiated so a wrong length is reported as a
/// configuration problem rather than a cipher failure.
pub fn check_key(key: &[u8]) -> Result<&[u8; KEY_LENGTH]> {
    key.try_into().map_err(|_| {
        Error::configuration(format!(
            "AES-128 key must be {KEY_LENGTH} bytes, got {}",
            key.len()
        ))
    })
}

/// AES-CMAC over the concatenation of `parts`
pub fn cmac(key: &[u8], parts: &[&[u8]]) -> Result<Block> {
    let key = check_key(key)?;
    let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(key)
        .map_err(|_| Error::configuration("invalid CMAC key"))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().into())
}

/// Encrypt a single block with AES-ECB
pub fn ecb_encrypt_block(key: &[u8], block: &Block) -> Result<Block> {
    let key = check_key(key)?;
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut out = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut out);
    Ok(out.into())
}

/// AES-CBC encryption of block-aligned data
pub fn cbc_encrypt(key: &[u8], iv: &Block, data: &[u8]) -> Result<Vec<u8>> {
    let key = check_key(key)?;
    if data.len() % BLOCK_SIZE != 0 {
        return Err(Error::Framing("plaintext is not block aligned"));
    }

    let mut buf = data.to_vec();
    cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
        .map_err(|_| Error::configuration("invalid CBC key or IV"))?
        .encrypt_padded_mut::<NoPadding>(&mut buf, data.len())
        .map_err(|_| Error::Framing("plaintext is not block aligned"))?;
    Ok(buf)
}

/// AES-CBC decryption of block-aligned data
pub fn cbc_decrypt(key: &[u8], iv: &Block, data: &[u8]) -> Result<Vec<u8>> {
    let key = check_key(key)?;
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(Error::Framing("ciphertext is not block aligned"));
    }

    let mut buf = data.to_vec();
    let len = cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
        .map_err(|_| Error::configuration("invalid CBC key or IV"))?
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| Error::Framing("ciphertext is not block aligned"))?
        .len();
    buf.truncate(len);
    Ok(buf)
}

/// SCP03 key derivation (NIST SP800-108 KDF in counter mode, AES-CMAC PRF)
///
/// Produces `length_bits / 8` bytes, at most one block.
pub fn derive_scp03(
    key: &[u8],
    constant: u8,
    context: &[u8],
    length_bits: u16,
) -> Result<Zeroizing<Vec<u8>>> {
    if length_bits == 0 || length_bits > 128 || length_bits % 8 != 0 {
        return Err(Error::configuration(format!(
            "unsupported derivation length of {length_bits} bits"
        )));
    }

    let mut label = [0u8; 16];
    label[11] = constant;
    // label[12] is the separation indicator
    label[13..15].copy_from_slice(&length_bits.to_be_bytes());
    label[15] = 0x01;

    let block = Zeroizing::new(cmac(key, &[&label[..], context])?);
    Ok(Zeroizing::new(block[..usize::from(length_bits / 8)].to_vec()))
}

/// ANSI X9.63 KDF with SHA-256
pub fn x963_kdf(shared_secret: &[u8], shared_info: &[u8], length: usize) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(length + 32));
    let mut counter: u32 = 1;
    while out.len() < length {
        let digest = Sha256::new()
            .chain_update(shared_secret)
            .chain_update(counter.to_be_bytes())
            .chain_update(shared_info)
            .finalize();
        out.extend_from_slice(&digest);
        counter += 1;
    }
    out.truncate(length);
    out
}

/// Key check value: first three bytes of the key encrypting a block of `0x01`
pub fn key_check_value(key: &[u8]) -> Result<[u8; 3]> {
    let block = ecb_encrypt_block(key, &[0x01; BLOCK_SIZE])?;
    Ok([block[0], block[1], block[2]])
}

/// Encrypt key material under the data encryption key (AES-CBC, zero IV)
pub fn wrap_key(dek: &[u8], key_material: &[u8]) -> Result<Vec<u8>> {
    cbc_encrypt(dek, &[0u8; BLOCK_SIZE], key_material)
}

/// Constant-time equality
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    const KEY: [u8; 16] = hex!("404142434445464748494A4B4C4D4E4F");

    #[test]
    fn test_check_key_lengths() {
        assert!(check_key(&KEY).is_ok());
        assert!(matches!(check_key(&KEY[..15]), Err(Error::Configuration(_))));
        assert!(matches!(check_key(&[0u8; 32]), Err(Error::Configuration(_))));
        assert!(matches!(cmac(&[0u8; 24], &[]), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_cmac_rfc4493() {
        // RFC 4493 example 2
        let key = hex!("2b7e151628aed2a6abf7158809cf4f3c");
        let msg = hex!("6bc1bee22e409f96e93d7e117393172a");
        assert_eq!(
            cmac(&key, &[&msg[..8], &msg[8..]]).unwrap(),
            hex!("070a16b46b4d4144f79bdd9dd04a287c")
        );
    }

    #[test]
    fn test_derive_scp03_session_keys() {
        let context = hex!("0102030405060708 A1A2A3A4A5A6A7A8");
        let s_enc = derive_scp03(&KEY, 0x04, &context, 0x80).unwrap();
        let s_mac = derive_scp03(&KEY, 0x06, &context, 0x80).unwrap();
        let s_rmac = derive_scp03(&KEY, 0x07, &context, 0x80).unwrap();
        assert_eq!(s_enc.as_slice(), hex!("77ab873f813a0d647eab50f7380b769b"));
        assert_eq!(s_mac.as_slice(), hex!("1193d25e820a5d2b104a97b1f46fb413"));
        assert_eq!(s_rmac.as_slice(), hex!("17f0bd4e1986e45a262d5e22b3086203"));

        let card_cryptogram = derive_scp03(&s_mac, 0x00, &context, 0x40).unwrap();
        assert_eq!(card_cryptogram.as_slice(), hex!("d5ee72813ea0c6ac"));

        assert!(derive_scp03(&KEY, 0x04, &context, 0x100).is_err());
    }

    #[test]
    fn test_cbc_round_trip_and_alignment() {
        let iv = [0x11; 16];
        let plain = hex!("000102030405060708090A0B0C0D0E0F 101112131415161718191A1B1C1D1E1F");
        let ct = cbc_encrypt(&KEY, &iv, &plain).unwrap();
        assert_ne!(ct, plain);
        assert_eq!(cbc_decrypt(&KEY, &iv, &ct).unwrap(), plain);

        assert!(matches!(
            cbc_encrypt(&KEY, &iv, &plain[..5]),
            Err(Error::Framing(_))
        ));
        assert!(matches!(cbc_decrypt(&KEY, &iv, &[]), Err(Error::Framing(_))));
    }

    #[test]
    fn test_key_check_value_and_wrap() {
        assert_eq!(key_check_value(&KEY).unwrap(), hex!("504a77"));

        let new_key = hex!("000102030405060708090a0b0c0d0e0f");
        assert_eq!(key_check_value(&new_key).unwrap(), hex!("c35280"));
        assert_eq!(
            wrap_key(&KEY, &new_key).unwrap(),
            hex!("3d0fa4b855d2a5aa4954b8b5df582a3a")
        );
    }

    #[test]
    fn test_x963_kdf_length() {
        let out = x963_kdf(&[0xAB; 64], &hex!("3C8810"), 80);
        assert_eq!(out.len(), 80);
        // The first block is SHA-256(Z || 00000001 || info)
        let first = Sha256::new()
            .chain_update([0xAB; 64])
            .chain_update(1u32.to_be_bytes())
            .chain_update(hex!("3C8810"))
            .finalize();
        assert_eq!(&out[..32], first.as_slice());
    }

    #[test]
    fn test_ct_eq() {
        assert!(ct_eq(&hex!("0102"), &hex!("0102")));
        assert!(!ct_eq(&hex!("0102"), &hex!("0103")));
        assert!(!ct_eq(&hex!("0102"), &hex!("010203")));
    }
}
