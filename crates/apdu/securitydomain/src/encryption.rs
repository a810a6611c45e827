//! Channel encryption of APDU data fields
//!
//! Each data field is padded and encrypted with AES-CBC. The IV is the encryption
//! of a block holding the command counter, so it never repeats within a session.

use crate::{
    Result,
    crypto::{Block, cbc_decrypt, cbc_encrypt, check_key, ecb_encrypt_block},
    padding::{pad, unpad},
};

/// Which side of the exchange a data field belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to token
    Command,
    /// Token to host
    Response,
}

impl Direction {
    const fn marker(self) -> u8 {
        match self {
            Self::Command => 0x00,
            Self::Response => 0x80,
        }
    }
}

/// Derive the IV for `counter` in the given direction
pub fn derive_iv(key: &[u8], counter: u32, direction: Direction) -> Result<Block> {
    let mut seed = [0u8; 16];
    seed[0] = direction.marker();
    seed[12..].copy_from_slice(&counter.to_be_bytes());
    ecb_encrypt_block(key, &seed)
}

/// Encrypt a command data field
pub fn encrypt(payload: &[u8], key: &[u8], counter: u32) -> Result<Vec<u8>> {
    encrypt_in(Direction::Command, payload, key, counter)
}

/// Decrypt a command data field
pub fn decrypt(ciphertext: &[u8], key: &[u8], counter: u32) -> Result<Vec<u8>> {
    decrypt_in(Direction::Command, ciphertext, key, counter)
}

/// Encrypt a data field travelling in `direction`
pub fn encrypt_in(
    direction: Direction,
    payload: &[u8],
    key: &[u8],
    counter: u32,
) -> Result<Vec<u8>> {
    check_key(key)?;
    let iv = derive_iv(key, counter, direction)?;
    cbc_encrypt(key, &iv, &pad(payload))
}

/// Decrypt a data field travelling in `direction`
pub fn decrypt_in(
    direction: Direction,
    ciphertext: &[u8],
    key: &[u8],
    counter: u32,
) -> Result<Vec<u8>> {
    check_key(key)?;
    let iv = derive_iv(key, counter, direction)?;
    unpad(&cbc_decrypt(key, &iv, ciphertext)?)
}
