//! ISO/IEC 9797-1 method 2 padding over 16-byte blocks
//!
//! A `0x80` marker is always appended, followed by zeros up to the next block
//! boundary. Block-aligned input therefore grows by a whole block.

use cipher::block_padding::{Iso7816, RawPadding};

use crate::{Error, Result, constants::BLOCK_SIZE};

/// Pad `data` to a multiple of the block size
pub fn pad(data: &[u8]) -> Vec<u8> {
    let padded_len = (data.len() / BLOCK_SIZE + 1) * BLOCK_SIZE;
    let mut out = Vec::with_capacity(padded_len);
    out.extend_from_slice(data);
    out.resize(padded_len, 0);

    let last_block = padded_len - BLOCK_SIZE;
    Iso7816::raw_pad(&mut out[last_block..], data.len() - last_block);
    out
}

/// Strip padding added by [`pad`]
///
/// The marker must sit inside the final block and be followed only by zeros.
pub fn unpad(padded: &[u8]) -> Result<Vec<u8>> {
    if padded.is_empty() {
        return Err(Error::Framing("empty padded data"));
    }

    let tail_start = padded.len().saturating_sub(BLOCK_SIZE);
    let tail = Iso7816::raw_unpad(&padded[tail_start..])
        .map_err(|_| Error::Framing("padding marker not found"))?;

    Ok(padded[..tail_start + tail.len()].to_vec())
}
