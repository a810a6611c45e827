//! Chained C-MAC and R-MAC
//!
//! The command MAC covers the previous chaining value, the header with the
//! secure messaging bit set and Lc already counting the tag, and the data field.
//! The full 16-byte CMAC becomes the next chaining value; only 8 bytes travel.
//! The response MAC covers the current chaining value, the response data and the
//! status word, and does not advance the chain.

use bytes::{BufMut, BytesMut};
use nexum_apdu_core::{ApduFormat, ApduResponse, Command, Response, StatusWord};

use crate::{
    Error, Result,
    constants::{MAC_LENGTH, cla},
    crypto::{Block, check_key, cmac, ct_eq},
};

/// Resolve [`ApduFormat::Auto`] for a fully wrapped command
pub(crate) fn concrete_format(format: ApduFormat, wrapped: &Command) -> ApduFormat {
    match format {
        ApduFormat::Auto if wrapped.needs_extended() => ApduFormat::Extended,
        ApduFormat::Auto => ApduFormat::Short,
        other => other,
    }
}

/// Append a C-MAC to `command` using automatic length encoding
pub fn mac_command(command: &Command, key: &[u8], chaining_value: &Block) -> Result<(Command, Block)> {
    mac_command_with(ApduFormat::Auto, command, key, chaining_value)
}

/// Append a C-MAC to `command`, computing it over the given length encoding
///
/// Returns the MAC'd command and the new chaining value.
pub fn mac_command_with(
    format: ApduFormat,
    command: &Command,
    key: &[u8],
    chaining_value: &Block,
) -> Result<(Command, Block)> {
    check_key(key)?;

    let data = command.data.as_deref().unwrap_or_default();
    let mut padded = BytesMut::with_capacity(data.len() + MAC_LENGTH);
    padded.put_slice(data);
    padded.put_bytes(0, MAC_LENGTH);

    let mut wrapped = Command::new(
        command.cla | cla::SECURE_MESSAGING,
        command.ins,
        command.p1,
        command.p2,
    );
    wrapped.data = Some(padded.freeze());
    wrapped.le = command.le;

    // Le is never covered by the MAC
    let mut header_only = wrapped.clone();
    header_only.le = None;
    let encoded = header_only.encode(concrete_format(format, &wrapped))?;
    let mac_input = &encoded[..encoded.len() - MAC_LENGTH];

    let chain = cmac(key, &[&chaining_value[..], mac_input])?;

    let mut with_tag = BytesMut::with_capacity(data.len() + MAC_LENGTH);
    with_tag.put_slice(data);
    with_tag.put_slice(&chain[..MAC_LENGTH]);
    wrapped.data = Some(with_tag.freeze());

    Ok((wrapped, chain))
}

/// Compute the 8-byte R-MAC a token attaches to `body`
pub fn compute_rmac(
    key: &[u8],
    chaining_value: &Block,
    body: &[u8],
    status: StatusWord,
) -> Result<[u8; MAC_LENGTH]> {
    let full = cmac(key, &[&chaining_value[..], body, &status.to_bytes()[..]])?;
    let mut tag = [0u8; MAC_LENGTH];
    tag.copy_from_slice(&full[..MAC_LENGTH]);
    Ok(tag)
}

/// Verify and strip the R-MAC of a response
///
/// The tag is compared in constant time. On mismatch the response must be
/// discarded as a whole.
pub fn verify_rmac(response: &Response, key: &[u8], chaining_value: &Block) -> Result<Response> {
    check_key(key)?;

    let payload = response.payload();
    if payload.len() < MAC_LENGTH {
        return Err(Error::Framing("response too short to carry an R-MAC"));
    }

    let (body, tag) = payload.split_at(payload.len() - MAC_LENGTH);
    let expected = compute_rmac(key, chaining_value, body, response.status())?;
    if !ct_eq(&expected, tag) {
        return Err(Error::Integrity("R-MAC mismatch"));
    }

    Ok(Response::new(payload.slice(..body.len()), response.status()))
}
