//! TLV helpers
//!
//! Structured payloads (key information, card recognition data, CA identifiers)
//! go through the BER parser of `iso7816-tlv`. Several Security Domain tags, such
//! as `B0`, `B1`, `F0` and `BF21`, have the constructed bit set while carrying
//! opaque bytes, so building and splitting those is done here without looking
//! at the tag class.

use bytes::{BufMut, BytesMut};
use iso7816_tlv::ber::{Tlv, Value};

use crate::{Error, Result};

/// A TLV sliced out of a byte string without interpreting its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTlv<'a> {
    /// Tag, one or two bytes
    pub tag: u16,
    /// Value bytes
    pub value: &'a [u8],
    /// Complete encoding including tag and length
    pub raw: &'a [u8],
}

fn put_tag(buf: &mut BytesMut, tag: u16) {
    if tag > 0xFF {
        buf.put_u16(tag);
    } else {
        buf.put_u8(tag as u8);
    }
}

fn put_length(buf: &mut BytesMut, len: usize) {
    if len < 0x80 {
        buf.put_u8(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let significant = &bytes[bytes.iter().take_while(|byte| **byte == 0).count()..];
    buf.put_u8(0x80 | significant.len() as u8);
    buf.put_slice(significant);
}

/// Append one TLV to `buf`
pub fn put(buf: &mut BytesMut, tag: u16, value: &[u8]) {
    put_tag(buf, tag);
    put_length(buf, value.len());
    buf.put_slice(value);
}

/// Encode one TLV
pub fn encode(tag: u16, value: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(value.len() + 5);
    put(&mut buf, tag, value);
    buf.to_vec()
}

fn read_tag(data: &[u8]) -> Result<(u16, usize)> {
    let first = *data.first().ok_or(Error::Framing("missing TLV tag"))?;
    if first & 0x1F != 0x1F {
        return Ok((u16::from(first), 1));
    }
    let second = *data.get(1).ok_or(Error::Framing("truncated TLV tag"))?;
    if second & 0x80 != 0 {
        return Err(Error::Framing("TLV tags longer than two bytes are unsupported"));
    }
    Ok((u16::from_be_bytes([first, second]), 2))
}

fn read_length(data: &[u8]) -> Result<(usize, usize)> {
    let first = *data.first().ok_or(Error::Framing("missing TLV length"))?;
    match first {
        0x00..=0x7F => Ok((usize::from(first), 1)),
        0x81..=0x84 => {
            let count = usize::from(first & 0x7F);
            let bytes = data
                .get(1..=count)
                .ok_or(Error::Framing("truncated TLV length"))?;
            let len = bytes
                .iter()
                .fold(0usize, |acc, byte| (acc << 8) | usize::from(*byte));
            Ok((len, 1 + count))
        }
        // Lengths longer than four bytes exceed any APDU chain
        _ => Err(Error::Framing("unsupported TLV length encoding")),
    }
}

/// Split a concatenation of TLVs
pub fn split(mut data: &[u8]) -> Result<Vec<RawTlv<'_>>> {
    let mut out = Vec::new();
    while !data.is_empty() {
        let (tag, tag_len) = read_tag(data)?;
        let (len, len_len) = read_length(&data[tag_len..])?;
        let header = tag_len + len_len;
        let end = header
            .checked_add(len)
            .filter(|end| *end <= data.len())
            .ok_or(Error::Framing("TLV value runs past the end of the data"))?;

        out.push(RawTlv {
            tag,
            value: &data[header..end],
            raw: &data[..end],
        });
        data = &data[end..];
    }
    Ok(out)
}

/// Value of the first top-level TLV with `tag`
pub fn find(data: &[u8], tag: u16) -> Result<Option<&[u8]>> {
    Ok(split(data)?
        .into_iter()
        .find(|tlv| tlv.tag == tag)
        .map(|tlv| tlv.value))
}

/// Value of the first top-level TLV with `tag`, which must be present
pub fn require(data: &[u8], tag: u16) -> Result<&[u8]> {
    find(data, tag)?.ok_or(Error::Framing("expected TLV is missing"))
}

/// Parse BER-TLV objects, failing on trailing garbage
pub fn parse_ber(mut data: &[u8]) -> Result<Vec<Tlv>> {
    let mut out = Vec::new();
    while !data.is_empty() {
        let (tlv, rest) = Tlv::parse(data);
        out.push(tlv.map_err(|_| Error::Framing("malformed BER-TLV"))?);
        data = rest;
    }
    Ok(out)
}

/// Numeric tag of a parsed BER-TLV object
pub fn tag_of(tlv: &Tlv) -> u16 {
    tlv.tag()
        .to_bytes()
        .iter()
        .fold(0u16, |acc, byte| (acc << 8) | u16::from(*byte))
}

/// Primitive value of a parsed BER-TLV object
pub fn primitive(tlv: &Tlv) -> Option<&[u8]> {
    match tlv.value() {
        Value::Primitive(bytes) => Some(bytes.as_slice()),
        Value::Constructed(_) => None,
    }
}

/// Children of a constructed BER-TLV object
pub fn children(tlv: &Tlv) -> &[Tlv] {
    match tlv.value() {
        Value::Constructed(children) => children.as_slice(),
        Value::Primitive(_) => &[],
    }
}
