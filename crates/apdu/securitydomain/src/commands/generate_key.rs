//! GENERATE KEY command
//!
//! Has the token generate an EC key pair in place and return the public key.

use bytes::BytesMut;
use nexum_apdu_core::{ApduResponse, Response};
use p256::PublicKey;

use crate::{
    Error, Reply, Result,
    constants::{cla, ins, tag},
    key_ref::KeyRef,
    tlv,
};

/// Curve reference for NIST P-256
pub(crate) const CURVE_P256: u8 = 0x00;

sd_command! {
    /// GENERATE KEY
    pub struct GenerateKeyCommand {
        cla: cla::GP,
        ins: ins::GENERATE_KEY,
        response: Reply<PublicKey> => parse_public_key,
    }
}

impl GenerateKeyCommand {
    /// Generate a P-256 key at `key_ref`, replacing version `replace_kvn` (0 to add)
    pub fn new(key_ref: KeyRef, replace_kvn: u8) -> Self {
        let mut data = BytesMut::new();
        data.extend_from_slice(&[key_ref.kvn()]);
        tlv::put(&mut data, tag::KEY_TYPE_ECC_KEY_PARAMS, &[CURVE_P256]);
        Self::build(replace_kvn, key_ref.kid(), data.freeze()).expecting_response()
    }
}

fn parse_public_key(response: Response) -> Result<Reply<PublicKey>> {
    if !response.is_success() {
        return Ok(Reply::Declined(response.status()));
    }
    let point = tlv::require(response.payload(), tag::KEY_TYPE_ECC_PUBLIC_KEY)?;
    PublicKey::from_sec1_bytes(point)
        .map(Reply::Ok)
        .map_err(|_| Error::Framing("generated key is not a P-256 point"))
}
