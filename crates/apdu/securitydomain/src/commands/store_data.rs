//! STORE DATA command
//!
//! Writes BER-TLV data objects such as certificate bundles, serial number
//! allowlists and CA issuer identifiers.

use bytes::Bytes;

use crate::constants::{cla, ins};

/// P1: last block, BER-TLV encoded data
const LAST_BLOCK_BER_TLV: u8 = 0x90;

sd_command! {
    /// STORE DATA
    pub struct StoreDataCommand {
        cla: cla::ISO7816,
        ins: ins::STORE_DATA,
    }
}

impl StoreDataCommand {
    /// Store `data` as a single block
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self::build(LAST_BLOCK_BER_TLV, 0x00, data)
    }
}
