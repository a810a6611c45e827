//! PUT KEY command
//!
//! Loads or replaces key material. Symmetric and private key values travel
//! encrypted under the session DEK; the payloads are built by the session.

use bytes::Bytes;

use crate::constants::{cla, ins};

/// P2 bit announcing several keys in one command
pub(crate) const MULTIPLE_KEYS: u8 = 0x80;

sd_command! {
    /// PUT KEY
    ///
    /// Answers with the key version followed by any key check values.
    pub struct PutKeyCommand {
        cla: cla::GP,
        ins: ins::PUT_KEY,
    }
}

impl PutKeyCommand {
    /// Put key data, replacing version `replace_kvn` (0 to add)
    pub fn new(replace_kvn: u8, p2: u8, data: impl Into<Bytes>) -> Self {
        Self::build(replace_kvn, p2, data).expecting_response()
    }
}
