//! SELECT command
//!
//! Selects an application by AID.

use bytes::Bytes;

use crate::constants::{cla, ins};

/// P1: select by DF name
const BY_NAME: u8 = 0x04;

sd_command! {
    /// SELECT by name, answering with the file control information
    pub struct SelectCommand {
        cla: cla::ISO7816,
        ins: ins::SELECT,
    }
}

impl SelectCommand {
    /// Select the application identified by `aid`
    pub fn with_aid(aid: impl Into<Bytes>) -> Self {
        Self::build(BY_NAME, 0x00, aid).expecting_response()
    }
}
