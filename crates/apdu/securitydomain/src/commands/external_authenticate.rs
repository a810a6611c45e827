//! EXTERNAL AUTHENTICATE command
//!
//! Completes an SCP03 handshake with the host cryptogram, or carries the
//! SCP11a/c key agreement.

use bytes::Bytes;

use crate::{
    constants::{cla, ins, security_level},
    key_ref::KeyRef,
};

sd_command! {
    /// EXTERNAL AUTHENTICATE
    pub struct ExternalAuthenticateCommand {
        cla: cla::GP,
        ins: ins::EXTERNAL_AUTHENTICATE,
    }
}

impl ExternalAuthenticateCommand {
    /// SCP03 host cryptogram at full security level
    ///
    /// Returned in plain form; the channel adds the C-MAC.
    pub fn scp03(host_cryptogram: [u8; 8]) -> Self {
        Self::build(security_level::FULL, 0x00, host_cryptogram.to_vec())
    }

    /// SCP11a/c key agreement against `key_ref`
    pub fn scp11(key_ref: KeyRef, data: impl Into<Bytes>) -> Self {
        Self::build(key_ref.kvn(), key_ref.kid(), data)
    }
}
