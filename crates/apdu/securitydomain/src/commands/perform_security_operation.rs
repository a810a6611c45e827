//! PERFORM SECURITY OPERATION command
//!
//! Uploads OCE certificates ahead of an SCP11a/c key agreement.

use bytes::Bytes;

use crate::{
    constants::{cla, ins},
    key_ref::KeyRef,
};

/// P2 bit marking that more certificates follow
const MORE_CERTIFICATES: u8 = 0x80;

sd_command! {
    /// PERFORM SECURITY OPERATION
    pub struct PerformSecurityOperationCommand {
        cla: cla::GP,
        ins: ins::PERFORM_SECURITY_OPERATION,
    }
}

impl PerformSecurityOperationCommand {
    /// Upload one certificate of the OCE chain stored under `oce_ref`
    pub fn certificate(oce_ref: KeyRef, certificate: impl Into<Bytes>, last: bool) -> Self {
        let p2 = if last {
            oce_ref.kid()
        } else {
            oce_ref.kid() | MORE_CERTIFICATES
        };
        Self::build(oce_ref.kvn(), p2, certificate)
    }

    /// Operation addressed to `key_ref` with arbitrary data
    pub fn new(key_ref: KeyRef, data: impl Into<Bytes>) -> Self {
        Self::build(key_ref.kvn(), key_ref.kid(), data)
    }
}
