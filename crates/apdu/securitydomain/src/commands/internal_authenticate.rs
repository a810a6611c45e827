//! INTERNAL AUTHENTICATE command, used for the SCP11b key agreement

use bytes::Bytes;

use crate::{
    constants::{cla, ins},
    key_ref::KeyRef,
};

sd_command! {
    /// INTERNAL AUTHENTICATE
    pub struct InternalAuthenticateCommand {
        cla: cla::GP,
        ins: ins::INTERNAL_AUTHENTICATE,
    }
}

impl InternalAuthenticateCommand {
    /// Key agreement against `key_ref`
    pub fn new(key_ref: KeyRef, data: impl Into<Bytes>) -> Self {
        Self::build(key_ref.kvn(), key_ref.kid(), data)
    }
}
