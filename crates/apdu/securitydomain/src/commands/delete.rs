//! DELETE command for keys

use bytes::BytesMut;

use crate::{
    constants::{cla, ins, tag},
    tlv,
};

sd_command! {
    /// DELETE key
    pub struct DeleteKeyCommand {
        cla: cla::GP,
        ins: ins::DELETE,
    }
}

impl DeleteKeyCommand {
    /// Delete keys matching `kid` and/or `kvn`; zero means "any"
    ///
    /// `delete_last` allows removing the last key on the token.
    pub fn new(kid: u8, kvn: u8, delete_last: bool) -> Self {
        let mut data = BytesMut::new();
        if kid != 0 {
            tlv::put(&mut data, tag::DELETE_KID, &[kid]);
        }
        if kvn != 0 {
            tlv::put(&mut data, tag::DELETE_KVN, &[kvn]);
        }
        Self::build(0x00, u8::from(delete_last), data.freeze())
    }
}
