//! GET DATA command

use bytes::Bytes;

use crate::constants::{cla, ins};

sd_command! {
    /// GET DATA for a one- or two-byte tag
    pub struct GetDataCommand {
        cla: cla::ISO7816,
        ins: ins::GET_DATA,
    }
}

impl GetDataCommand {
    /// Request the data object `tag`
    pub fn new(tag: u16) -> Self {
        Self::with_data(tag, Bytes::new())
    }

    /// Request the data object `tag` with a qualifying data field
    pub fn with_data(tag: u16, data: impl Into<Bytes>) -> Self {
        let [p1, p2] = tag.to_be_bytes();
        Self::build(p1, p2, data).expecting_response()
    }
}
