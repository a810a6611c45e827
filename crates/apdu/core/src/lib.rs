//! Core traits and types for APDU (Application Protocol Data Unit) operations
//!
//! This crate provides the foundational types and traits for working with smart card
//! APDU commands and responses according to ISO/IEC 7816-4.
//!
//! ## Overview
//!
//! APDU (Application Protocol Data Unit) is the communication format used by smart cards.
//! This crate provides abstractions for:
//!
//! - Creating APDU commands and encoding them in short or extended form
//! - Parsing APDU responses and interpreting status words
//! - Exchanging raw bytes with a card through a [`CardTransport`]
//!
//! Secure messaging lives in the protocol crates layered on top of this one.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod response;
pub mod transport;

pub use command::{ApduCommand, ApduFormat, Command, CommandError, ExpectedLength};
pub use response::error::{ResponseError, StatusError};
pub use response::status::StatusWord;
pub use response::{ApduResponse, Response};
pub use transport::{CardTransport, TransportError};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{Bytes, BytesMut};

    // Command related
    pub use crate::command::{ApduCommand, ApduFormat, Command, CommandError, ExpectedLength};

    // Response related
    pub use crate::response::error::{ResponseError, StatusError};
    pub use crate::response::status::{StatusWord, common as status};
    pub use crate::response::{ApduResponse, Response};

    // Transport layer
    pub use crate::transport::{CardTransport, TransportError};
}
