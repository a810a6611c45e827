//! Error types specific to APDU commands

use thiserror::Error;

/// Error for APDU command encoding and parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Invalid command length
    #[error("Invalid command length: {0}")]
    InvalidLength(usize),

    /// Data too long for the selected encoding
    #[error("Data too long: {0} bytes (max {1})")]
    DataTooLong(usize, usize),

    /// Expected length cannot be expressed in short form
    #[error("Expected length {0} requires extended length encoding")]
    ExpectedLengthTooLong(u16),
}

impl CommandError {
    /// Create a data too long error
    pub const fn data_too_long(actual: usize, max: usize) -> Self {
        Self::DataTooLong(actual, max)
    }
}
