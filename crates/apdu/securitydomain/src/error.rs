//! Error types for Security Domain and secure channel operations
//!
//! Fatal faults are reported through [`Error`]. Outcomes where the token
//! legitimately refused a request are data, carried by [`Reply::Declined`].

use nexum_apdu_core::{CommandError, ResponseError, StatusWord, TransportError};
use thiserror::Error;

/// Result type for Security Domain operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Security Domain operations
#[derive(Debug, Error)]
pub enum Error {
    /// Caller supplied an invalid key, key reference or parameter set
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Structurally invalid padding, TLV or response data
    #[error("Framing error: {0}")]
    Framing(&'static str),

    /// Handshake cryptogram, receipt or certificate chain did not verify
    #[error("Authentication failed: {0}")]
    Authentication(&'static str),

    /// Response MAC mismatch
    #[error("Channel integrity check failed: {0}")]
    Integrity(&'static str),

    /// Token refused an operation that has no data-level representation
    #[error("Token declined the request: {0}")]
    Declined(StatusWord),

    /// Command counter would wrap
    #[error("Secure channel counter exhausted")]
    CounterExhausted,

    /// Operation requires an authenticated secure channel
    #[error("Secure channel not established")]
    NoSecureChannel,

    /// Transport-related errors
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Command encoding errors
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Response parsing errors
    #[error(transparent)]
    Response(#[from] ResponseError),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller bug, never retried
    Configuration,
    /// Malformed data from the channel or token
    Framing,
    /// Handshake failed
    Authentication,
    /// Possible tampering
    Integrity,
    /// Token said no
    Declined,
    /// Session used up its counter space
    CounterExhausted,
    /// No channel where one is required
    NoSecureChannel,
    /// Physical transport failure
    Transport,
}

impl Error {
    /// Build a configuration error from any message
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Classify this error
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::Command(_) => ErrorKind::Configuration,
            Self::Framing(_) | Self::Response(_) => ErrorKind::Framing,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::Integrity(_) => ErrorKind::Integrity,
            Self::Declined(_) => ErrorKind::Declined,
            Self::CounterExhausted => ErrorKind::CounterExhausted,
            Self::NoSecureChannel => ErrorKind::NoSecureChannel,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Whether an open secure channel must be discarded after this error
    pub const fn closes_channel(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Framing
                | ErrorKind::Authentication
                | ErrorKind::Integrity
                | ErrorKind::CounterExhausted
        )
    }
}

/// Outcome of a request the token may legitimately refuse
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Reply<T> {
    /// The token accepted the request
    Ok(T),
    /// The token answered with a non-success status word
    Declined(StatusWord),
}

impl<T> Reply<T> {
    /// Whether the token accepted the request
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Status word of a declined request
    pub const fn declined_status(&self) -> Option<StatusWord> {
        match self {
            Self::Ok(_) => None,
            Self::Declined(sw) => Some(*sw),
        }
    }

    /// Lift a refusal into [`Error::Declined`]
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Declined(sw) => Err(Error::Declined(sw)),
        }
    }

    /// Map the accepted value
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<U> {
        match self {
            Self::Ok(value) => Reply::Ok(f(value)),
            Self::Declined(sw) => Reply::Declined(sw),
        }
    }

    /// Chain a fallible computation on the accepted value
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Result<Reply<U>>) -> Result<Reply<U>> {
        match self {
            Self::Ok(value) => f(value),
            Self::Declined(sw) => Ok(Reply::Declined(sw)),
        }
    }
}
