//! Configuration options for a Security Domain session

use nexum_apdu_core::ApduFormat;

use crate::constants::DEFAULT_RESET_ATTEMPTS;

/// Configuration options applied when a session starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Length encoding of outgoing commands
    ///
    /// With [`ApduFormat::Short`], commands too long for one short APDU are
    /// sent as a command chain.
    pub format: ApduFormat,

    /// Upper bound on dummy authentications per key during reset
    pub reset_attempts: u8,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            format: ApduFormat::Auto,
            reset_attempts: DEFAULT_RESET_ATTEMPTS,
        }
    }
}

impl ProtocolConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the APDU length encoding
    pub const fn with_format(mut self, format: ApduFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the number of reset attempts per key
    pub const fn with_reset_attempts(mut self, attempts: u8) -> Self {
        self.reset_attempts = attempts;
        self
    }
}
