//! GlobalPlatform Security Domain client with SCP03 and SCP11 secure channels
//!
//! This crate drives a token's Security Domain over any
//! [`nexum_apdu_core::CardTransport`]. It can:
//!
//! - establish an SCP03 channel from a pre-shared static key set;
//! - establish an SCP11a, SCP11b or SCP11c channel from elliptic-curve keys and
//!   certificates;
//! - enumerate, provision and delete keys and certificate stores through that
//!   channel;
//! - reset the Security Domain by exhausting every key's retry counter.
//!
//! The main entry point is [`SecurityDomainSession`]. Expected refusals from the
//! token are returned as [`Reply::Declined`]; [`Error`] is reserved for faults.
//!
//! # Example
//!
//! ```no_run
//! # fn run<T: nexum_apdu_core::CardTransport>(transport: T) -> nexum_apdu_securitydomain::Result<()> {
//! use nexum_apdu_securitydomain::{
//!     ProtocolConfig, Scp03KeyParams, ScpKeyParams, SecurityDomainSession, TracingSink,
//! };
//!
//! let params = ScpKeyParams::from(Scp03KeyParams::default());
//! let mut session =
//!     SecurityDomainSession::open(transport, ProtocolConfig::default(), TracingSink, &params)?;
//!
//! for key in session.get_key_information()?.into_result()? {
//!     println!("{}: {} components", key.key_ref, key.component_count());
//! }
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod certificate;
pub mod commands;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod diagnostics;
pub mod encryption;
pub mod error;
pub mod key_ref;
pub mod keys;
pub mod mac;
pub mod padding;
pub mod params;
pub mod processor;
pub mod scp;
pub mod security_domain;
pub mod tlv;

#[cfg(test)]
mod test_support;

pub use config::ProtocolConfig;
pub use diagnostics::{DiagnosticSink, Event, NullSink, TracingSink};
pub use error::{Error, ErrorKind, Reply, Result};
pub use key_ref::{KeyComponent, KeyFamily, KeyInfo, KeyRef};
pub use keys::{SessionKeys, StaticKeys};
pub use params::{OceCredentials, Scp03KeyParams, Scp11KeyParams, Scp11Variant, ScpKeyParams};
pub use scp::{ChannelState, ScpState};
pub use security_domain::{CaIdentifier, SecurityDomainSession};

// Re-export the core types callers need alongside a session
pub use nexum_apdu_core::{ApduFormat, CardTransport, StatusWord};
