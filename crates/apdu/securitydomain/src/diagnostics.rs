//! Per-session diagnostics
//!
//! A session reports what it does to a [`DiagnosticSink`] chosen by the caller.
//! Events never carry key material. Command events carry only the header and
//! the length of the data field.

use std::fmt;

use nexum_apdu_core::StatusWord;
use tracing::{debug, trace, warn};

use crate::{key_ref::KeyRef, scp::ChannelState};

/// Something observable that happened during a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The secure channel moved between states
    StateChanged {
        /// Previous state
        from: ChannelState,
        /// New state
        to: ChannelState,
    },
    /// An APDU went out on the transport
    CommandSent {
        /// Class byte as transmitted
        cla: u8,
        /// Instruction
        ins: u8,
        /// First parameter
        p1: u8,
        /// Second parameter
        p2: u8,
        /// Length of the transmitted data field
        data_len: usize,
    },
    /// An APDU response came back
    ResponseReceived {
        /// Status word
        status: StatusWord,
        /// Length of the response data
        data_len: usize,
    },
    /// One dummy authentication during reset
    ResetAttempt {
        /// Key being exhausted
        key_ref: KeyRef,
        /// Attempt number, starting at 1
        attempt: u8,
        /// Status returned by the token
        status: StatusWord,
    },
    /// A key stopped accepting authentication attempts
    KeyBlocked {
        /// Blocked key
        key_ref: KeyRef,
        /// Attempts it took
        attempts: u8,
    },
}

/// Receiver of session events
pub trait DiagnosticSink: Send + fmt::Debug {
    /// Record one event
    fn record(&mut self, event: &Event);
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for Box<T> {
    fn record(&mut self, event: &Event) {
        (**self).record(event);
    }
}

/// Sink forwarding every event to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&mut self, event: &Event) {
        match *event {
            Event::StateChanged { from, to } => {
                debug!(%from, %to, "Secure channel state changed");
            }
            Event::CommandSent {
                cla,
                ins,
                p1,
                p2,
                data_len,
            } => {
                trace!(
                    cla = format_args!("{cla:02X}"),
                    ins = format_args!("{ins:02X}"),
                    p1 = format_args!("{p1:02X}"),
                    p2 = format_args!("{p2:02X}"),
                    data_len,
                    "Command sent"
                );
            }
            Event::ResponseReceived { status, data_len } => {
                trace!(%status, data_len, "Response received");
            }
            Event::ResetAttempt {
                key_ref,
                attempt,
                status,
            } => {
                trace!(%key_ref, attempt, %status, "Reset attempt");
            }
            Event::KeyBlocked { key_ref, attempts } => {
                warn!(%key_ref, attempts, "Key blocked");
            }
        }
    }
}

/// Sink discarding every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record(&mut self, _event: &Event) {}
}
