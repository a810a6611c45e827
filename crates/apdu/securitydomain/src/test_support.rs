//! Helpers shared by unit tests

use std::collections::VecDeque;

use bytes::Bytes;
use nexum_apdu_core::{ApduFormat, CardTransport, TransportError};

use crate::{diagnostics::NullSink, processor::ApduProcessor};

/// Transport replaying canned responses and recording what was sent
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    pub(crate) sent: Vec<Vec<u8>>,
    replies: VecDeque<Vec<u8>>,
}

impl ScriptedTransport {
    pub(crate) fn new(replies: &[&[u8]]) -> Self {
        Self {
            sent: Vec::new(),
            replies: replies.iter().map(|r| r.to_vec()).collect(),
        }
    }
}

impl CardTransport for ScriptedTransport {
    type Error = TransportError;

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        self.sent.push(command.to_vec());
        self.replies
            .pop_front()
            .map(Bytes::from)
            .ok_or(TransportError::Transmission)
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Processor over a [`ScriptedTransport`] with diagnostics discarded
pub(crate) fn scripted(format: ApduFormat, replies: &[&[u8]]) -> ApduProcessor<ScriptedTransport> {
    ApduProcessor::new(ScriptedTransport::new(replies), format, Box::new(NullSink))
}
