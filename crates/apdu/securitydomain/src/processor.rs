//! APDU exchange with length encoding, command chaining and GET RESPONSE
//!
//! The processor owns the transport and the diagnostic sink. It knows nothing
//! about secure messaging: protected commands arrive already wrapped, and
//! protected responses are returned whole so the channel can verify them.

use bytes::{Bytes, BytesMut};
use nexum_apdu_core::{
    ApduFormat, ApduResponse, CardTransport, Command, Response, ResponseError, TransportError,
    command::SHORT_MAX_DATA,
};
use tracing::{debug, trace};

use crate::{
    Result,
    constants::{cla, ins},
    diagnostics::{DiagnosticSink, Event},
};

/// Upper bound on GET RESPONSE rounds for one command
const MAX_RESPONSE_CHAIN: usize = 256;

/// Sends commands over a [`CardTransport`]
#[derive(Debug)]
pub struct ApduProcessor<T: CardTransport> {
    transport: T,
    format: ApduFormat,
    sink: Box<dyn DiagnosticSink>,
}

impl<T: CardTransport> ApduProcessor<T> {
    /// Create a processor using `format` for every command
    pub fn new(transport: T, format: ApduFormat, sink: Box<dyn DiagnosticSink>) -> Self {
        Self {
            transport,
            format,
            sink,
        }
    }

    /// Length encoding in use
    pub const fn format(&self) -> ApduFormat {
        self.format
    }

    /// Borrow the transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give the transport back
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Report an event to the session's sink
    pub fn record(&mut self, event: &Event) {
        self.sink.record(event);
    }

    /// Send a plaintext command
    ///
    /// In short format, data longer than one APDU is sent as a command chain.
    pub fn transmit(&mut self, command: &Command) -> Result<Response> {
        if self.format == ApduFormat::Short && command.data_len() > SHORT_MAX_DATA {
            let apdus = split_chain(command);
            return self.transmit_chain(&apdus);
        }
        self.transmit_chain(std::slice::from_ref(command))
    }

    /// Send a prepared command chain
    ///
    /// Every APDU but the last must be accepted; a refusal ends the chain and is
    /// returned as the response. The last APDU's response is completed with
    /// GET RESPONSE when the token has more data.
    pub fn transmit_chain(&mut self, apdus: &[Command]) -> Result<Response> {
        let Some((last, init)) = apdus.split_last() else {
            return Err(ResponseError::Parse("empty command chain").into());
        };

        for apdu in init {
            let response = self.exchange(apdu)?;
            if !response.is_success() {
                debug!(status = %response.status(), "Command chain interrupted");
                return Ok(response);
            }
        }

        let response = self.exchange(last)?;
        self.collect_remaining(response)
    }

    fn exchange(&mut self, command: &Command) -> Result<Response> {
        let bytes = command.encode(self.format)?;

        self.sink.record(&Event::CommandSent {
            cla: command.cla,
            ins: command.ins,
            p1: command.p1,
            p2: command.p2,
            data_len: command.data_len(),
        });

        let raw = self
            .transport
            .transmit_raw(&bytes)
            .map_err(Into::<TransportError>::into)?;
        let response = Response::from_bytes(&raw)?;

        self.sink.record(&Event::ResponseReceived {
            status: response.status(),
            data_len: response.payload().len(),
        });

        Ok(response)
    }

    fn collect_remaining(&mut self, mut response: Response) -> Result<Response> {
        let mut rounds = 0;
        while let Some(remaining) = response.status().remaining_bytes() {
            if rounds == MAX_RESPONSE_CHAIN {
                return Err(ResponseError::ChainLimitExceeded.into());
            }
            rounds += 1;

            trace!(remaining, "Fetching remaining response data");
            let get_response =
                Command::new_with_le(cla::ISO7816, ins::GET_RESPONSE, 0x00, 0x00, remaining.into());
            let next = self.exchange(&get_response)?;

            let mut payload = BytesMut::with_capacity(response.payload().len() + next.payload().len());
            payload.extend_from_slice(response.payload());
            payload.extend_from_slice(next.payload());
            response = Response::new(payload.freeze(), next.status());
        }
        Ok(response)
    }
}

/// Split a plaintext command into short APDUs joined by the chaining bit
fn split_chain(command: &Command) -> Vec<Command> {
    let data = command.data.clone().unwrap_or_else(Bytes::new);
    let chunks: Vec<&[u8]> = data.chunks(SHORT_MAX_DATA).collect();
    let last = chunks.len() - 1;

    chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| {
            let mut apdu = Command::new_with_data(
                command.cla,
                command.ins,
                command.p1,
                command.p2,
                data.slice_ref(chunk),
            );
            if index == last {
                apdu.le = command.le;
            } else {
                apdu.cla |= cla::CHAINING;
            }
            apdu
        })
        .collect()
}
