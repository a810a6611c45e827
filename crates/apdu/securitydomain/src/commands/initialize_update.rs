//! INITIALIZE UPDATE command
//!
//! Opens an SCP03 handshake. The token answers with its challenge and the
//! card cryptogram.

use nexum_apdu_core::{ApduResponse, Response};

use crate::{
    Error, Reply,
    constants::{cla, ins},
};

/// SCP03 protocol identifier in the key information field
const SCP03_ID: u8 = 0x03;

sd_command! {
    /// INITIALIZE UPDATE
    pub struct InitializeUpdateCommand {
        cla: cla::GP,
        ins: ins::INITIALIZE_UPDATE,
        response: Reply<InitializeUpdateResponse> => InitializeUpdateResponse::from_response,
    }
}

impl InitializeUpdateCommand {
    /// Start a handshake against key version `kvn`
    pub fn new(kvn: u8, host_challenge: [u8; 8]) -> Self {
        Self::build(kvn, 0x00, host_challenge.to_vec()).expecting_response()
    }
}

/// Parsed INITIALIZE UPDATE response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeUpdateResponse {
    /// Key diversification data
    pub diversification_data: [u8; 10],
    /// Key version number of the key set used
    pub kvn: u8,
    /// `i` parameter of SCP03
    pub scp_parameter: u8,
    /// Card challenge
    pub card_challenge: [u8; 8],
    /// Card cryptogram
    pub card_cryptogram: [u8; 8],
    /// Sequence counter, present when pseudo-random challenges are in use
    pub sequence_counter: Option<[u8; 3]>,
}

impl InitializeUpdateResponse {
    fn from_response(response: Response) -> Result<Reply<Self>, Error> {
        if !response.is_success() {
            return Ok(Reply::Declined(response.status()));
        }
        Self::from_payload(response.payload()).map(Reply::Ok)
    }

    /// Parse the 29 or 32 byte response body
    pub fn from_payload(payload: &[u8]) -> Result<Self, Error> {
        if payload.len() != 29 && payload.len() != 32 {
            return Err(Error::Framing("INITIALIZE UPDATE response has wrong length"));
        }
        if payload[11] != SCP03_ID {
            return Err(Error::Framing("INITIALIZE UPDATE response is not SCP03"));
        }

        let mut diversification_data = [0u8; 10];
        diversification_data.copy_from_slice(&payload[..10]);
        let mut card_challenge = [0u8; 8];
        card_challenge.copy_from_slice(&payload[13..21]);
        let mut card_cryptogram = [0u8; 8];
        card_cryptogram.copy_from_slice(&payload[21..29]);
        let sequence_counter = payload.get(29..32).map(|seq| [seq[0], seq[1], seq[2]]);

        Ok(Self {
            diversification_data,
            kvn: payload[10],
            scp_parameter: payload[12],
            card_challenge,
            card_cryptogram,
            sequence_counter,
        })
    }
}
