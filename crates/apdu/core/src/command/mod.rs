//! APDU command definitions and traits
//!
//! This module provides types and traits for working with APDU commands
//! according to ISO/IEC 7816-4, in both short and extended length form.

pub mod error;

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

pub use error::CommandError;

use crate::response::{Response, error::ResponseError};

/// Expected length type for APDU commands
///
/// A value of `0` requests the maximum available length (256 in short form,
/// 65536 in extended form).
pub type ExpectedLength = u16;

/// Largest data field of a short APDU
pub const SHORT_MAX_DATA: usize = 255;

/// Largest data field of an extended APDU
pub const EXTENDED_MAX_DATA: usize = 65_535;

/// Length field encoding used when serializing commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ApduFormat {
    /// Short encoding whenever the command fits, extended otherwise
    #[default]
    Auto,
    /// Always short encoding; longer payloads must be chained by the caller
    Short,
    /// Always extended encoding
    Extended,
}

/// Core trait for APDU commands
pub trait ApduCommand {
    /// Success response type
    type Success;

    /// Error response type
    type Error: fmt::Debug + From<ResponseError>;

    /// Command class (CLA)
    fn class(&self) -> u8;

    /// Instruction code (INS)
    fn instruction(&self) -> u8;

    /// First parameter (P1)
    fn p1(&self) -> u8;

    /// Second parameter (P2)
    fn p2(&self) -> u8;

    /// Command payload data (optional)
    fn data(&self) -> Option<&[u8]>;

    /// Expected response length (optional)
    fn expected_length(&self) -> Option<ExpectedLength>;

    /// Convert to a generic Command
    fn to_command(&self) -> Command {
        Command {
            cla: self.class(),
            ins: self.instruction(),
            p1: self.p1(),
            p2: self.p2(),
            data: self.data().map(Bytes::copy_from_slice),
            le: self.expected_length(),
        }
    }

    /// Convert to raw APDU bytes using automatic length encoding
    fn to_bytes(&self) -> Result<Bytes, CommandError> {
        self.to_command().encode(ApduFormat::Auto)
    }

    /// Parse response into the command's response type
    fn parse_response(response: Response) -> Result<Self::Success, Self::Error>;

    /// Parse raw bytes into the command's response type
    fn parse_response_raw(bytes: &[u8]) -> Result<Self::Success, Self::Error> {
        let response = Response::from_bytes(bytes)?;
        Self::parse_response(response)
    }
}

/// Generic APDU command structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected length (optional)
    pub le: Option<ExpectedLength>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a new command with expected response length (Le)
    pub const fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: ExpectedLength) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: Some(le),
        }
    }

    /// Create a new command with data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Some(data.into()),
            le: None,
        }
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: ExpectedLength) -> Self {
        self.le = Some(le);
        self
    }

    /// Replace the class byte
    pub const fn with_class(mut self, cla: u8) -> Self {
        self.cla = cla;
        self
    }

    /// Length of the data field, zero when absent
    pub fn data_len(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }

    /// Whether this command needs extended length encoding to be represented
    pub fn needs_extended(&self) -> bool {
        self.data_len() > SHORT_MAX_DATA || self.le.is_some_and(|le| le > 256)
    }

    /// Serialize the command using the requested length encoding
    pub fn encode(&self, format: ApduFormat) -> Result<Bytes, CommandError> {
        let data = self.data.as_deref().unwrap_or_default();
        let extended = match format {
            ApduFormat::Short => {
                if data.len() > SHORT_MAX_DATA {
                    return Err(CommandError::data_too_long(data.len(), SHORT_MAX_DATA));
                }
                if let Some(le) = self.le.filter(|le| *le > 256) {
                    return Err(CommandError::ExpectedLengthTooLong(le));
                }
                false
            }
            ApduFormat::Extended => true,
            ApduFormat::Auto => self.needs_extended(),
        };

        if data.len() > EXTENDED_MAX_DATA {
            return Err(CommandError::data_too_long(data.len(), EXTENDED_MAX_DATA));
        }

        let mut buffer = BytesMut::with_capacity(4 + 3 + data.len() + 3);
        buffer.put_slice(&[self.cla, self.ins, self.p1, self.p2]);

        if !data.is_empty() {
            if extended {
                buffer.put_u8(0x00);
                buffer.put_u16(data.len() as u16);
            } else {
                buffer.put_u8(data.len() as u8);
            }
            buffer.put_slice(data);
        }

        if let Some(le) = self.le {
            if extended {
                if data.is_empty() {
                    buffer.put_u8(0x00);
                }
                buffer.put_u16(le);
            } else {
                // 256 wraps to 0x00, the short form of "maximum"
                buffer.put_u8(le as u8);
            }
        }

        Ok(buffer.freeze())
    }

    /// Parse a command from raw bytes, short or extended form
    pub fn from_bytes(data: &[u8]) -> Result<Self, CommandError> {
        if data.len() < 4 {
            return Err(CommandError::InvalidLength(data.len()));
        }

        let mut command = Self::new(data[0], data[1], data[2], data[3]);
        let body = &data[4..];

        match body.len() {
            0 => {}
            1 => command.le = Some(ExpectedLength::from(body[0])),
            _ if body[0] == 0x00 && body.len() >= 3 => {
                // Extended form
                let len = u16::from_be_bytes([body[1], body[2]]) as usize;
                if body.len() == 3 {
                    command.le = Some(len as ExpectedLength);
                } else if body.len() == 3 + len {
                    command.data = Some(Bytes::copy_from_slice(&body[3..]));
                } else if body.len() == 3 + len + 2 {
                    command.data = Some(Bytes::copy_from_slice(&body[3..3 + len]));
                    command.le = Some(u16::from_be_bytes([body[3 + len], body[4 + len]]));
                } else {
                    return Err(CommandError::InvalidLength(data.len()));
                }
            }
            _ => {
                let lc = body[0] as usize;
                if body.len() == 1 + lc {
                    command.data = Some(Bytes::copy_from_slice(&body[1..]));
                } else if body.len() == 2 + lc {
                    command.data = Some(Bytes::copy_from_slice(&body[1..1 + lc]));
                    command.le = Some(ExpectedLength::from(body[1 + lc]));
                } else {
                    return Err(CommandError::InvalidLength(data.len()));
                }
            }
        }

        Ok(command)
    }
}

impl ApduCommand for Command {
    type Success = Response;
    type Error = ResponseError;

    fn class(&self) -> u8 {
        self.cla
    }

    fn instruction(&self) -> u8 {
        self.ins
    }

    fn p1(&self) -> u8 {
        self.p1
    }

    fn p2(&self) -> u8 {
        self.p2
    }

    fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    fn expected_length(&self) -> Option<ExpectedLength> {
        self.le
    }

    fn parse_response(response: Response) -> Result<Self::Success, Self::Error> {
        Ok(response)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X} {:02X} {:02X} {:02X} ({} data bytes)",
            self.cla,
            self.ins,
            self.p1,
            self.p2,
            self.data_len()
        )
    }
}
