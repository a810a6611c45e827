//! Secure channel state shared by SCP03 and SCP11
//!
//! Once a handshake succeeds both protocols protect traffic the same way: data
//! fields are encrypted under S-ENC with a per-command counter, every command
//! carries a chained C-MAC under S-MAC, and response data carries an R-MAC under
//! S-RMAC.
//!
//! [`ScpState`] is moved through each transition and handed back on success. A
//! failed transition consumes it, which wipes the session keys.

pub mod scp03;
pub mod scp11;

use bytes::Bytes;
use derive_more::Display;
use nexum_apdu_core::{ApduFormat, ApduResponse, Command, Response};
use tracing::trace;

use crate::{
    Error, Result,
    constants::{MAC_LENGTH, cla},
    crypto::Block,
    encryption::{Direction, decrypt_in, encrypt_in},
    keys::SessionKeys,
    mac::{mac_command_with, verify_rmac},
};

/// Largest encrypted data chunk per short APDU, leaving room for the C-MAC
pub const SHORT_CHUNK_SIZE: usize = 255 - MAC_LENGTH;

/// Lifecycle of the secure channel within a session
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// No handshake attempted
    #[default]
    #[display("unestablished")]
    Unestablished,
    /// Session keys derived, authentication pending
    #[display("keys-derived")]
    KeysDerived,
    /// Channel open and protecting traffic
    #[display("authenticated")]
    Authenticated,
    /// Channel torn down after an error or on request
    #[display("closed")]
    Closed,
}

/// Keys and counters of an open secure channel
#[derive(Debug)]
pub struct ScpState {
    keys: SessionKeys,
    chaining_value: Block,
    counter: u32,
}

impl ScpState {
    /// Create a channel state from freshly derived keys
    pub fn new(keys: SessionKeys, chaining_value: Block) -> Self {
        Self {
            keys,
            chaining_value,
            counter: 1,
        }
    }

    /// Counter the next command will use
    pub const fn counter(&self) -> u32 {
        self.counter
    }

    /// Current MAC chaining value
    pub const fn chaining_value(&self) -> &Block {
        &self.chaining_value
    }

    /// Session keys
    pub const fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    /// Data encryption key used for key provisioning
    pub fn dek(&self) -> Option<&[u8]> {
        self.keys.dek()
    }

    /// C-MAC a command without encrypting it or consuming a counter value
    ///
    /// Used for the handshake's final command, which is authenticated but sent
    /// before encryption is in effect.
    pub(crate) fn mac_only(mut self, command: &Command, format: ApduFormat) -> Result<(Self, Command)> {
        let (wrapped, chain) =
            mac_command_with(format, command, self.keys.s_mac(), &self.chaining_value)?;
        self.chaining_value = chain;
        Ok((self, wrapped))
    }

    /// Protect a command for transmission
    ///
    /// Non-empty data is encrypted first, then every resulting APDU is MAC'd.
    /// With [`ApduFormat::Short`], ciphertext longer than one short APDU is
    /// split into a command chain. The counter advances once for the whole
    /// command.
    pub fn wrap(mut self, command: &Command, format: ApduFormat) -> Result<(Self, Vec<Command>)> {
        let counter = self.counter;
        self.counter = counter.checked_add(1).ok_or(Error::CounterExhausted)?;

        let data = match command.data.as_deref() {
            Some(plain) if !plain.is_empty() => Bytes::from(encrypt_in(
                Direction::Command,
                plain,
                self.keys.s_enc(),
                counter,
            )?),
            _ => Bytes::new(),
        };

        let chunks: Vec<Bytes> = if format == ApduFormat::Short && data.len() > SHORT_CHUNK_SIZE {
            data.chunks(SHORT_CHUNK_SIZE)
                .map(|chunk| data.slice_ref(chunk))
                .collect()
        } else {
            vec![data]
        };

        trace!(counter, apdus = chunks.len(), "Wrapping command");

        let last = chunks.len() - 1;
        let mut wrapped = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.into_iter().enumerate() {
            let class = if index == last {
                command.cla
            } else {
                command.cla | cla::CHAINING
            };
            let mut plain = Command::new(class, command.ins, command.p1, command.p2);
            if !chunk.is_empty() {
                plain.data = Some(chunk);
            }
            if index == last {
                plain.le = command.le;
            }

            let (apdu, chain) =
                mac_command_with(format, &plain, self.keys.s_mac(), &self.chaining_value)?;
            self.chaining_value = chain;
            wrapped.push(apdu);
        }

        Ok((self, wrapped))
    }

    /// Verify and decrypt a response
    ///
    /// A response without data passes through untouched. Otherwise the R-MAC is
    /// checked before anything is decrypted, using the counter of the command
    /// that produced the response.
    pub fn unwrap(self, response: Response) -> Result<(Self, Response)> {
        if response.payload().is_empty() {
            return Ok((self, response));
        }

        let verified = verify_rmac(&response, self.keys.s_rmac(), &self.chaining_value)?;
        if verified.payload().is_empty() {
            return Ok((self, verified));
        }

        let counter = self
            .counter
            .checked_sub(1)
            .ok_or(Error::Framing("protected response before any command"))?;
        let plain = decrypt_in(
            Direction::Response,
            verified.payload(),
            self.keys.s_enc(),
            counter,
        )?;

        Ok((self, Response::new(plain, verified.status())))
    }
}
