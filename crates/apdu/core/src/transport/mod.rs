//! Transport traits for APDU communication with cards
//!
//! This module provides abstractions for communicating with smart cards through
//! different transport mechanisms.

pub mod error;

use std::fmt;

use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

/// Trait for basic card transports
///
/// A transport is responsible for sending and receiving raw APDU bytes.
/// It has no knowledge of command structure, secure channels, or protocol details.
pub trait CardTransport: Send + fmt::Debug {
    /// Error type returned by the transport
    type Error: Into<TransportError> + fmt::Debug;

    /// Send raw APDU bytes to card and return response bytes
    ///
    /// This method should handle the low-level communication with the card
    /// but should not interpret the contents or handle protocol-specific
    /// operations like GET RESPONSE.
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        trace!(command = ?hex::encode(command), "Transmitting raw command");
        let result = self.do_transmit_raw(command);
        match &result {
            Ok(response) => {
                trace!(response = ?hex::encode(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Internal implementation of transmit_raw
    /// This is the method that concrete implementations should override
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error>;

    /// Check if the transport is connected to a physical card
    fn is_connected(&self) -> bool;

    /// Reset the transport connection
    fn reset(&mut self) -> Result<(), Self::Error>;
}

impl<T: CardTransport + ?Sized> CardTransport for Box<T> {
    type Error = T::Error;

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        (**self).do_transmit_raw(command)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        (**self).reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct EchoTransport {
        connected: bool,
        sent: Vec<Bytes>,
    }

    impl CardTransport for EchoTransport {
        type Error = TransportError;

        fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
            if !self.connected {
                return Err(TransportError::Connection);
            }
            self.sent.push(Bytes::copy_from_slice(command));
            let mut response = command.to_vec();
            response.extend_from_slice(&[0x90, 0x00]);
            Ok(response.into())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn reset(&mut self) -> Result<(), Self::Error> {
            self.connected = true;
            self.sent.clear();
            Ok(())
        }
    }

    #[test]
    fn test_transmit_raw_delegates() {
        let mut transport = EchoTransport {
            connected: true,
            sent: Vec::new(),
        };
        let response = transport.transmit_raw(&[0x00, 0xA4]).unwrap();
        assert_eq!(response.as_ref(), &[0x00, 0xA4, 0x90, 0x00]);
        assert_eq!(transport.sent.len(), 1);

        transport.connected = false;
        assert_eq!(
            transport.transmit_raw(&[0x00]),
            Err(TransportError::Connection)
        );

        transport.reset().unwrap();
        assert!(transport.is_connected());
        assert!(transport.sent.is_empty());
    }

    #[test]
    fn test_boxed_transport() {
        let mut transport: Box<EchoTransport> = Box::new(EchoTransport {
            connected: true,
            sent: Vec::new(),
        });
        assert!(transport.transmit_raw(&[0x80, 0x50]).is_ok());
    }
}
