//! Security Domain command definitions
//!
//! Each command is a thin wrapper over a core [`Command`] with typed builders
//! and a typed response. Status words other than `9000` are returned as
//! [`Reply::Declined`], never as errors.

use bytes::Bytes;
use nexum_apdu_core::{ApduResponse, Command, Response};

use crate::Reply;

/// Declare a command with a fixed class and instruction
///
/// Expands to a newtype over [`Command`], a `build` constructor for the
/// builders to use, and the [`nexum_apdu_core::ApduCommand`] implementation.
/// Without a `response` entry the command answers with a [`Reply<Bytes>`].
macro_rules! sd_command {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            cla: $cla:expr,
            ins: $ins:expr,
            response: $success:ty => $parse:expr $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name(::nexum_apdu_core::Command);

        impl $name {
            /// Class byte
            pub const CLA: u8 = $cla;
            /// Instruction byte
            pub const INS: u8 = $ins;

            fn build(p1: u8, p2: u8, data: impl Into<::bytes::Bytes>) -> Self {
                Self($crate::commands::command_with(Self::CLA, Self::INS, p1, p2, data))
            }

            #[allow(dead_code)]
            fn expecting_response(self) -> Self {
                Self(self.0.with_le(0))
            }
        }

        impl ::nexum_apdu_core::ApduCommand for $name {
            type Success = $success;
            type Error = $crate::Error;

            fn class(&self) -> u8 {
                self.0.cla
            }

            fn instruction(&self) -> u8 {
                self.0.ins
            }

            fn p1(&self) -> u8 {
                self.0.p1
            }

            fn p2(&self) -> u8 {
                self.0.p2
            }

            fn data(&self) -> Option<&[u8]> {
                self.0.data.as_deref()
            }

            fn expected_length(&self) -> Option<::nexum_apdu_core::ExpectedLength> {
                self.0.le
            }

            fn parse_response(
                response: ::nexum_apdu_core::Response,
            ) -> ::core::result::Result<Self::Success, Self::Error> {
                let parse: fn(::nexum_apdu_core::Response) -> $crate::Result<$success> = $parse;
                parse(response)
            }
        }
    };
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            cla: $cla:expr,
            ins: $ins:expr $(,)?
        }
    ) => {
        sd_command! {
            $(#[$meta])*
            pub struct $name {
                cla: $cla,
                ins: $ins,
                response: $crate::Reply<::bytes::Bytes> => |response| {
                    Ok($crate::commands::payload_reply(response))
                },
            }
        }
    };
}

pub mod delete;
pub mod external_authenticate;
pub mod generate_key;
pub mod get_data;
pub mod initialize_update;
pub mod internal_authenticate;
pub mod perform_security_operation;
pub mod put_key;
pub mod select;
pub mod store_data;

pub use delete::DeleteKeyCommand;
pub use external_authenticate::ExternalAuthenticateCommand;
pub use generate_key::GenerateKeyCommand;
pub use get_data::GetDataCommand;
pub use initialize_update::{InitializeUpdateCommand, InitializeUpdateResponse};
pub use internal_authenticate::InternalAuthenticateCommand;
pub use perform_security_operation::PerformSecurityOperationCommand;
pub use put_key::PutKeyCommand;
pub use select::SelectCommand;
pub use store_data::StoreDataCommand;

/// Split a response into accepted payload or refusal
pub(crate) fn payload_reply(response: Response) -> Reply<Bytes> {
    if response.is_success() {
        Reply::Ok(response.into_payload())
    } else {
        Reply::Declined(response.status())
    }
}

/// Plain command with `data`, omitting an empty data field
pub(crate) fn command_with(cla: u8, ins: u8, p1: u8, p2: u8, data: impl Into<Bytes>) -> Command {
    let data = data.into();
    let command = Command::new(cla, ins, p1, p2);
    if data.is_empty() {
        command
    } else {
        command.with_data(data)
    }
}
