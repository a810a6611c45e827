//! SCP03 handshake
//!
//! INITIALIZE UPDATE exchanges challenges and proves the token knows the
//! static keys; EXTERNAL AUTHENTICATE proves the host does. Session keys come
//! from the SP800-108 KDF over both challenges.

use nexum_apdu_core::{ApduCommand, ApduResponse, CardTransport};
use tracing::{debug, warn};

use super::ScpState;
use crate::{
    Error, Reply, Result,
    commands::{ExternalAuthenticateCommand, InitializeUpdateCommand},
    constants::derivation,
    crypto::{ct_eq, derive_scp03},
    keys::SessionKeys,
    params::Scp03KeyParams,
    processor::ApduProcessor,
};

/// Bits in a derived cryptogram
const CRYPTOGRAM_BITS: u16 = 64;

/// Bits in a derived session key
const SESSION_KEY_BITS: u16 = 128;

/// Session keys derived and card verified, host not yet authenticated
#[derive(Debug)]
pub struct PendingAuthentication {
    state: ScpState,
    host_cryptogram: [u8; 8],
}

/// Send INITIALIZE UPDATE, derive the session keys and check the card cryptogram
pub fn initialize<T: CardTransport>(
    processor: &mut ApduProcessor<T>,
    params: &Scp03KeyParams,
    host_challenge: [u8; 8],
) -> Result<Reply<PendingAuthentication>> {
    let key_ref = params.key_ref();
    debug!(%key_ref, "Starting SCP03 handshake");

    let command = InitializeUpdateCommand::new(key_ref.kvn(), host_challenge);
    let response = processor.transmit(&command.to_command())?;
    let init = match InitializeUpdateCommand::parse_response(response)? {
        Reply::Ok(init) => init,
        Reply::Declined(status) => {
            debug!(%status, "INITIALIZE UPDATE declined");
            return Ok(Reply::Declined(status));
        }
    };

    let mut context = [0u8; 16];
    context[..8].copy_from_slice(&host_challenge);
    context[8..].copy_from_slice(&init.card_challenge);

    let static_keys = params.keys();
    let s_enc = derive_scp03(static_keys.enc(), derivation::S_ENC, &context, SESSION_KEY_BITS)?;
    let s_mac = derive_scp03(static_keys.mac(), derivation::S_MAC, &context, SESSION_KEY_BITS)?;
    let s_rmac = derive_scp03(static_keys.mac(), derivation::S_RMAC, &context, SESSION_KEY_BITS)?;

    let card_cryptogram =
        derive_scp03(&s_mac, derivation::CARD_CRYPTOGRAM, &context, CRYPTOGRAM_BITS)?;
    if !ct_eq(&card_cryptogram, &init.card_cryptogram) {
        warn!(%key_ref, "Card cryptogram mismatch");
        return Err(Error::Authentication("card cryptogram mismatch"));
    }

    let derived_host_cryptogram =
        derive_scp03(&s_mac, derivation::HOST_CRYPTOGRAM, &context, CRYPTOGRAM_BITS)?;
    let mut host_cryptogram = [0u8; 8];
    host_cryptogram.copy_from_slice(&derived_host_cryptogram);

    let keys = SessionKeys::from_slices(&s_enc, &s_mac, &s_rmac, static_keys.dek())?;
    Ok(Reply::Ok(PendingAuthentication {
        state: ScpState::new(keys, [0u8; 16]),
        host_cryptogram,
    }))
}

/// Send the MAC'd host cryptogram, completing the handshake
pub fn authenticate<T: CardTransport>(
    processor: &mut ApduProcessor<T>,
    pending: PendingAuthentication,
) -> Result<Reply<ScpState>> {
    let PendingAuthentication {
        state,
        host_cryptogram,
    } = pending;

    let command = ExternalAuthenticateCommand::scp03(host_cryptogram).to_command();
    let (state, wrapped) = state.mac_only(&command, processor.format())?;
    let response = processor.transmit(&wrapped)?;

    if !response.is_success() {
        debug!(status = %response.status(), "EXTERNAL AUTHENTICATE declined");
        return Ok(Reply::Declined(response.status()));
    }

    debug!("SCP03 channel established");
    Ok(Reply::Ok(state))
}

/// Run both handshake steps
pub fn open<T: CardTransport>(
    processor: &mut ApduProcessor<T>,
    params: &Scp03KeyParams,
    host_challenge: [u8; 8],
) -> Result<Reply<ScpState>> {
    initialize(processor, params, host_challenge)?.and_then(|pending| authenticate(processor, pending))
}
