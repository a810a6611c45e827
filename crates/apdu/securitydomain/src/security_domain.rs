//! Security Domain session
//!
//! [`SecurityDomainSession`] selects the Security Domain, optionally opens a
//! secure channel, and drives key enumeration, provisioning and reset. Once a
//! channel is authenticated every command goes through it.

use bytes::{Bytes, BytesMut};
use nexum_apdu_core::{ApduCommand, ApduResponse, CardTransport, Command, Response, StatusWord};
use p256::{PublicKey, SecretKey, elliptic_curve::sec1::ToEncodedPoint};
use rand_v8::{CryptoRng, RngCore, rngs::OsRng};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::{
    Error, Reply, Result, certificate,
    commands::{
        DeleteKeyCommand, ExternalAuthenticateCommand, GenerateKeyCommand, GetDataCommand,
        InitializeUpdateCommand, InternalAuthenticateCommand, PerformSecurityOperationCommand,
        PutKeyCommand, SelectCommand, StoreDataCommand, generate_key::CURVE_P256,
        put_key::MULTIPLE_KEYS,
    },
    config::ProtocolConfig,
    constants::{SECURITY_DOMAIN_AID, kid, tag},
    crypto::{ct_eq, key_check_value, wrap_key},
    diagnostics::{DiagnosticSink, Event},
    key_ref::{KeyFamily, KeyInfo, KeyRef},
    keys::StaticKeys,
    params::ScpKeyParams,
    processor::ApduProcessor,
    scp::{ChannelState, ScpState, scp03, scp11},
    tlv,
};

/// Payload of the dummy authentications sent during reset
const RESET_CHALLENGE: [u8; 8] = [0u8; 8];

/// Length of a key check value
const KCV_LENGTH: u8 = 3;

/// A CA key identifier registered on the token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaIdentifier {
    /// Key the CA is associated with
    pub key_ref: KeyRef,
    /// Subject key identifier of the CA
    pub ski: Vec<u8>,
}

/// Session with a token's Security Domain
#[derive(Debug)]
pub struct SecurityDomainSession<T: CardTransport> {
    processor: ApduProcessor<T>,
    config: ProtocolConfig,
    channel: Option<ScpState>,
    state: ChannelState,
}

impl<T: CardTransport> SecurityDomainSession<T> {
    /// Select the Security Domain over `transport`
    ///
    /// No secure channel is opened; call [`Self::authenticate`] for that.
    pub fn new(
        transport: T,
        config: ProtocolConfig,
        sink: impl DiagnosticSink + 'static,
    ) -> Result<Self> {
        let mut session = Self {
            processor: ApduProcessor::new(transport, config.format, Box::new(sink)),
            config,
            channel: None,
            state: ChannelState::Unestablished,
        };
        session.select()?;
        Ok(session)
    }

    /// Select the Security Domain and open a secure channel with `params`
    ///
    /// A refused handshake is reported as [`Error::Declined`].
    pub fn open(
        transport: T,
        config: ProtocolConfig,
        sink: impl DiagnosticSink + 'static,
        params: &ScpKeyParams,
    ) -> Result<Self> {
        let mut session = Self::new(transport, config, sink)?;
        session.authenticate(params)?.into_result()?;
        Ok(session)
    }

    /// Configuration the session was created with
    pub const fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Current secure channel state
    pub const fn channel_state(&self) -> ChannelState {
        self.state
    }

    /// Whether commands are currently protected by a secure channel
    pub const fn is_authenticated(&self) -> bool {
        self.channel.is_some()
    }

    /// Counter the next protected command will use
    pub fn channel_counter(&self) -> Option<u32> {
        self.channel.as_ref().map(ScpState::counter)
    }

    /// Mutably borrow the transport
    pub fn transport_mut(&mut self) -> &mut T {
        self.processor.transport_mut()
    }

    /// Close the session and give the transport back
    pub fn into_transport(mut self) -> T {
        self.close_channel();
        let Self { processor, .. } = self;
        processor.into_transport()
    }

    fn set_state(&mut self, to: ChannelState) {
        if self.state != to {
            let from = self.state;
            self.state = to;
            self.processor.record(&Event::StateChanged { from, to });
        }
    }

    fn select(&mut self) -> Result<()> {
        let command = SelectCommand::with_aid(SECURITY_DOMAIN_AID.to_vec());
        let response = self.processor.transmit(&command.to_command())?;
        SelectCommand::parse_response(response)?.into_result()?;
        debug!("Security Domain selected");
        Ok(())
    }

    /// Open a secure channel, drawing challenges and ephemeral keys from the OS
    pub fn authenticate(&mut self, params: &ScpKeyParams) -> Result<Reply<()>> {
        self.authenticate_with_rng(params, &mut OsRng)
    }

    /// Open a secure channel using `rng` for challenges and ephemeral keys
    ///
    /// Any channel already open is discarded first. If the handshake fails or is
    /// declined the session is left without a channel.
    pub fn authenticate_with_rng<R: RngCore + CryptoRng>(
        &mut self,
        params: &ScpKeyParams,
        rng: &mut R,
    ) -> Result<Reply<()>> {
        self.channel = None;
        self.set_state(ChannelState::Unestablished);

        let outcome = match params {
            ScpKeyParams::Scp03(params) => {
                let mut host_challenge = [0u8; 8];
                rng.fill_bytes(&mut host_challenge);
                scp03::initialize(&mut self.processor, params, host_challenge).and_then(|reply| {
                    reply.and_then(|pending| {
                        self.set_state(ChannelState::KeysDerived);
                        scp03::authenticate(&mut self.processor, pending)
                    })
                })
            }
            ScpKeyParams::Scp11(params) => {
                let esk_oce = SecretKey::random(rng);
                scp11::open(&mut self.processor, params, esk_oce).inspect(|reply| {
                    if reply.is_ok() {
                        self.set_state(ChannelState::KeysDerived);
                    }
                })
            }
        };

        match outcome {
            Ok(Reply::Ok(state)) => {
                self.channel = Some(state);
                self.set_state(ChannelState::Authenticated);
                info!(key_ref = %params.key_ref(), "Secure channel established");
                Ok(Reply::Ok(()))
            }
            Ok(Reply::Declined(status)) => {
                self.set_state(ChannelState::Closed);
                Ok(Reply::Declined(status))
            }
            Err(err) => {
                warn!(key_ref = %params.key_ref(), %err, "Secure channel handshake failed");
                self.set_state(ChannelState::Closed);
                Err(err)
            }
        }
    }

    /// Drop the secure channel, wiping its keys
    pub fn close_channel(&mut self) {
        if self.channel.take().is_some() {
            debug!("Secure channel closed");
            self.set_state(ChannelState::Closed);
        }
    }

    fn require_channel(&self) -> Result<()> {
        if self.channel.is_some() {
            Ok(())
        } else {
            Err(Error::NoSecureChannel)
        }
    }

    fn session_dek(&self) -> Result<Zeroizing<Vec<u8>>> {
        self.channel
            .as_ref()
            .and_then(ScpState::dek)
            .map(|dek| Zeroizing::new(dek.to_vec()))
            .ok_or(Error::NoSecureChannel)
    }

    /// Send a command, through the secure channel when one is open
    ///
    /// The channel counter is consumed before anything is transmitted. A
    /// transport failure keeps the channel; framing, integrity and counter
    /// errors close it.
    pub fn send(&mut self, command: &Command) -> Result<Response> {
        let Some(state) = self.channel.take() else {
            return self.processor.transmit(command);
        };

        let (state, apdus) = match state.wrap(command, self.processor.format()) {
            Ok(wrapped) => wrapped,
            Err(err) => return Err(self.channel_failed(err)),
        };

        let response = match self.processor.transmit_chain(&apdus) {
            Ok(response) => response,
            Err(err) if err.closes_channel() => return Err(self.channel_failed(err)),
            Err(err) => {
                self.channel = Some(state);
                return Err(err);
            }
        };

        match state.unwrap(response) {
            Ok((state, response)) => {
                self.channel = Some(state);
                Ok(response)
            }
            Err(err) => Err(self.channel_failed(err)),
        }
    }

    fn channel_failed(&mut self, err: Error) -> Error {
        warn!(%err, "Closing secure channel");
        self.set_state(ChannelState::Closed);
        err
    }

    /// Send a typed command and parse its response
    pub fn send_command<C>(&mut self, command: &C) -> Result<C::Success>
    where
        C: ApduCommand<Error = Error>,
    {
        let response = self.send(&command.to_command())?;
        C::parse_response(response)
    }

    /// GET DATA for `tag`, with an optional qualifying data field
    pub fn get_data(&mut self, tag: u16, data: impl Into<Bytes>) -> Result<Reply<Bytes>> {
        self.send_command(&GetDataCommand::with_data(tag, data))
    }

    /// Enumerate the keys provisioned on the token
    pub fn get_key_information(&mut self) -> Result<Reply<Vec<KeyInfo>>> {
        self.get_data(tag::KEY_INFORMATION, Bytes::new())?
            .and_then(|payload| parse_key_information(&payload).map(Reply::Ok))
    }

    /// Card recognition data, unwrapped from its card data template
    pub fn get_card_recognition_data(&mut self) -> Result<Reply<Bytes>> {
        self.get_data(tag::CARD_RECOGNITION_DATA, Bytes::new())?
            .and_then(|payload| {
                let data = tlv::find(&payload, tag::CARD_RECOGNITION_DATA)?.unwrap_or(payload.as_ref());
                let card_data = tlv::require(data, tag::CARD_DATA)?;
                Ok(Reply::Ok(Bytes::copy_from_slice(card_data)))
            })
    }

    /// CA key identifiers for off-card (`kloc`) and/or card (`klcc`) keys
    ///
    /// Asking for neither returns both. A missing data object counts as empty.
    pub fn get_supported_ca_identifiers(
        &mut self,
        kloc: bool,
        klcc: bool,
    ) -> Result<Reply<Vec<CaIdentifier>>> {
        let (kloc, klcc) = if kloc || klcc { (kloc, klcc) } else { (true, true) };

        let mut data = BytesMut::new();
        for (wanted, object) in [(kloc, tag::CA_KLOC_IDENTIFIERS), (klcc, tag::CA_KLCC_IDENTIFIERS)] {
            if !wanted {
                continue;
            }
            match self.get_data(object, Bytes::new())? {
                Reply::Ok(payload) => data.extend_from_slice(&payload),
                Reply::Declined(status) if status.is_referenced_data_not_found() => {}
                Reply::Declined(status) => return Ok(Reply::Declined(status)),
            }
        }

        parse_ca_identifiers(&data).map(Reply::Ok)
    }

    /// Certificate chain stored for `key_ref`, leaf last
    ///
    /// A missing store counts as an empty chain.
    pub fn get_certificate_bundle(&mut self, key_ref: KeyRef) -> Result<Reply<Vec<Vec<u8>>>> {
        let query = tlv::encode(
            tag::CONTROL_REFERENCE,
            &tlv::encode(tag::KID_KVN, &key_ref.to_bytes()),
        );
        match self.get_data(tag::CERTIFICATE_STORE, query)? {
            Reply::Ok(payload) => {
                let certificates = tlv::split(&payload)?
                    .into_iter()
                    .map(|certificate| certificate.raw.to_vec())
                    .collect();
                Ok(Reply::Ok(certificates))
            }
            Reply::Declined(status) if status.is_referenced_data_not_found() => {
                Ok(Reply::Ok(Vec::new()))
            }
            Reply::Declined(status) => Ok(Reply::Declined(status)),
        }
    }

    /// STORE DATA with a BER-TLV payload
    pub fn store_data(&mut self, data: impl Into<Bytes>) -> Result<Reply<()>> {
        self.require_channel()?;
        Ok(self.send_command(&StoreDataCommand::new(data))?.map(drop))
    }

    /// Store the certificate chain for `key_ref`, leaf last
    pub fn store_certificate_bundle(
        &mut self,
        key_ref: KeyRef,
        certificates: &[Vec<u8>],
    ) -> Result<Reply<()>> {
        let mut data = BytesMut::new();
        put_key_ref_template(&mut data, key_ref);
        tlv::put(&mut data, tag::CERTIFICATE_STORE, &certificates.concat());
        debug!(%key_ref, count = certificates.len(), "Storing certificate bundle");
        self.store_data(data.freeze())
    }

    /// Restrict the OCE certificates accepted for `key_ref` to `serials`
    pub fn store_allowlist(&mut self, key_ref: KeyRef, serials: &[Vec<u8>]) -> Result<Reply<()>> {
        let mut list = BytesMut::new();
        for serial in serials {
            tlv::put(&mut list, tag::SERIAL, serial);
        }

        let mut data = BytesMut::new();
        put_key_ref_template(&mut data, key_ref);
        tlv::put(&mut data, tag::ALLOWLIST, &list);
        debug!(%key_ref, count = serials.len(), "Storing allowlist");
        self.store_data(data.freeze())
    }

    /// Register the subject key identifier of the CA issuing for `key_ref`
    pub fn store_ca_issuer(&mut self, key_ref: KeyRef, ski: &[u8]) -> Result<Reply<()>> {
        let klcc = key_ref.family().is_scp11();

        let mut template = BytesMut::new();
        tlv::put(&mut template, tag::CA_TYPE, &[u8::from(klcc)]);
        tlv::put(&mut template, tag::SKI, ski);
        tlv::put(&mut template, tag::KID_KVN, &key_ref.to_bytes());

        let mut data = BytesMut::new();
        tlv::put(&mut data, tag::CONTROL_REFERENCE, &template);
        debug!(%key_ref, ski = %hex::encode(ski), "Storing CA issuer");
        self.store_data(data.freeze())
    }

    /// Register the CA certificate issuing for `key_ref` by its subject key identifier
    pub fn store_ca_issuer_certificate(&mut self, key_ref: KeyRef, der: &[u8]) -> Result<Reply<()>> {
        let ski = certificate::subject_key_identifier(der)?.ok_or_else(|| {
            Error::configuration("CA certificate has no subject key identifier")
        })?;
        self.store_ca_issuer(key_ref, &ski)
    }

    /// Delete keys matching `kid` and/or `kvn`, zero meaning "any"
    ///
    /// SCP03 key sets can only be addressed by version. `delete_last` allows
    /// removing the last key on the token.
    pub fn delete_key(&mut self, kid: u8, kvn: u8, delete_last: bool) -> Result<Reply<()>> {
        self.require_channel()?;
        if kid == 0 && kvn == 0 {
            return Err(Error::configuration("at least one of KID and KVN is required"));
        }

        let kid = if KeyFamily::of(kid) == KeyFamily::Scp03 {
            if kvn == 0 {
                return Err(Error::configuration("SCP03 keys can only be deleted by KVN"));
            }
            0
        } else {
            kid
        };

        debug!(kid, kvn, delete_last, "Deleting key");
        Ok(self
            .send_command(&DeleteKeyCommand::new(kid, kvn, delete_last))?
            .map(drop))
    }

    /// Generate a P-256 key pair on the token and return its public key
    pub fn generate_ec_key(&mut self, key_ref: KeyRef, replace_kvn: u8) -> Result<Reply<PublicKey>> {
        self.require_channel()?;
        debug!(%key_ref, replace_kvn, "Generating EC key");
        self.send_command(&GenerateKeyCommand::new(key_ref, replace_kvn))
    }

    /// Load an SCP03 key set, checking the returned key check values
    pub fn put_key_static(
        &mut self,
        key_ref: KeyRef,
        keys: &StaticKeys,
        replace_kvn: u8,
    ) -> Result<Reply<()>> {
        if key_ref.kid() != kid::SCP03 {
            return Err(Error::configuration(format!(
                "SCP03 key sets are stored at KID 0x01, not {key_ref}"
            )));
        }
        let key_dek = keys
            .dek()
            .ok_or_else(|| Error::configuration("SCP03 key set lacks a DEK"))?;
        let dek = self.session_dek()?;

        let mut data = BytesMut::new();
        data.extend_from_slice(&[key_ref.kvn()]);
        let mut expected = vec![key_ref.kvn()];
        for key in [keys.enc(), keys.mac(), key_dek] {
            let kcv = key_check_value(key)?;
            tlv::put(&mut data, tag::KEY_TYPE_AES, &wrap_key(&dek, key)?);
            data.extend_from_slice(&[KCV_LENGTH]);
            data.extend_from_slice(&kcv);
            expected.extend_from_slice(&kcv);
        }

        debug!(%key_ref, replace_kvn, "Putting SCP03 key set");
        let command = PutKeyCommand::new(replace_kvn, key_ref.kid() | MULTIPLE_KEYS, data.freeze());
        self.put_key(&command, &expected)
    }

    /// Load an EC private key, encrypted under the session DEK
    pub fn put_key_secret(
        &mut self,
        key_ref: KeyRef,
        secret_key: &SecretKey,
        replace_kvn: u8,
    ) -> Result<Reply<()>> {
        let dek = self.session_dek()?;
        let scalar = Zeroizing::new(secret_key.to_bytes().to_vec());

        let mut data = BytesMut::new();
        data.extend_from_slice(&[key_ref.kvn()]);
        tlv::put(&mut data, tag::KEY_TYPE_ECC_PRIVATE_KEY, &wrap_key(&dek, &scalar)?);
        tlv::put(&mut data, tag::KEY_TYPE_ECC_KEY_PARAMS, &[CURVE_P256]);
        data.extend_from_slice(&[0x00]);

        debug!(%key_ref, replace_kvn, "Putting EC private key");
        let command = PutKeyCommand::new(replace_kvn, key_ref.kid(), data.freeze());
        self.put_key(&command, &[key_ref.kvn()])
    }

    /// Load an EC public key, typically a CA key for verifying OCE certificates
    pub fn put_key_public(
        &mut self,
        key_ref: KeyRef,
        public_key: &PublicKey,
        replace_kvn: u8,
    ) -> Result<Reply<()>> {
        self.require_channel()?;

        let mut data = BytesMut::new();
        data.extend_from_slice(&[key_ref.kvn()]);
        tlv::put(
            &mut data,
            tag::KEY_TYPE_ECC_PUBLIC_KEY,
            public_key.to_encoded_point(false).as_bytes(),
        );
        tlv::put(&mut data, tag::KEY_TYPE_ECC_KEY_PARAMS, &[CURVE_P256]);
        data.extend_from_slice(&[0x00]);

        debug!(%key_ref, replace_kvn, "Putting EC public key");
        let command = PutKeyCommand::new(replace_kvn, key_ref.kid(), data.freeze());
        self.put_key(&command, &[key_ref.kvn()])
    }

    fn put_key(&mut self, command: &PutKeyCommand, expected: &[u8]) -> Result<Reply<()>> {
        self.send_command(command)?.and_then(|payload| {
            if ct_eq(&payload, expected) {
                Ok(Reply::Ok(()))
            } else {
                Err(Error::Authentication("key check value mismatch"))
            }
        })
    }

    /// Block every key on the token, returning it to its factory state
    ///
    /// Each key receives dummy authentication attempts until the token reports
    /// it blocked or the configured attempt limit is reached. This cannot be
    /// undone.
    pub fn reset(&mut self) -> Result<Reply<()>> {
        self.close_channel();

        let keys = match self.get_key_information()? {
            Reply::Ok(keys) => keys,
            Reply::Declined(status) => return Ok(Reply::Declined(status)),
        };
        info!(keys = keys.len(), "Resetting Security Domain");

        for info in &keys {
            let Some(command) = blocking_command(info.key_ref) else {
                continue;
            };
            if let Reply::Declined(status) = self.exhaust(info.key_ref, &command)? {
                warn!(key_ref = %info.key_ref, %status, "Reset stopped by token");
                return Ok(Reply::Declined(status));
            }
        }

        self.select()?;
        info!("Security Domain reset");
        Ok(Reply::Ok(()))
    }

    fn exhaust(&mut self, key_ref: KeyRef, command: &Command) -> Result<Reply<()>> {
        for attempt in 1..=self.config.reset_attempts {
            let status = self.processor.transmit(command)?.status();
            self.processor.record(&Event::ResetAttempt {
                key_ref,
                attempt,
                status,
            });

            if is_blocked(status) {
                self.processor.record(&Event::KeyBlocked {
                    key_ref,
                    attempts: attempt,
                });
                return Ok(Reply::Ok(()));
            }
            if !(status.is_incorrect_data() || status.is_success()) {
                return Ok(Reply::Declined(status));
            }
        }
        debug!(%key_ref, "Reset attempts used up without a blocked status");
        Ok(Reply::Ok(()))
    }
}

const fn is_blocked(status: StatusWord) -> bool {
    status.is_authentication_method_blocked() || status.is_security_condition_not_satisfied()
}

/// Dummy authentication that counts against `key_ref`'s retry counter
fn blocking_command(key_ref: KeyRef) -> Option<Command> {
    let command = match key_ref.kid() {
        // Version 0 addresses every SCP03 key set, including the defaults
        kid::SCP03 => InitializeUpdateCommand::new(0x00, RESET_CHALLENGE).to_command(),
        kid::SCP03_MAC | kid::SCP03_DEK => return None,
        kid::SCP11A | kid::SCP11C => {
            ExternalAuthenticateCommand::scp11(key_ref, RESET_CHALLENGE.to_vec()).to_command()
        }
        kid::SCP11B => {
            InternalAuthenticateCommand::new(key_ref, RESET_CHALLENGE.to_vec()).to_command()
        }
        _ => PerformSecurityOperationCommand::new(key_ref, RESET_CHALLENGE.to_vec()).to_command(),
    };
    Some(command)
}

fn put_key_ref_template(buf: &mut BytesMut, key_ref: KeyRef) {
    tlv::put(
        buf,
        tag::CONTROL_REFERENCE,
        &tlv::encode(tag::KID_KVN, &key_ref.to_bytes()),
    );
}

/// Collect `C0` entries from a key information response, skipping other tags
fn parse_key_information(payload: &[u8]) -> Result<Vec<KeyInfo>> {
    fn collect(tlvs: &[iso7816_tlv::ber::Tlv], out: &mut Vec<KeyInfo>) -> Result<()> {
        for item in tlvs {
            if tlv::tag_of(item) == tag::KEY_INFORMATION_DATA {
                if let Some(data) = tlv::primitive(item) {
                    out.push(KeyInfo::from_key_information_data(data)?);
                }
            } else {
                collect(tlv::children(item), out)?;
            }
        }
        Ok(())
    }

    let mut keys = Vec::new();
    collect(&tlv::parse_ber(payload)?, &mut keys)?;
    Ok(keys)
}

/// Pair up `42` SKI and `83` key reference objects
fn parse_ca_identifiers(data: &[u8]) -> Result<Vec<CaIdentifier>> {
    let items = tlv::split(data)?;
    if items.len() % 2 != 0 {
        return Err(Error::Framing("unpaired CA identifier entry"));
    }

    items
        .chunks_exact(2)
        .map(|pair| match (pair[0].tag, pair[1].value) {
            (tag::SKI, [kid, kvn]) if pair[1].tag == tag::KID_KVN => Ok(CaIdentifier {
                key_ref: KeyRef::reported(*kid, *kvn),
                ski: pair[0].value.to_vec(),
            }),
            _ => Err(Error::Framing("malformed CA identifier entry")),
        })
        .collect()
}
