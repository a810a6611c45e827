//! Simulated Security Domain for integration tests
//!
//! The token keeps a key store with retry counters, a certificate store and CA
//! identifiers, and answers SCP03 and SCP11b handshakes. Once a channel is open
//! it verifies C-MACs, decrypts command data, and encrypts and R-MACs response
//! data, using the library's own primitives from the token's side.

#![allow(dead_code)]

use std::collections::BTreeMap;

use bytes::Bytes;
use nexum_apdu_core::{ApduFormat, CardTransport, Command, StatusWord, TransportError};
use nexum_apdu_securitydomain::{
    StaticKeys,
    constants::{MAC_LENGTH, cla, ins, kid, tag},
    crypto::{Block, cbc_decrypt, cmac, derive_scp03, key_check_value, x963_kdf},
    encryption::{Direction, decrypt_in, encrypt_in},
    mac::{compute_rmac, mac_command_with},
    tlv,
};
use p256::{PublicKey, SecretKey, ecdh::diffie_hellman, elliptic_curve::sec1::ToEncodedPoint};
use tracing_subscriber::EnvFilter;

/// Static secret of the SCP11b key provisioned at `KeyRef(0x13, 0x01)`
pub const SD_SECRET: [u8; 32] = [0x11; 32];

/// Authentication attempts a key survives before it blocks
pub const MAX_TRIES: u8 = 5;

const SW_OK: u16 = 0x9000;
const SW_WRONG_LENGTH: u16 = 0x6700;
const SW_SECURITY_NOT_SATISFIED: u16 = 0x6982;
const SW_BLOCKED: u16 = 0x6983;
const SW_CONDITIONS_NOT_SATISFIED: u16 = 0x6985;
const SW_INCORRECT_DATA: u16 = 0x6A80;
const SW_NOT_FOUND: u16 = 0x6A88;
const SW_INS_NOT_SUPPORTED: u16 = 0x6D00;

/// Card recognition data served for tag `66`
pub const CARD_DATA: [u8; 11] = [
    0x06, 0x07, 0x2A, 0x86, 0x48, 0x86, 0xFC, 0x6B, 0x01, 0x60, 0x00,
];

/// Log to the test output when `RUST_LOG` asks for it
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Public half of [`SD_SECRET`]
pub fn sd_public_key() -> PublicKey {
    SecretKey::from_slice(&SD_SECRET)
        .expect("valid scalar")
        .public_key()
}

#[derive(Debug, Clone)]
enum Material {
    Aes(StaticKeys),
    EcPrivate(SecretKey),
    EcPublic(PublicKey),
}

#[derive(Debug, Clone)]
struct StoredKey {
    kid: u8,
    kvn: u8,
    material: Material,
    tries: u8,
}

impl StoredKey {
    fn new(kid: u8, kvn: u8, material: Material) -> Self {
        Self {
            kid,
            kvn,
            material,
            tries: MAX_TRIES,
        }
    }

    fn components(&self) -> [u8; 2] {
        match self.material {
            Material::Aes(_) => [0x88, 0x10],
            Material::EcPrivate(_) => [0xB1, 0x00],
            Material::EcPublic(_) => [0xB0, 0x00],
        }
    }
}

#[derive(Debug, Clone)]
struct Channel {
    s_enc: Block,
    s_mac: Block,
    s_rmac: Block,
    dek: Option<Block>,
    chain: Block,
    counter: u32,
}

fn block(bytes: &[u8]) -> Block {
    bytes.try_into().expect("16-byte key")
}

fn ecdh(secret: &SecretKey, public: &PublicKey) -> Vec<u8> {
    diffie_hellman(secret.to_nonzero_scalar(), public.as_affine())
        .raw_secret_bytes()
        .to_vec()
}

/// Response body and status word
type Outcome = (Vec<u8>, u16);

fn status(sw: u16) -> Outcome {
    (Vec::new(), sw)
}

/// In-memory Security Domain implementing [`CardTransport`]
#[derive(Debug)]
pub struct SimulatedToken {
    keys: Vec<StoredKey>,
    certificates: BTreeMap<[u8; 2], Vec<u8>>,
    ca_identifiers: Vec<(bool, Vec<u8>, [u8; 2])>,
    allowlists: BTreeMap<[u8; 2], Vec<Vec<u8>>>,
    channel: Option<Channel>,
    pending_scp03: Option<(Channel, Vec<u8>, usize)>,
    chained_plain: Vec<u8>,
    chained_secure: Vec<u8>,
    pending_body: Vec<u8>,
    pending_sw: u16,
    seed: u8,
    /// Every APDU exactly as received
    pub wire: Vec<Vec<u8>>,
    /// Every command after secure messaging was removed
    pub received: Vec<Command>,
    /// Split response data into chunks of this size, announced with `61xx`
    pub max_response_chunk: Option<usize>,
    /// Corrupt the R-MAC of the next protected response
    pub tamper_next_rmac: bool,
    /// Answer the next complete command with this status word
    pub reject_next: Option<u16>,
    /// Fail the next transmission at the transport level
    pub fail_next_transmit: bool,
}

impl Default for SimulatedToken {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedToken {
    /// Token with the factory SCP03 key set and an SCP11b key
    pub fn new() -> Self {
        let sd_secret = SecretKey::from_slice(&SD_SECRET).expect("valid scalar");
        Self {
            keys: vec![
                StoredKey::new(kid::SCP03, 0xFF, Material::Aes(StaticKeys::default_keys())),
                StoredKey::new(kid::SCP11B, 0x01, Material::EcPrivate(sd_secret)),
            ],
            certificates: BTreeMap::new(),
            ca_identifiers: Vec::new(),
            allowlists: BTreeMap::new(),
            channel: None,
            pending_scp03: None,
            chained_plain: Vec::new(),
            chained_secure: Vec::new(),
            pending_body: Vec::new(),
            pending_sw: SW_OK,
            seed: 0,
            wire: Vec::new(),
            received: Vec::new(),
            max_response_chunk: None,
            tamper_next_rmac: false,
            reject_next: None,
            fail_next_transmit: false,
        }
    }

    /// Add an SCP03 key set
    pub fn with_scp03_keys(mut self, kvn: u8, keys: StaticKeys) -> Self {
        self.keys
            .push(StoredKey::new(kid::SCP03, kvn, Material::Aes(keys)));
        self
    }

    /// Add an OCE or CA public key
    pub fn with_public_key(mut self, kid: u8, kvn: u8, key: PublicKey) -> Self {
        self.keys
            .push(StoredKey::new(kid, kvn, Material::EcPublic(key)));
        self
    }

    /// `(kid, kvn)` of every key still usable
    pub fn key_refs(&self) -> Vec<[u8; 2]> {
        self.keys
            .iter()
            .filter(|key| key.tries > 0)
            .map(|key| [key.kid, key.kvn])
            .collect()
    }

    /// Stored certificate store value for `(kid, kvn)`
    pub fn certificates(&self, key_ref: [u8; 2]) -> Option<&[u8]> {
        self.certificates.get(&key_ref).map(Vec::as_slice)
    }

    /// Stored serial allowlist for `(kid, kvn)`
    pub fn allowlist(&self, key_ref: [u8; 2]) -> Option<&[Vec<u8>]> {
        self.allowlists.get(&key_ref).map(Vec::as_slice)
    }

    /// Whether a secure channel is open on the token's side
    pub const fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    /// Counter the token expects on the next protected command
    pub fn channel_counter(&self) -> Option<u32> {
        self.channel.as_ref().map(|channel| channel.counter)
    }

    fn next_seed(&mut self) -> u8 {
        self.seed = self.seed.wrapping_add(1).max(1);
        self.seed
    }

    fn process(&mut self, raw: &[u8]) -> Vec<u8> {
        let Ok(command) = Command::from_bytes(raw) else {
            return self.deliver(status(SW_WRONG_LENGTH));
        };

        if command.cla == cla::ISO7816 && command.ins == ins::GET_RESPONSE {
            if self.pending_body.is_empty() {
                return self.deliver(status(SW_CONDITIONS_NOT_SATISFIED));
            }
            return self.next_chunk();
        }

        let format = if raw.len() > 5 && raw[4] == 0x00 {
            ApduFormat::Extended
        } else {
            ApduFormat::Short
        };

        if command.cla & cla::SECURE_MESSAGING != 0 {
            return self.process_secure(&command, format);
        }

        let outcome = if command.cla & cla::CHAINING != 0 {
            self.chained_plain
                .extend_from_slice(command.data.as_deref().unwrap_or_default());
            status(SW_OK)
        } else {
            let mut data = std::mem::take(&mut self.chained_plain);
            data.extend_from_slice(command.data.as_deref().unwrap_or_default());
            let mut plain = Command::new(command.cla, command.ins, command.p1, command.p2);
            if !data.is_empty() {
                plain.data = Some(Bytes::from(data));
            }
            plain.le = command.le;
            self.execute(plain)
        };
        self.deliver(outcome)
    }

    /// Strip and check the C-MAC, returning the payload and the new chain
    fn verify_cmac(channel: &Channel, command: &Command, format: ApduFormat) -> Option<(Vec<u8>, Block)> {
        let data = command.data.as_deref()?;
        if data.len() < MAC_LENGTH {
            return None;
        }
        let payload = &data[..data.len() - MAC_LENGTH];

        let mut plain = Command::new(
            command.cla & !cla::SECURE_MESSAGING,
            command.ins,
            command.p1,
            command.p2,
        );
        if !payload.is_empty() {
            plain.data = Some(Bytes::copy_from_slice(payload));
        }
        plain.le = command.le;

        let (expected, chain) =
            mac_command_with(format, &plain, &channel.s_mac, &channel.chain).ok()?;
        (expected.data == command.data).then(|| (payload.to_vec(), chain))
    }

    fn process_secure(&mut self, command: &Command, format: ApduFormat) -> Vec<u8> {
        if self.channel.is_none() && command.ins == ins::EXTERNAL_AUTHENTICATE {
            let outcome = self.external_authenticate_scp03(command, format);
            return self.deliver(outcome);
        }

        let Some(mut channel) = self.channel.take() else {
            return self.deliver(status(SW_SECURITY_NOT_SATISFIED));
        };
        let Some((payload, chain)) = Self::verify_cmac(&channel, command, format) else {
            self.chained_secure.clear();
            return self.deliver(status(SW_SECURITY_NOT_SATISFIED));
        };
        channel.chain = chain;

        if command.cla & cla::CHAINING != 0 {
            self.chained_secure.extend_from_slice(&payload);
            self.channel = Some(channel);
            return self.deliver(status(SW_OK));
        }

        let mut ciphertext = std::mem::take(&mut self.chained_secure);
        ciphertext.extend_from_slice(&payload);

        let counter = channel.counter;
        channel.counter += 1;

        let data = if ciphertext.is_empty() {
            Vec::new()
        } else {
            match decrypt_in(Direction::Command, &ciphertext, &channel.s_enc, counter) {
                Ok(data) => data,
                Err(_) => return self.deliver(status(SW_SECURITY_NOT_SATISFIED)),
            }
        };

        let s_enc = channel.s_enc;
        let s_rmac = channel.s_rmac;
        let chain = channel.chain;
        self.channel = Some(channel);

        let mut plain = Command::new(
            command.cla & !(cla::SECURE_MESSAGING | cla::CHAINING),
            command.ins,
            command.p1,
            command.p2,
        );
        if !data.is_empty() {
            plain.data = Some(Bytes::from(data));
        }
        plain.le = command.le;

        let (body, sw) = self.execute(plain);
        if body.is_empty() {
            return self.deliver(status(sw));
        }

        let mut protected =
            encrypt_in(Direction::Response, &body, &s_enc, counter).expect("response encryption");
        let mut rmac = compute_rmac(&s_rmac, &chain, &protected, StatusWord::from_u16(sw)).expect("R-MAC");
        if std::mem::take(&mut self.tamper_next_rmac) {
            rmac[0] ^= 0x01;
        }
        protected.extend_from_slice(&rmac);
        self.deliver((protected, sw))
    }

    fn deliver(&mut self, (body, sw): Outcome) -> Vec<u8> {
        self.pending_body = body;
        self.pending_sw = sw;
        self.next_chunk()
    }

    fn next_chunk(&mut self) -> Vec<u8> {
        let limit = self.max_response_chunk.unwrap_or(usize::MAX);
        let take = self.pending_body.len().min(limit);
        let mut out: Vec<u8> = self.pending_body.drain(..take).collect();
        if self.pending_body.is_empty() {
            out.extend_from_slice(&self.pending_sw.to_be_bytes());
        } else {
            out.extend_from_slice(&[0x61, self.pending_body.len().min(0xFF) as u8]);
        }
        out
    }

    fn execute(&mut self, command: Command) -> Outcome {
        self.received.push(command.clone());
        if let Some(sw) = self.reject_next.take() {
            return status(sw);
        }

        let data = command.data.as_deref().unwrap_or_default().to_vec();
        match command.ins {
            ins::SELECT => self.select(),
            ins::GET_DATA => self.get_data(command.p1, command.p2, &data),
            ins::INITIALIZE_UPDATE => self.initialize_update(command.p1, &data),
            ins::INTERNAL_AUTHENTICATE => {
                self.internal_authenticate(command.p1, command.p2, &data)
            }
            ins::EXTERNAL_AUTHENTICATE | ins::PERFORM_SECURITY_OPERATION => {
                self.dummy_attempt(command.p2, command.p1)
            }
            ins::STORE_DATA if self.channel.is_some() => self.store_data(&data),
            ins::PUT_KEY if self.channel.is_some() => {
                self.put_key(command.p1, command.p2, &data)
            }
            ins::DELETE if self.channel.is_some() => self.delete(&data),
            ins::GENERATE_KEY if self.channel.is_some() => {
                self.generate_key(command.p1, command.p2, &data)
            }
            ins::STORE_DATA | ins::PUT_KEY | ins::DELETE | ins::GENERATE_KEY => {
                status(SW_SECURITY_NOT_SATISFIED)
            }
            _ => status(SW_INS_NOT_SUPPORTED),
        }
    }

    fn select(&mut self) -> Outcome {
        self.channel = None;
        self.pending_scp03 = None;
        self.keys.retain(|key| key.tries > 0);
        if !self.keys.iter().any(|key| key.kid == kid::SCP03) {
            self.keys.push(StoredKey::new(
                kid::SCP03,
                0xFF,
                Material::Aes(StaticKeys::default_keys()),
            ));
        }
        status(SW_OK)
    }

    fn find_key(&mut self, kid: u8, kvn: u8) -> Option<&mut StoredKey> {
        self.keys
            .iter_mut()
            .find(|key| key.kid == kid && key.kvn == kvn)
    }

    /// Count a failed authentication against a key
    fn dummy_attempt(&mut self, kid: u8, kvn: u8) -> Outcome {
        let Some(key) = self.find_key(kid, kvn) else {
            return status(SW_NOT_FOUND);
        };
        if key.tries == 0 {
            return status(SW_BLOCKED);
        }
        key.tries -= 1;
        if key.tries == 0 {
            status(SW_BLOCKED)
        } else {
            status(SW_INCORRECT_DATA)
        }
    }

    fn initialize_update(&mut self, kvn: u8, data: &[u8]) -> Outcome {
        let Ok(host_challenge) = <[u8; 8]>::try_from(data) else {
            return status(SW_WRONG_LENGTH);
        };
        // A new handshake ends whatever session was open
        self.channel = None;
        let Some(index) = self
            .keys
            .iter()
            .position(|key| key.kid == kid::SCP03 && if kvn == 0 { key.tries > 0 } else { key.kvn == kvn })
        else {
            // Version 0 with every key set blocked
            return status(if kvn == 0 { SW_BLOCKED } else { SW_NOT_FOUND });
        };

        let key = &mut self.keys[index];
        if key.tries == 0 {
            return status(SW_BLOCKED);
        }
        key.tries -= 1;
        let key_kvn = key.kvn;
        let Material::Aes(keys) = key.material.clone() else {
            return status(SW_NOT_FOUND);
        };

        let card_challenge = [self.next_seed(); 8];
        let mut context = host_challenge.to_vec();
        context.extend_from_slice(&card_challenge);

        let derive = |key: &[u8], constant: u8, bits: u16| {
            derive_scp03(key, constant, &context, bits).expect("SCP03 derivation")
        };
        let s_enc = derive(keys.enc(), 0x04, 128);
        let s_mac = derive(keys.mac(), 0x06, 128);
        let s_rmac = derive(keys.mac(), 0x07, 128);
        let card_cryptogram = derive(&s_mac[..], 0x00, 64);
        let host_cryptogram = derive(&s_mac[..], 0x01, 64);

        let channel = Channel {
            s_enc: block(&s_enc),
            s_mac: block(&s_mac),
            s_rmac: block(&s_rmac),
            dek: keys.dek().map(block),
            chain: [0u8; 16],
            counter: 1,
        };
        self.pending_scp03 = Some((channel, host_cryptogram.to_vec(), index));

        let mut body = vec![0u8; 10];
        body.extend_from_slice(&[key_kvn, 0x03, 0x00]);
        body.extend_from_slice(&card_challenge);
        body.extend_from_slice(&card_cryptogram);
        (body, SW_OK)
    }

    fn external_authenticate_scp03(&mut self, command: &Command, format: ApduFormat) -> Outcome {
        let Some((mut channel, host_cryptogram, index)) = self.pending_scp03.take() else {
            return status(SW_CONDITIONS_NOT_SATISFIED);
        };
        let Some((payload, chain)) = Self::verify_cmac(&channel, command, format) else {
            return status(SW_SECURITY_NOT_SATISFIED);
        };
        if payload != host_cryptogram {
            return status(SW_SECURITY_NOT_SATISFIED);
        }

        self.received.push(command.clone());
        channel.chain = chain;
        self.channel = Some(channel);
        self.keys[index].tries = MAX_TRIES;
        status(SW_OK)
    }

    fn internal_authenticate(&mut self, kvn: u8, kid: u8, data: &[u8]) -> Outcome {
        if data.len() == 8 {
            return self.dummy_attempt(kid, kvn);
        }

        let Some(key) = self.find_key(kid, kvn) else {
            return status(SW_NOT_FOUND);
        };
        if key.tries == 0 {
            return status(SW_BLOCKED);
        }
        let Material::EcPrivate(sk_sd) = key.material.clone() else {
            return status(SW_INCORRECT_DATA);
        };

        let Ok(Some(point)) = tlv::find(data, tag::EPHEMERAL_PUBLIC_KEY) else {
            return status(SW_INCORRECT_DATA);
        };
        let Ok(epk_oce) = PublicKey::from_sec1_bytes(point) else {
            return status(SW_INCORRECT_DATA);
        };

        let esk_sd = SecretKey::from_slice(&[0x33; 32]).expect("valid scalar");
        let mut shared = ecdh(&esk_sd, &epk_oce);
        shared.extend_from_slice(&ecdh(&sk_sd, &epk_oce));
        let material = x963_kdf(&shared, &[0x3C, 0x88, 0x10], 80);

        let epk_sd = tlv::encode(
            tag::EPHEMERAL_PUBLIC_KEY,
            esk_sd.public_key().to_encoded_point(false).as_bytes(),
        );
        let receipt = cmac(&material[..16], &[data, &epk_sd[..]]).expect("receipt");

        self.channel = Some(Channel {
            s_enc: block(&material[16..32]),
            s_mac: block(&material[32..48]),
            s_rmac: block(&material[48..64]),
            dek: Some(block(&material[64..80])),
            chain: receipt,
            counter: 1,
        });

        let mut body = epk_sd;
        body.extend_from_slice(&tlv::encode(tag::RECEIPT, &receipt));
        (body, SW_OK)
    }

    fn get_data(&mut self, p1: u8, p2: u8, data: &[u8]) -> Outcome {
        match u16::from_be_bytes([p1, p2]) {
            tag::KEY_INFORMATION => {
                let mut entries = Vec::new();
                for key in self.keys.iter().filter(|key| key.tries > 0) {
                    let mut entry = vec![key.kid, key.kvn];
                    entry.extend_from_slice(&key.components());
                    entries.extend_from_slice(&tlv::encode(tag::KEY_INFORMATION_DATA, &entry));
                }
                (tlv::encode(tag::KEY_INFORMATION, &entries), SW_OK)
            }
            tag::CARD_RECOGNITION_DATA => {
                let card_data = tlv::encode(tag::CARD_DATA, &CARD_DATA);
                (tlv::encode(tag::CARD_RECOGNITION_DATA, &card_data), SW_OK)
            }
            tag::CERTIFICATE_STORE => {
                let key_ref = tlv::require(data, tag::CONTROL_REFERENCE)
                    .and_then(|crt| tlv::require(crt, tag::KID_KVN))
                    .ok()
                    .and_then(|value| <[u8; 2]>::try_from(value).ok());
                match key_ref.and_then(|key_ref| self.certificates.get(&key_ref)) {
                    Some(certificates) => (certificates.clone(), SW_OK),
                    None => status(SW_NOT_FOUND),
                }
            }
            object @ (tag::CA_KLOC_IDENTIFIERS | tag::CA_KLCC_IDENTIFIERS) => {
                let klcc = object == tag::CA_KLCC_IDENTIFIERS;
                let mut body = Vec::new();
                for (_, ski, key_ref) in self.ca_identifiers.iter().filter(|id| id.0 == klcc) {
                    body.extend_from_slice(&tlv::encode(tag::SKI, ski));
                    body.extend_from_slice(&tlv::encode(tag::KID_KVN, key_ref));
                }
                if body.is_empty() {
                    status(SW_NOT_FOUND)
                } else {
                    (body, SW_OK)
                }
            }
            _ => status(SW_NOT_FOUND),
        }
    }

    fn store_data(&mut self, data: &[u8]) -> Outcome {
        let Ok(items) = tlv::split(data) else {
            return status(SW_INCORRECT_DATA);
        };
        let Some(crt) = items.first().filter(|item| item.tag == tag::CONTROL_REFERENCE) else {
            return status(SW_INCORRECT_DATA);
        };
        let Ok(key_ref) = tlv::require(crt.value, tag::KID_KVN) else {
            return status(SW_INCORRECT_DATA);
        };
        let Ok(key_ref) = <[u8; 2]>::try_from(key_ref) else {
            return status(SW_INCORRECT_DATA);
        };

        if let Ok(Some(ca_type)) = tlv::find(crt.value, tag::CA_TYPE) {
            let Ok(ski) = tlv::require(crt.value, tag::SKI) else {
                return status(SW_INCORRECT_DATA);
            };
            self.ca_identifiers
                .push((ca_type == [0x01], ski.to_vec(), key_ref));
            return status(SW_OK);
        }

        for item in &items[1..] {
            match item.tag {
                tag::CERTIFICATE_STORE => {
                    self.certificates.insert(key_ref, item.value.to_vec());
                }
                tag::ALLOWLIST => {
                    let Ok(serials) = tlv::split(item.value) else {
                        return status(SW_INCORRECT_DATA);
                    };
                    self.allowlists.insert(
                        key_ref,
                        serials.iter().map(|serial| serial.value.to_vec()).collect(),
                    );
                }
                _ => return status(SW_INCORRECT_DATA),
            }
        }
        status(SW_OK)
    }

    fn dek(&self) -> Option<Block> {
        self.channel.as_ref().and_then(|channel| channel.dek)
    }

    fn install(&mut self, kid: u8, kvn: u8, replace_kvn: u8, material: Material) {
        self.keys.retain(|key| {
            !(key.kid == kid && (key.kvn == kvn || (replace_kvn != 0 && key.kvn == replace_kvn)))
        });
        self.keys.push(StoredKey::new(kid, kvn, material));
    }

    fn put_key(&mut self, replace_kvn: u8, p2: u8, data: &[u8]) -> Outcome {
        let Some(dek) = self.dek() else {
            return status(SW_CONDITIONS_NOT_SATISFIED);
        };
        let Some((&kvn, rest)) = data.split_first() else {
            return status(SW_WRONG_LENGTH);
        };
        let kid = p2 & 0x7F;

        if p2 & 0x80 != 0 {
            let mut keys = Vec::new();
            let mut response = vec![kvn];
            let mut rest = rest;
            while let [0x88, len, tail @ ..] = rest {
                let len = usize::from(*len);
                if tail.len() < len + 1 {
                    return status(SW_WRONG_LENGTH);
                }
                let key = cbc_decrypt(&dek, &[0u8; 16], &tail[..len]).expect("key unwrap");
                let kcv_len = usize::from(tail[len]);
                let Some(kcv) = tail.get(len + 1..len + 1 + kcv_len) else {
                    return status(SW_WRONG_LENGTH);
                };
                if kcv != key_check_value(&key).expect("kcv").as_slice() {
                    return status(SW_INCORRECT_DATA);
                }
                response.extend_from_slice(kcv);
                keys.push(key);
                rest = &tail[len + 1 + kcv_len..];
            }
            let [enc, mac, key_dek] = keys.as_slice() else {
                return status(SW_INCORRECT_DATA);
            };
            let Ok(static_keys) = StaticKeys::from_slices(enc, mac, Some(key_dek.as_slice())) else {
                return status(SW_INCORRECT_DATA);
            };
            self.install(kid, kvn, replace_kvn, Material::Aes(static_keys));
            return (response, SW_OK);
        }

        // Trailing byte after the key parameters
        let Some((_, components)) = rest.split_last() else {
            return status(SW_WRONG_LENGTH);
        };
        let Ok(items) = tlv::split(components) else {
            return status(SW_INCORRECT_DATA);
        };
        let material = items.iter().find_map(|item| match item.tag {
            tag::KEY_TYPE_ECC_PRIVATE_KEY => {
                let scalar = cbc_decrypt(&dek, &[0u8; 16], item.value).ok()?;
                SecretKey::from_slice(&scalar).ok().map(Material::EcPrivate)
            }
            tag::KEY_TYPE_ECC_PUBLIC_KEY => PublicKey::from_sec1_bytes(item.value)
                .ok()
                .map(Material::EcPublic),
            _ => None,
        });
        let Some(material) = material else {
            return status(SW_INCORRECT_DATA);
        };
        self.install(kid, kvn, replace_kvn, material);
        (vec![kvn], SW_OK)
    }

    fn generate_key(&mut self, replace_kvn: u8, kid: u8, data: &[u8]) -> Outcome {
        let Some(&kvn) = data.first() else {
            return status(SW_WRONG_LENGTH);
        };
        let secret = SecretKey::from_slice(&[self.next_seed(); 32]).expect("valid scalar");
        let point = tlv::encode(
            tag::KEY_TYPE_ECC_PUBLIC_KEY,
            secret.public_key().to_encoded_point(false).as_bytes(),
        );
        self.install(kid, kvn, replace_kvn, Material::EcPrivate(secret));
        (point, SW_OK)
    }

    fn delete(&mut self, data: &[u8]) -> Outcome {
        let kid = tlv::find(data, tag::DELETE_KID).ok().flatten().and_then(|v| v.first().copied());
        let kvn = tlv::find(data, tag::DELETE_KVN).ok().flatten().and_then(|v| v.first().copied());
        if kid.is_none() && kvn.is_none() {
            return status(SW_INCORRECT_DATA);
        }

        let before = self.keys.len();
        self.keys.retain(|key| {
            !(kid.is_none_or(|kid| key.kid == kid) && kvn.is_none_or(|kvn| key.kvn == kvn))
        });
        if self.keys.len() == before {
            status(SW_NOT_FOUND)
        } else {
            status(SW_OK)
        }
    }
}

impl CardTransport for SimulatedToken {
    type Error = TransportError;

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        self.wire.push(command.to_vec());
        if std::mem::take(&mut self.fail_next_transmit) {
            return Err(TransportError::Transmission);
        }
        Ok(Bytes::from(self.process(command)))
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.select();
        Ok(())
    }
}
