//! Constants used by the Security Domain and its secure channels
//!
//! Values follow the GlobalPlatform Card Specification v2.3, Amendment D (SCP03)
//! and Amendment F (SCP11).

/// Application identifier of the Security Domain
pub const SECURITY_DOMAIN_AID: [u8; 8] = [0xA0, 0x00, 0x00, 0x01, 0x51, 0x00, 0x00, 0x00];

/// Command classes
pub mod cla {
    /// ISO7816 command class
    pub const ISO7816: u8 = 0x00;
    /// GlobalPlatform command class
    pub const GP: u8 = 0x80;
    /// Secure messaging indication bit
    pub const SECURE_MESSAGING: u8 = 0x04;
    /// Command chaining bit
    pub const CHAINING: u8 = 0x10;
}

/// Instruction codes
pub mod ins {
    /// SELECT
    pub const SELECT: u8 = 0xA4;
    /// GET DATA
    pub const GET_DATA: u8 = 0xCA;
    /// GET RESPONSE
    pub const GET_RESPONSE: u8 = 0xC0;
    /// INITIALIZE UPDATE
    pub const INITIALIZE_UPDATE: u8 = 0x50;
    /// EXTERNAL AUTHENTICATE
    pub const EXTERNAL_AUTHENTICATE: u8 = 0x82;
    /// INTERNAL AUTHENTICATE
    pub const INTERNAL_AUTHENTICATE: u8 = 0x88;
    /// PERFORM SECURITY OPERATION
    pub const PERFORM_SECURITY_OPERATION: u8 = 0x2A;
    /// PUT KEY
    pub const PUT_KEY: u8 = 0xD8;
    /// STORE DATA
    pub const STORE_DATA: u8 = 0xE2;
    /// DELETE
    pub const DELETE: u8 = 0xE4;
    /// GENERATE KEY
    pub const GENERATE_KEY: u8 = 0xF1;
}

/// Key identifiers
pub mod kid {
    /// SCP03 key set (ENC)
    pub const SCP03: u8 = 0x01;
    /// SCP03 MAC key slot
    pub const SCP03_MAC: u8 = 0x02;
    /// SCP03 DEK slot
    pub const SCP03_DEK: u8 = 0x03;
    /// OCE CA key (KLOC)
    pub const OCE_CA: u8 = 0x10;
    /// SCP11a SD key
    pub const SCP11A: u8 = 0x11;
    /// SCP11b SD key
    pub const SCP11B: u8 = 0x13;
    /// SCP11c SD key
    pub const SCP11C: u8 = 0x15;
}

/// Tags used in GET DATA, STORE DATA and key management payloads
pub mod tag {
    /// Key information template
    pub const KEY_INFORMATION: u16 = 0xE0;
    /// Key information data
    pub const KEY_INFORMATION_DATA: u16 = 0xC0;
    /// Card recognition data
    pub const CARD_RECOGNITION_DATA: u16 = 0x66;
    /// Card data template inside card recognition data
    pub const CARD_DATA: u16 = 0x73;
    /// CA key identifiers for off-card entity keys (KLOC)
    pub const CA_KLOC_IDENTIFIERS: u16 = 0xFF33;
    /// CA key identifiers for card keys (KLCC)
    pub const CA_KLCC_IDENTIFIERS: u16 = 0xFF34;
    /// Certificate store
    pub const CERTIFICATE_STORE: u16 = 0xBF21;
    /// Control reference template
    pub const CONTROL_REFERENCE: u16 = 0xA6;
    /// Key identifier and version
    pub const KID_KVN: u16 = 0x83;
    /// Subject key identifier
    pub const SKI: u16 = 0x42;
    /// CA type indicator inside a control reference template
    pub const CA_TYPE: u16 = 0x80;
    /// Serial number allowlist
    pub const ALLOWLIST: u16 = 0x70;
    /// Certificate serial number
    pub const SERIAL: u16 = 0x93;
    /// Key identifier in DELETE
    pub const DELETE_KID: u16 = 0xD0;
    /// Key version number in DELETE
    pub const DELETE_KVN: u16 = 0xD2;
    /// Ephemeral or static EC public key
    pub const EPHEMERAL_PUBLIC_KEY: u16 = 0x5F49;
    /// SCP11 receipt
    pub const RECEIPT: u16 = 0x86;
    /// Key usage qualifier
    pub const KEY_USAGE: u16 = 0x95;
    /// Key type
    pub const KEY_TYPE: u16 = 0x80;
    /// Key length
    pub const KEY_LENGTH: u16 = 0x81;
    /// Secure channel identifier and parameters
    pub const SCP_IDENTIFIER: u16 = 0x90;
    /// AES key component in PUT KEY
    pub const KEY_TYPE_AES: u16 = 0x88;
    /// EC public key component in PUT KEY and GENERATE KEY
    pub const KEY_TYPE_ECC_PUBLIC_KEY: u16 = 0xB0;
    /// EC private key component in PUT KEY
    pub const KEY_TYPE_ECC_PRIVATE_KEY: u16 = 0xB1;
    /// EC key parameters (curve reference)
    pub const KEY_TYPE_ECC_KEY_PARAMS: u16 = 0xF0;
}

/// SCP03 key derivation constants
pub mod derivation {
    /// Card cryptogram
    pub const CARD_CRYPTOGRAM: u8 = 0x00;
    /// Host cryptogram
    pub const HOST_CRYPTOGRAM: u8 = 0x01;
    /// Session encryption key
    pub const S_ENC: u8 = 0x04;
    /// Session command MAC key
    pub const S_MAC: u8 = 0x06;
    /// Session response MAC key
    pub const S_RMAC: u8 = 0x07;
}

/// Security level bits for EXTERNAL AUTHENTICATE P1
pub mod security_level {
    /// Command MAC
    pub const C_MAC: u8 = 0x01;
    /// Command decryption
    pub const C_DECRYPTION: u8 = 0x02;
    /// Response MAC
    pub const R_MAC: u8 = 0x10;
    /// Response encryption
    pub const R_ENCRYPTION: u8 = 0x20;
    /// Full protection in both directions
    pub const FULL: u8 = C_MAC | C_DECRYPTION | R_MAC | R_ENCRYPTION;
}

/// SCP11 key agreement parameters
pub mod scp11 {
    /// SCP identifier sent in the control reference template
    pub const SCP_ID: u8 = 0x11;
    /// Key usage: authenticated C-MAC, C-DECRYPTION, R-MAC and R-ENCRYPTION
    pub const KEY_USAGE: u8 = 0x3C;
    /// Key type: AES
    pub const KEY_TYPE: u8 = 0x88;
    /// Session key length in bytes
    pub const KEY_LENGTH: u8 = 16;
}

/// Length of the AES keys used throughout
pub const KEY_LENGTH: usize = 16;

/// Length of the truncated C-MAC and R-MAC tags
pub const MAC_LENGTH: usize = 8;

/// AES block size
pub const BLOCK_SIZE: usize = 16;

/// Default number of blocking attempts per key during reset
pub const DEFAULT_RESET_ATTEMPTS: u8 = 65;
