use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::env;

use crate::error::ConfigError;

pub const ALGORITHM: &str = "AES-256-GCM";
pub const KDF_PBKDF2: &str = "pbkdf2-sha256";
pub const KDF_RAW: &str = "raw";
pub const PBKDF2_ITERATIONS: u32 = 100_000;

pub const PASSWORD_ENV: &str = "CONFIG_PASSWORD";
pub const KEY_ENV: &str = "CONFIG_ENCRYPTION_KEY";

const SALT_LEN: usize = 16;

/// On-disk format of an encrypted config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub algorithm: String,
    pub kdf: String,
    #[serde(default)]
    pub iterations: u32,
    #[serde(default)]
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
}

/// Where the AES key comes from
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Password stretched with PBKDF2
    Password(String),
    /// 32 raw bytes, hex encoded
    HexKey(String),
}

impl KeySource {
    /// Read key material from `CONFIG_PASSWORD` or `CONFIG_ENCRYPTION_KEY`,
    /// picking the one the envelope was sealed with.
    pub fn from_env_for(envelope: &Envelope) -> Result<Self, ConfigError> {
        match envelope.kdf.as_str() {
            KDF_PBKDF2 => env::var(PASSWORD_ENV)
                .map(KeySource::Password)
                .map_err(|_| ConfigError::MissingKey(PASSWORD_ENV)),
            KDF_RAW => env::var(KEY_ENV)
                .map(KeySource::HexKey)
                .map_err(|_| ConfigError::MissingKey(KEY_ENV)),
            other => Err(ConfigError::UnsupportedEnvelope(format!("kdf {}", other))),
        }
    }

    /// Read whichever key material is present, password first
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(password) = env::var(PASSWORD_ENV) {
            return Ok(KeySource::Password(password));
        }
        env::var(KEY_ENV)
            .map(KeySource::HexKey)
            .map_err(|_| ConfigError::MissingKey("CONFIG_PASSWORD or CONFIG_ENCRYPTION_KEY"))
    }
}

/// Derive an AES-256 key from a password
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

/// Decode a hex key, which must be exactly 32 bytes
pub fn parse_hex_key(hex_key: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(hex_key.trim()).map_err(|e| ConfigError::InvalidKey(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(ConfigError::InvalidKey(format!(
            "expected 32 bytes (64 hex chars), got {} bytes",
            bytes.len()
        )));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Encrypt `plaintext` with the given key source
pub fn encrypt(plaintext: &[u8], source: &KeySource) -> Result<Envelope, ConfigError> {
    let (key, kdf, iterations, salt) = match source {
        KeySource::Password(password) => {
            let mut salt = [0u8; SALT_LEN];
            OsRng.fill_bytes(&mut salt);
            let key = derive_key(password, &salt, PBKDF2_ITERATIONS);
            (key, KDF_PBKDF2, PBKDF2_ITERATIONS, salt.to_vec())
        }
        KeySource::HexKey(hex_key) => (parse_hex_key(hex_key)?, KDF_RAW, 0, Vec::new()),
    };

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| ConfigError::Invalid("encryption failed".into()))?;

    Ok(Envelope {
        version: 1,
        algorithm: ALGORITHM.to_string(),
        kdf: kdf.to_string(),
        iterations,
        salt: BASE64.encode(salt),
        nonce: BASE64.encode(nonce.as_slice()),
        ciphertext: BASE64.encode(ciphertext),
    })
}

/// Decrypt an envelope. Any authentication failure maps to [`ConfigError::Decrypt`].
pub fn decrypt(envelope: &Envelope, source: &KeySource) -> Result<Vec<u8>, ConfigError> {
    if envelope.algorithm != ALGORITHM {
        return Err(ConfigError::UnsupportedEnvelope(format!(
            "algorithm {}",
            envelope.algorithm
        )));
    }

    let key = match (envelope.kdf.as_str(), source) {
        (KDF_PBKDF2, KeySource::Password(password)) => {
            let salt = decode_field(&envelope.salt, "salt")?;
            let iterations = if envelope.iterations == 0 {
                PBKDF2_ITERATIONS
            } else {
                envelope.iterations
            };
            derive_key(password, &salt, iterations)
        }
        (KDF_RAW, KeySource::HexKey(hex_key)) => parse_hex_key(hex_key)?,
        (KDF_PBKDF2, KeySource::HexKey(_)) => return Err(ConfigError::MissingKey(PASSWORD_ENV)),
        (KDF_RAW, KeySource::Password(_)) => return Err(ConfigError::MissingKey(KEY_ENV)),
        (other, _) => return Err(ConfigError::UnsupportedEnvelope(format!("kdf {}", other))),
    };

    let nonce_bytes = decode_field(&envelope.nonce, "nonce")?;
    if nonce_bytes.len() != 12 {
        return Err(ConfigError::UnsupportedEnvelope("nonce must be 12 bytes".into()));
    }
    let ciphertext = decode_field(&envelope.ciphertext, "ciphertext")?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
        .map_err(|_| ConfigError::Decrypt)
}

fn decode_field(value: &str, name: &str) -> Result<Vec<u8>, ConfigError> {
    BASE64
        .decode(value.trim())
        .map_err(|e| ConfigError::UnsupportedEnvelope(format!("{} is not base64: {}", name, e)))
}
