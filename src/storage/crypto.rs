//! Profiles payload encryption
//!
//! AES-256-GCM with a key derived from the passphrase via
//! PBKDF2-HMAC-SHA256. Every write draws a fresh salt and nonce, so two
//! saves of identical plaintext produce different envelopes.

use crate::error::EncryptionError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

pub const ENVELOPE_VERSION: u32 = 1;
const PBKDF2_ROUNDS: u32 = 200_000;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// On-disk shape of an encrypted profiles file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub encrypted: bool,
    pub version: u32,
    pub salt: String,
    pub nonce: String,
    pub data: String,
}

fn derive_key(passphrase: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
    key
}

/// Encrypt `plaintext` under `passphrase` into a fresh envelope
pub fn seal(plaintext: &[u8], passphrase: &str) -> Result<Envelope, EncryptionError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce);

    let key = derive_key(passphrase, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let data = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| EncryptionError::Cipher)?;

    Ok(Envelope {
        encrypted: true,
        version: ENVELOPE_VERSION,
        salt: BASE64.encode(salt),
        nonce: BASE64.encode(nonce),
        data: BASE64.encode(data),
    })
}

/// Decrypt an envelope. A wrong passphrase and a tampered payload are
/// indistinguishable under GCM and both report [`EncryptionError::BadPassphrase`].
pub fn open(envelope: &Envelope, passphrase: &str) -> Result<Vec<u8>, EncryptionError> {
    if envelope.version != ENVELOPE_VERSION {
        return Err(EncryptionError::UnsupportedVersion(envelope.version));
    }
    let salt = BASE64
        .decode(&envelope.salt)
        .map_err(|_| EncryptionError::MalformedEnvelope)?;
    let nonce = BASE64
        .decode(&envelope.nonce)
        .map_err(|_| EncryptionError::MalformedEnvelope)?;
    let data = BASE64
        .decode(&envelope.data)
        .map_err(|_| EncryptionError::MalformedEnvelope)?;
    if nonce.len() != NONCE_LEN {
        return Err(EncryptionError::MalformedEnvelope);
    }

    let key = derive_key(passphrase, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    cipher
        .decrypt(Nonce::from_slice(&nonce), data.as_ref())
        .map_err(|_| EncryptionError::BadPassphrase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_round_trip() {
        let envelope = seal(b"{\"current_profile\":\"main\"}", "pw").unwrap();
        assert!(envelope.encrypted);
        assert_eq!(envelope.version, ENVELOPE_VERSION);
        let plain = open(&envelope, "pw").unwrap();
        assert_eq!(plain, b"{\"current_profile\":\"main\"}");
    }

    #[test]
    fn test_wrong_passphrase_rejected() {
        let envelope = seal(b"secret", "pw").unwrap();
        assert!(matches!(
            open(&envelope, "pw2"),
            Err(EncryptionError::BadPassphrase)
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let mut envelope = seal(b"secret", "pw").unwrap();
        let mut data = BASE64.decode(&envelope.data).unwrap();
        data[0] ^= 0x01;
        envelope.data = BASE64.encode(data);
        assert!(matches!(
            open(&envelope, "pw"),
            Err(EncryptionError::BadPassphrase)
        ));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut envelope = seal(b"secret", "pw").unwrap();
        envelope.version = 2;
        assert!(matches!(
            open(&envelope, "pw"),
            Err(EncryptionError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_malformed_base64_rejected() {
        let mut envelope = seal(b"secret", "pw").unwrap();
        envelope.nonce = "not base64!".to_string();
        assert!(matches!(
            open(&envelope, "pw"),
            Err(EncryptionError::MalformedEnvelope)
        ));
    }

    #[test]
    fn test_fresh_salt_and_nonce_each_seal() {
        let first = seal(b"same", "pw").unwrap();
        let second = seal(b"same", "pw").unwrap();
        assert_ne!(first.salt, second.salt);
        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.data, second.data);
    }
}
