//! Authenticated encryption envelope
//!
//! Every payload on the broker is an envelope:
//!
//! ```text
//! base64( nonce (12 bytes) || AES-256-GCM ciphertext || tag (16 bytes) )
//! ```
//!
//! The key is the SHA-256 digest of the shared passphrase. There is no salt
//! and no iteration count, so the effective key space is bounded by the
//! passphrase itself. Every peer must derive the key this same way.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::EnvelopeError;

/// Size of the AES-GCM nonce prepended to every ciphertext
pub const NONCE_SIZE: usize = 12;

/// Size of the derived AES-256 key
pub const KEY_SIZE: usize = 32;

/// Passphrase shared out-of-band by client and server.
///
/// Never transmitted and never printed.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SharedSecret(String);

impl SharedSecret {
    /// Wrap a passphrase
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self(passphrase.into())
    }

    /// Borrow the raw passphrase
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the passphrase is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(***)")
    }
}

impl fmt::Display for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl From<&str> for SharedSecret {
    fn from(passphrase: &str) -> Self {
        Self::new(passphrase)
    }
}

/// Derive the symmetric key from a passphrase.
///
/// Same passphrase, same key, always.
pub fn derive_key(passphrase: &str) -> [u8; KEY_SIZE] {
    Sha256::digest(passphrase.as_bytes()).into()
}

/// AES-256-GCM cipher keyed once from the shared secret.
///
/// Built at startup and shared read-only between tasks.
#[derive(Clone)]
pub struct EnvelopeCipher {
    cipher: Aes256Gcm,
}

impl EnvelopeCipher {
    /// Create a cipher from the shared secret
    pub fn new(secret: &SharedSecret) -> Self {
        Self::from_passphrase(secret.expose())
    }

    /// Create a cipher from a raw passphrase
    pub fn from_passphrase(passphrase: &str) -> Self {
        let key = derive_key(passphrase);
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// Encrypt `plaintext` into a text-encoded envelope.
    ///
    /// A fresh random nonce is drawn for every call.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut nonce_bytes)
            .map_err(|e| EnvelopeError::Encryption(format!("failed to generate nonce: {}", e)))?;

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| EnvelopeError::Encryption(format!("failed to encrypt: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(general_purpose::STANDARD.encode(sealed).into_bytes())
    }

    /// Decode, authenticate and decrypt an envelope.
    pub fn open(&self, envelope: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let decoded = general_purpose::STANDARD
            .decode(envelope)
            .map_err(|e| EnvelopeError::Decryption(format!("failed to decode base64: {}", e)))?;

        if decoded.len() < NONCE_SIZE {
            return Err(EnvelopeError::Decryption("ciphertext too short".to_string()));
        }

        let (nonce, ciphertext) = decoded.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| EnvelopeError::Decryption("message authentication failed".to_string()))
    }
}

impl fmt::Debug for EnvelopeCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeCipher").finish_non_exhaustive()
    }
}

/// Seal `plaintext` under `passphrase`, deriving the key for this call only
pub fn seal(plaintext: &[u8], passphrase: &str) -> Result<Vec<u8>, EnvelopeError> {
    EnvelopeCipher::from_passphrase(passphrase).seal(plaintext)
}

/// Open `envelope` under `passphrase`, deriving the key for this call only
pub fn open(envelope: &[u8], passphrase: &str) -> Result<Vec<u8>, EnvelopeError> {
    EnvelopeCipher::from_passphrase(passphrase).open(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(envelope: &[u8]) -> Vec<u8> {
        general_purpose::STANDARD.decode(envelope).unwrap()
    }

    fn encode(raw: &[u8]) -> Vec<u8> {
        general_purpose::STANDARD.encode(raw).into_bytes()
    }

    #[test]
    fn test_roundtrip() {
        for payload in [
            &b""[..],
            b"a",
            br#"{"action":"exec","command":["ls","-la"]}"#,
            &[0u8, 255, 1, 254, 7][..],
        ] {
            let sealed = seal(payload, "correct horse").unwrap();
            let opened = open(&sealed, "correct horse").unwrap();
            assert_eq!(opened, payload);
        }
    }

    #[test]
    fn test_roundtrip_large_payload() {
        let payload = vec![0x5a; 256 * 1024];
        let cipher = EnvelopeCipher::from_passphrase("k");
        let sealed = cipher.seal(&payload).unwrap();
        assert_eq!(cipher.open(&sealed).unwrap(), payload);
    }

    #[test]
    fn test_envelope_layout() {
        let sealed = seal(b"hello", "k").unwrap();
        // nonce + plaintext + 16-byte tag
        assert_eq!(decode(&sealed).len(), NONCE_SIZE + 5 + 16);
    }

    #[test]
    fn test_tamper_detection_every_bit() {
        let cipher = EnvelopeCipher::from_passphrase("secret");
        let sealed = cipher.seal(b"rm -rf /tmp/scratch").unwrap();
        let raw = decode(&sealed);

        for byte in NONCE_SIZE..raw.len() {
            for bit in 0..8 {
                let mut tampered = raw.clone();
                tampered[byte] ^= 1 << bit;
                let result = cipher.open(&encode(&tampered));
                assert!(
                    matches!(result, Err(EnvelopeError::Decryption(_))),
                    "flip of byte {} bit {} was accepted",
                    byte,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_tampered_nonce_rejected() {
        let cipher = EnvelopeCipher::from_passphrase("secret");
        let mut raw = decode(&cipher.seal(b"payload").unwrap());
        raw[0] ^= 0x01;
        assert!(cipher.open(&encode(&raw)).is_err());
    }

    #[test]
    fn test_wrong_key() {
        let sealed = seal(b"uptime", "key-one").unwrap();
        for wrong in ["key-two", "", "key-one ", "KEY-ONE"] {
            assert!(matches!(
                open(&sealed, wrong),
                Err(EnvelopeError::Decryption(_))
            ));
        }
    }

    #[test]
    fn test_nonce_uniqueness() {
        let cipher = EnvelopeCipher::from_passphrase("k");
        let a = cipher.seal(b"same").unwrap();
        let b = cipher.seal(b"same").unwrap();
        assert_ne!(a, b);
        assert_ne!(decode(&a)[..NONCE_SIZE], decode(&b)[..NONCE_SIZE]);
    }

    #[test]
    fn test_invalid_base64() {
        let err = open(b"not base64 !!!", "k").unwrap_err();
        assert!(err.to_string().contains("base64"));
    }

    #[test]
    fn test_too_short() {
        let short = encode(&[0u8; NONCE_SIZE - 1]);
        let err = open(&short, "k").unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_nonce_only_fails_authentication() {
        let nonce_only = encode(&[0u8; NONCE_SIZE]);
        assert!(open(&nonce_only, "k").is_err());
    }

    #[test]
    fn test_derive_key_is_sha256() {
        let key = derive_key("abc");
        let hex: String = key.iter().map(|b| format!("{:02x}", b)).collect();
        assert_eq!(
            hex,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(derive_key("abc"), derive_key("abc"));
        assert_ne!(derive_key("abc"), derive_key("abd"));
    }

    #[test]
    fn test_shared_secret_is_redacted() {
        let secret = SharedSecret::new("hunter2");
        assert_eq!(format!("{:?}", secret), "SharedSecret(***)");
        assert_eq!(secret.to_string(), "***");
        assert_eq!(secret.expose(), "hunter2");
    }
}
