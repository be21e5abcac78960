//! Protocol error types

use thiserror::Error;

/// Errors raised while sealing or opening an envelope
#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// Key setup, nonce generation or encryption failed
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Base64 decoding, length check or tag verification failed
    #[error("Decryption failed: {0}")]
    Decryption(String),
}

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Envelope error
    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
