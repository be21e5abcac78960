//! ms-protocol: Encrypted wire protocol for mqtt-shell
//!
//! This crate defines the envelope used to protect every payload on the
//! broker, the command and response records carried inside it, and the
//! topic names both sides publish and subscribe on.

pub mod envelope;
pub mod error;
pub mod message;
pub mod topic;

pub use envelope::{derive_key, open, seal, EnvelopeCipher, SharedSecret, KEY_SIZE, NONCE_SIZE};
pub use error::{EnvelopeError, ProtocolError};
pub use message::{Command, Response, ResponseData, ACTION_EXEC};
pub use topic::{Topics, TOPIC_SUFFIX};
