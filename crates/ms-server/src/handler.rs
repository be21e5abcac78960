//! Per-message state machine
//!
//! ```text
//! Received -> Decrypting -> Parsing -> Validating -> Executing -> Responded
//! ```
//!
//! Every stage that fails short-circuits to a failure response, so each
//! payload yields exactly one response. Failure responses for payloads that
//! never reached execution carry no data and cannot be tied back to the
//! offending input.

use std::sync::Arc;

use ms_protocol::{Command, EnvelopeCipher, Response};

use crate::executor::Executor;

/// Turns one inbound envelope into one response
#[derive(Debug, Clone)]
pub struct CommandHandler {
    cipher: Arc<EnvelopeCipher>,
    executor: Executor,
}

impl CommandHandler {
    /// Create a handler
    pub fn new(cipher: Arc<EnvelopeCipher>, executor: Executor) -> Self {
        Self { cipher, executor }
    }

    /// Decrypt, parse, validate and execute `payload`
    pub async fn handle(&self, payload: &[u8]) -> Response {
        let plaintext = match self.cipher.open(payload) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::warn!("Decryption failed: {}", e);
                return Response::decryption_failed();
            }
        };

        let command = match Command::from_bytes(&plaintext) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!("Invalid command format: {}", e);
                return Response::invalid_format();
            }
        };

        if command.argv().is_empty() {
            tracing::warn!("Empty command received");
            return Response::no_command();
        }

        tracing::info!("Executing: {}", command.command_line());
        let outcome = self.executor.run(command.argv()).await;
        match &outcome.result {
            Ok(()) => tracing::info!("Command executed successfully in {:?}", outcome.elapsed),
            Err(e) => tracing::warn!("Command failed: {}", e),
        }

        outcome.into_response()
    }
}
