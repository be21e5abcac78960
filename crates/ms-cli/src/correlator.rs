//! Request/response correlation for the interactive client
//!
//! Responses arrive on a broker callback while the shell waits on its own
//! task. A bounded channel bridges the two: the callback opens each envelope
//! and `try_send`s the decoded response, the waiter receives with a deadline.
//!
//! There is no correlation id. The client keeps at most one command in
//! flight and takes whichever response arrives first, so a reply that shows
//! up after its command timed out is handed to the next command instead.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use ms_core::{MessageHandler, Transport, TransportError, DELIVERY_QOS};
use ms_protocol::{Command, EnvelopeCipher, ProtocolError, Response, Topics};

/// Responses buffered between the callback and the waiter
pub const RESPONSE_QUEUE_CAPACITY: usize = 10;

/// Errors from sending a command or waiting for its response
#[derive(Debug, Error)]
pub enum ClientError {
    /// The command could not be serialized or sealed
    #[error("Failed to encrypt command: {0}")]
    Encryption(#[source] ProtocolError),

    /// The broker refused the publish
    #[error("Failed to send command: {0}")]
    Publish(#[source] TransportError),

    /// No response arrived before the deadline
    #[error("No response within {0:?}")]
    Timeout(Duration),

    /// The delivery side of the response queue is gone
    #[error("Response channel closed")]
    Closed,
}

/// Sends commands and waits for responses on one transport
pub struct Correlator {
    transport: Arc<dyn Transport>,
    topics: Topics,
    cipher: Arc<EnvelopeCipher>,
    responses: mpsc::Receiver<Response>,
}

impl Correlator {
    /// Subscribe to the response topic and start queueing responses
    pub async fn attach(
        transport: Arc<dyn Transport>,
        topics: Topics,
        cipher: Arc<EnvelopeCipher>,
    ) -> Result<Self, TransportError> {
        let (tx, responses) = mpsc::channel(RESPONSE_QUEUE_CAPACITY);

        let callback_cipher = Arc::clone(&cipher);
        let on_response: MessageHandler = Arc::new(move |payload: Bytes| {
            let response = match Response::open(&payload, &callback_cipher) {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("Failed to open response: {}", e);
                    return;
                }
            };

            if let Err(e) = tx.try_send(response) {
                tracing::warn!("Dropping response: {}", e);
            }
        });

        transport
            .subscribe(topics.response(), DELIVERY_QOS, on_response)
            .await?;
        tracing::debug!("Listening for responses on {}", topics.response());

        Ok(Self {
            transport,
            topics,
            cipher,
            responses,
        })
    }

    /// Topics in use
    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Seal `argv` as an exec command and publish it
    pub async fn send(&self, argv: Vec<String>) -> Result<(), ClientError> {
        let sealed = Command::exec(argv)
            .seal(&self.cipher)
            .map_err(ClientError::Encryption)?;

        self.transport
            .publish(self.topics.command(), DELIVERY_QOS, sealed)
            .await
            .map_err(ClientError::Publish)
    }

    /// Wait for the next response, up to `timeout`
    pub async fn await_reply(&mut self, timeout: Duration) -> Result<Response, ClientError> {
        match tokio::time::timeout(timeout, self.responses.recv()).await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(ClientError::Closed),
            Err(_) => Err(ClientError::Timeout(timeout)),
        }
    }
}
