//! Server wiring between the transport and the command handler

use std::sync::{Arc, Weak};

use bytes::Bytes;

use ms_core::{MessageHandler, Transport, TransportError, DELIVERY_QOS};
use ms_protocol::{EnvelopeCipher, Response, Topics};

use crate::executor::Executor;
use crate::handler::CommandHandler;

/// Listens on the command topic and answers on the response topic.
///
/// Each inbound message is handled on its own task. There is no queue and
/// no admission control: concurrent commands run concurrently.
pub struct ShellServer {
    transport: Arc<dyn Transport>,
    topics: Topics,
    cipher: Arc<EnvelopeCipher>,
    handler: CommandHandler,
}

impl ShellServer {
    /// Create a server over `transport`
    pub fn new(
        transport: Arc<dyn Transport>,
        topics: Topics,
        cipher: Arc<EnvelopeCipher>,
        executor: Executor,
    ) -> Arc<Self> {
        let handler = CommandHandler::new(Arc::clone(&cipher), executor);
        Arc::new(Self {
            transport,
            topics,
            cipher,
            handler,
        })
    }

    /// Topics this server uses
    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Subscribe to the command topic and start handling messages
    pub async fn start(self: &Arc<Self>) -> Result<(), TransportError> {
        // The transport owns the callback; a weak handle avoids a cycle back to us.
        let server: Weak<Self> = Arc::downgrade(self);
        let on_message: MessageHandler = Arc::new(move |payload: Bytes| {
            let Some(server) = server.upgrade() else {
                return;
            };
            tokio::spawn(async move {
                server.process(&payload).await;
            });
        });

        self.transport
            .subscribe(self.topics.command(), DELIVERY_QOS, on_message)
            .await
    }

    /// Handle one payload and publish its response.
    ///
    /// Returns the response that was (or failed to be) published.
    pub async fn process(&self, payload: &[u8]) -> Response {
        tracing::info!("Received encrypted command ({} bytes)", payload.len());
        let response = self.handler.handle(payload).await;
        self.respond(&response).await;
        response
    }

    /// Seal and publish a response; failures end here
    async fn respond(&self, response: &Response) {
        let sealed = match response.seal(&self.cipher) {
            Ok(sealed) => sealed,
            Err(e) => {
                tracing::error!("Failed to encrypt response: {}", e);
                return;
            }
        };

        match self
            .transport
            .publish(self.topics.response(), DELIVERY_QOS, sealed)
            .await
        {
            Ok(()) => tracing::info!("Response sent (success={})", response.success),
            Err(e) => tracing::error!("Failed to publish response: {}", e),
        }
    }
}
