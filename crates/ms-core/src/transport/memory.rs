//! In-process transport

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::{ConnectionEvent, MessageHandler, QualityOfService, Transport};
use crate::error::TransportError;

/// Broker living inside the process.
///
/// Topics match exactly (no wildcards). Handlers run synchronously inside
/// `publish`. Clones share the same broker, so a server and a client can be
/// wired together by cloning one instance.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

struct Inner {
    subscriptions: DashMap<String, Vec<MessageHandler>>,
    offline: AtomicBool,
    events: broadcast::Sender<ConnectionEvent>,
}

impl MemoryTransport {
    /// Create an empty broker
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(Inner {
                subscriptions: DashMap::new(),
                offline: AtomicBool::new(false),
                events,
            }),
        }
    }

    /// Make publishes fail (or succeed again) and announce the change
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
        let event = if offline {
            ConnectionEvent::ConnectionLost("broker unavailable".to_string())
        } else {
            ConnectionEvent::Connected
        };
        let _ = self.inner.events.send(event);
    }

    /// Number of handlers registered on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .subscriptions
            .get(topic)
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn subscribe(
        &self,
        topic: &str,
        _qos: QualityOfService,
        handler: MessageHandler,
    ) -> Result<(), TransportError> {
        self.inner
            .subscriptions
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        tracing::debug!("Subscribed to: {}", topic);
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        _qos: QualityOfService,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Publish("broker unavailable".to_string()));
        }

        // Clone the handler list so no map guard is held while handlers run
        let handlers = self
            .inner
            .subscriptions
            .get(topic)
            .map(|handlers| handlers.clone())
            .unwrap_or_default();

        let payload = Bytes::from(payload);
        for handler in handlers {
            handler(payload.clone());
        }
        Ok(())
    }

    fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }
}
