//! Broker transport
//!
//! The core only needs two things from the broker: deliver payloads that
//! arrive on a topic, and send a payload to a topic. [`Transport`] captures
//! exactly that. [`MqttTransport`] speaks MQTT to a real broker;
//! [`MemoryTransport`] routes in-process and backs the tests.

mod memory;
mod mqtt;

pub use memory::MemoryTransport;
pub use mqtt::{parse_broker_url, BrokerAddress, MqttSettings, MqttTransport, TlsSettings};

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::TransportError;

/// Callback invoked with the raw payload of every message on a subscribed topic.
///
/// Runs on the transport's delivery task, so it must not block.
pub type MessageHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Delivery guarantee requested from the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityOfService {
    /// Fire and forget
    AtMostOnce,
    /// Redelivered until acknowledged; duplicates possible
    #[default]
    AtLeastOnce,
    /// Four-way handshake
    ExactlyOnce,
}

/// Quality level used for every command and response
pub const DELIVERY_QOS: QualityOfService = QualityOfService::AtLeastOnce;

/// Broker session state changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Session (re)established and subscriptions restored
    Connected,
    /// Session dropped; the transport keeps reconnecting
    ConnectionLost(String),
}

/// Publish/subscribe transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Register `handler` for every message arriving on `topic`
    async fn subscribe(
        &self,
        topic: &str,
        qos: QualityOfService,
        handler: MessageHandler,
    ) -> Result<(), TransportError>;

    /// Send `payload` to `topic`
    async fn publish(
        &self,
        topic: &str,
        qos: QualityOfService,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Stream of connection state changes
    fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent>;
}

/// Feed every connection event to `on_event` until the transport goes away.
///
/// A slow listener that falls behind skips the events it missed and keeps
/// listening.
pub async fn watch_connection<F>(
    mut events: broadcast::Receiver<ConnectionEvent>,
    mut on_event: F,
) where
    F: FnMut(ConnectionEvent),
{
    loop {
        match events.recv().await {
            Ok(event) => on_event(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::debug!("Missed {} connection events", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watcher_survives_lag() {
        let (tx, rx) = broadcast::channel(4);
        for i in 0..10 {
            tx.send(ConnectionEvent::ConnectionLost(format!("drop {}", i)))
                .unwrap();
        }
        tx.send(ConnectionEvent::Connected).unwrap();
        drop(tx);

        let mut seen = Vec::new();
        watch_connection(rx, |event| seen.push(event)).await;

        assert_eq!(seen.len(), 4);
        assert_eq!(seen.last(), Some(&ConnectionEvent::Connected));
        assert_eq!(seen[0], ConnectionEvent::ConnectionLost("drop 7".to_string()));
    }

    #[tokio::test]
    async fn test_watcher_keeps_listening_after_lag() {
        let (tx, rx) = broadcast::channel(2);
        for _ in 0..5 {
            tx.send(ConnectionEvent::Connected).unwrap();
        }

        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
        let watcher = tokio::spawn(watch_connection(rx, move |event| {
            let _ = seen_tx.send(event);
        }));

        // Drain what survived the overflow, then send a fresh event
        assert_eq!(seen_rx.recv().await, Some(ConnectionEvent::Connected));
        assert_eq!(seen_rx.recv().await, Some(ConnectionEvent::Connected));
        tx.send(ConnectionEvent::ConnectionLost("later".to_string()))
            .unwrap();
        assert_eq!(
            seen_rx.recv().await,
            Some(ConnectionEvent::ConnectionLost("later".to_string()))
        );

        drop(tx);
        watcher.await.unwrap();
    }
}
