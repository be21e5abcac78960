//! MQTT transport backed by rumqttc
//!
//! Connects once up front (failure is fatal to the caller), then drives the
//! rumqttc event loop on a background task. The event loop reconnects on its
//! own after a drop; every CONNACK re-issues the registered subscriptions
//! because sessions are clean.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, TlsConfiguration};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{ConnectionEvent, MessageHandler, QualityOfService, Transport};
use crate::error::{ConnectionError, TransportError};

/// Capacity of the request queue between `AsyncClient` and the event loop
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Time allowed for the DISCONNECT packet to go out on shutdown
const DISCONNECT_GRACE: Duration = Duration::from_millis(250);

/// TLS settings for the broker connection
#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    /// PEM CA certificate; the platform trust store is used when absent
    pub ca: Option<Vec<u8>>,
}

/// Everything needed to open a broker session
#[derive(Debug, Clone)]
pub struct MqttSettings {
    /// Broker URL (`tcp://host:port`, `ssl://host:port`, ...)
    pub broker_url: String,
    /// MQTT client identifier
    pub client_id: String,
    /// Username, sent only when non-empty
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// TLS, when enabled
    pub tls: Option<TlsSettings>,
    /// Keep-alive interval
    pub keep_alive: Duration,
    /// Deadline for the initial CONNACK
    pub connect_timeout: Duration,
    /// Pause between reconnect attempts
    pub reconnect_delay: Duration,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker_url: "tcp://localhost:1883".to_string(),
            client_id: "mqtt-shell".to_string(),
            username: None,
            password: None,
            tls: None,
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

/// Host, port and scheme-implied TLS of a broker URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Parse `scheme://host[:port]`.
///
/// `tcp`/`mqtt` default to port 1883, `ssl`/`tls`/`mqtts` to 8883 and imply
/// TLS. A bare `host[:port]` is treated as `tcp`.
pub fn parse_broker_url(url: &str) -> Result<BrokerAddress, ConnectionError> {
    let invalid = || ConnectionError::InvalidBrokerUrl(url.to_string());

    let (tls, rest) = match url.split_once("://") {
        Some((scheme, rest)) => match scheme.to_ascii_lowercase().as_str() {
            "tcp" | "mqtt" => (false, rest),
            "ssl" | "tls" | "mqtts" => (true, rest),
            _ => return Err(invalid()),
        },
        None => (false, url),
    };
    let default_port = if tls { 8883 } else { 1883 };
    let rest = rest.trim_end_matches('/');

    let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
        // IPv6 literal
        let (host, after) = bracketed.split_once(']').ok_or_else(invalid)?;
        let port = match after.strip_prefix(':') {
            Some(port) => port.parse().map_err(|_| invalid())?,
            None if after.is_empty() => default_port,
            None => return Err(invalid()),
        };
        (host, port)
    } else {
        match rest.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().map_err(|_| invalid())?),
            None => (rest, default_port),
        }
    };

    if host.is_empty() || host.contains('/') {
        return Err(invalid());
    }

    Ok(BrokerAddress {
        host: host.to_string(),
        port,
        tls,
    })
}

fn to_qos(qos: QualityOfService) -> QoS {
    match qos {
        QualityOfService::AtMostOnce => QoS::AtMostOnce,
        QualityOfService::AtLeastOnce => QoS::AtLeastOnce,
        QualityOfService::ExactlyOnce => QoS::ExactlyOnce,
    }
}

struct Subscription {
    qos: QualityOfService,
    handler: MessageHandler,
}

struct Shared {
    client: AsyncClient,
    subscriptions: DashMap<String, Subscription>,
    events: broadcast::Sender<ConnectionEvent>,
    closing: AtomicBool,
}

impl Shared {
    fn dispatch(&self, topic: &str, payload: Bytes) {
        // Clone the handler out so the map guard is not held while it runs
        let handler = self
            .subscriptions
            .get(topic)
            .map(|sub| Arc::clone(&sub.handler));

        match handler {
            Some(handler) => handler(payload),
            None => tracing::debug!("Dropping message on unsubscribed topic {}", topic),
        }
    }

    fn resubscribe(&self) {
        for entry in self.subscriptions.iter() {
            if let Err(e) = self.client.try_subscribe(entry.key().clone(), to_qos(entry.qos)) {
                tracing::error!("Failed to subscribe to {}: {}", entry.key(), e);
            } else {
                tracing::info!("Subscribed to: {}", entry.key());
            }
        }
    }
}

/// Broker session over MQTT
pub struct MqttTransport {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Connect to the broker and wait for the first CONNACK
    pub async fn connect(settings: &MqttSettings) -> Result<Self, ConnectionError> {
        let address = parse_broker_url(&settings.broker_url)?;

        let mut options = MqttOptions::new(settings.client_id.clone(), address.host.clone(), address.port);
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_session(true);
        if let Some(username) = settings.username.as_deref().filter(|u| !u.is_empty()) {
            options.set_credentials(username, settings.password.clone().unwrap_or_default());
        }

        if address.tls || settings.tls.is_some() {
            let tls = match settings.tls.as_ref().and_then(|t| t.ca.clone()) {
                Some(ca) => TlsConfiguration::SimpleNative {
                    ca,
                    client_auth: None,
                },
                None => TlsConfiguration::Native,
            };
            options.set_transport(rumqttc::Transport::tls_with_config(tls));
        }

        tracing::debug!(
            "Connecting to {}:{} as {} (tls={})",
            address.host,
            address.port,
            settings.client_id,
            address.tls || settings.tls.is_some()
        );

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        tokio::time::timeout(settings.connect_timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| ConnectionError::Timeout(settings.connect_timeout))??;

        tracing::info!("Connected to MQTT broker");

        let (events, _) = broadcast::channel(16);
        let shared = Arc::new(Shared {
            client,
            subscriptions: DashMap::new(),
            events,
            closing: AtomicBool::new(false),
        });

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_event_loop(
            eventloop,
            Arc::clone(&shared),
            cancel.clone(),
            settings.reconnect_delay,
        ));

        Ok(Self {
            shared,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    /// Send DISCONNECT and stop the event loop
    pub async fn disconnect(&self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        if let Err(e) = self.shared.client.disconnect().await {
            tracing::debug!("Disconnect request not sent: {}", e);
        }

        if let Some(mut task) = self.task.lock().await.take() {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
                self.cancel.cancel();
                let _ = task.await;
            }
        }
        tracing::debug!("MQTT session closed");
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), ConnectionError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => continue,
            Err(e) => return Err(ConnectionError::ConnectFailed(e.to_string())),
        }
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    reconnect_delay: Duration,
) {
    let mut connected = true;

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                shared.dispatch(&publish.topic, publish.payload);
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("Reconnected to MQTT broker");
                connected = true;
                shared.resubscribe();
                let _ = shared.events.send(ConnectionEvent::Connected);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("DISCONNECT sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if shared.closing.load(Ordering::SeqCst) {
                    break;
                }
                if connected {
                    tracing::warn!("Connection lost: {}", e);
                    tracing::info!("Will attempt to reconnect...");
                    connected = false;
                    let _ = shared.events.send(ConnectionEvent::ConnectionLost(e.to_string()));
                } else {
                    tracing::debug!("Reconnect attempt failed: {}", e);
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(reconnect_delay) => {}
                }
            }
        }
    }

    tracing::debug!("MQTT event loop stopped");
}

#[async_trait]
impl Transport for MqttTransport {
    async fn subscribe(
        &self,
        topic: &str,
        qos: QualityOfService,
        handler: MessageHandler,
    ) -> Result<(), TransportError> {
        self.shared
            .subscriptions
            .insert(topic.to_string(), Subscription { qos, handler });

        self.shared
            .client
            .subscribe(topic, to_qos(qos))
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        tracing::info!("Subscribed to: {}", topic);
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        qos: QualityOfService,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        if self.shared.closing.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        self.shared
            .client
            .publish(topic, to_qos(qos), false, payload)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))
    }

    fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_url() {
        let addr = parse_broker_url("tcp://localhost:1883").unwrap();
        assert_eq!(
            addr,
            BrokerAddress {
                host: "localhost".to_string(),
                port: 1883,
                tls: false
            }
        );
    }

    #[test]
    fn test_parse_default_ports() {
        assert_eq!(parse_broker_url("mqtt://broker").unwrap().port, 1883);
        let ssl = parse_broker_url("ssl://broker.example.com").unwrap();
        assert_eq!(ssl.port, 8883);
        assert!(ssl.tls);
        assert!(parse_broker_url("mqtts://b:9000").unwrap().tls);
    }

    #[test]
    fn test_parse_bare_host_and_ipv6() {
        let bare = parse_broker_url("10.1.2.3:1884").unwrap();
        assert_eq!(bare.host, "10.1.2.3");
        assert_eq!(bare.port, 1884);

        let v6 = parse_broker_url("tcp://[::1]:1885").unwrap();
        assert_eq!(v6.host, "::1");
        assert_eq!(v6.port, 1885);

        let v6_default = parse_broker_url("ssl://[fe80::1]").unwrap();
        assert_eq!(v6_default.port, 8883);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for url in ["ws://broker:80", "tcp://", "tcp://host:port", "tcp://host:99999", "tcp://[::1"] {
            assert!(
                matches!(parse_broker_url(url), Err(ConnectionError::InvalidBrokerUrl(_))),
                "{} accepted",
                url
            );
        }
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let settings = MqttSettings {
            broker_url: "ws://nowhere".to_string(),
            ..MqttSettings::default()
        };
        assert!(matches!(
            MqttTransport::connect(&settings).await,
            Err(ConnectionError::InvalidBrokerUrl(_))
        ));
    }
}
