//! ms-core: Shared plumbing for mqtt-shell
//!
//! This crate provides configuration loading, the error taxonomy, and the
//! broker transport used by both the server daemon and the interactive
//! client.

pub mod config;
pub mod error;
pub mod transport;

pub use config::{Role, ShellConfig};
pub use error::{ConfigError, ConnectionError, ShellError, TransportError};
pub use transport::{
    watch_connection, ConnectionEvent, MemoryTransport, MessageHandler, MqttSettings,
    MqttTransport, QualityOfService, Transport, DELIVERY_QOS,
};
