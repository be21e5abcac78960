//! Core error types for mqtt-shell

use ms_protocol::ProtocolError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the mqtt-shell ecosystem
#[derive(Error, Debug)]
pub enum ShellError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors establishing the broker session.
///
/// Fatal on the initial connect; afterwards the transport reconnects on its own.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Broker URL could not be parsed
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),

    /// Broker refused or dropped the connection attempt
    #[error("Failed to connect: {0}")]
    ConnectFailed(String),

    /// No CONNACK within the connect timeout
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),
}

/// Per-message transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Publish could not be handed to the broker session
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Subscribe request failed
    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    /// Transport has been shut down
    #[error("Transport closed")]
    Closed,
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TLS material missing or unusable
    #[error("Invalid TLS configuration: {0}")]
    InvalidTls(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}
