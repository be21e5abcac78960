//! Shell configuration shared by the server daemon and the client

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use x509_parser::prelude::{FromDer, X509Certificate};

use ms_protocol::{SharedSecret, Topics};

use super::serde_utils::duration_secs;
use crate::error::ConfigError;
use crate::transport::{MqttSettings, TlsSettings};

/// Environment variable names
pub mod env {
    pub const BROKER_URL: &str = "MQTT_BROKER_URL";
    pub const CLIENT_ID: &str = "MQTT_CLIENT_ID";
    pub const USERNAME: &str = "MQTT_USERNAME";
    pub const PASSWORD: &str = "MQTT_PASSWORD";
    pub const TOPIC_PREFIX: &str = "MQTT_TOPIC_PREFIX";
    pub const USE_TLS: &str = "MQTT_USE_TLS";
    pub const CA_FILE: &str = "MQTT_CA_FILE";
    pub const EXEC_KEY: &str = "EXEC_KEY";
    pub const EXEC_TIMEOUT: &str = "EXEC_TIMEOUT_SECS";
    pub const RESPONSE_TIMEOUT: &str = "RESPONSE_TIMEOUT_SECS";
}

/// Which side of the protocol a process plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Executes commands
    Server,
    /// Issues commands
    Client,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Client => "client",
        }
    }
}

/// Configuration for one mqtt-shell process
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Broker URL, e.g. `tcp://localhost:1883` or `ssl://broker:8883`
    pub broker_url: String,

    /// MQTT client identifier (defaults to `mqtt-shell-<role>-<hostname>`)
    pub client_id: Option<String>,

    /// Broker username
    pub username: Option<String>,

    /// Broker password
    pub password: Option<String>,

    /// Prefix for the command and response topics
    pub topic_prefix: String,

    /// Connect over TLS
    pub use_tls: bool,

    /// CA certificate (PEM) used to verify the broker
    pub ca_file: Option<PathBuf>,

    /// Shared secret both sides derive the envelope key from
    pub exec_key: Option<SharedSecret>,

    /// Wall-clock bound on a single remote command
    #[serde(with = "duration_secs")]
    pub exec_timeout: Duration,

    /// How long the client waits for a response
    #[serde(with = "duration_secs")]
    pub response_timeout: Duration,

    /// Broker connect timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Broker keep-alive interval
    #[serde(with = "duration_secs")]
    pub keep_alive: Duration,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            broker_url: "tcp://localhost:1883".to_string(),
            client_id: None,
            username: None,
            password: None,
            topic_prefix: "mqtt-shell".to_string(),
            use_tls: false,
            ca_file: None,
            exec_key: None,
            exec_timeout: Duration::from_secs(30),
            response_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(30),
            keep_alive: Duration::from_secs(60),
        }
    }
}

impl ShellConfig {
    /// Load configuration: defaults, then `path` (if it exists or was given
    /// explicitly), then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => super::load_config(path)?,
            None => {
                let default_path = super::default_config_path();
                if default_path.exists() {
                    super::load_config(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from an environment lookup.
    ///
    /// Values are trimmed and empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get(env::BROKER_URL) {
            self.broker_url = v;
        }
        if let Some(v) = get(env::CLIENT_ID) {
            self.client_id = Some(v);
        }
        if let Some(v) = get(env::USERNAME) {
            self.username = Some(v);
        }
        if let Some(v) = get(env::PASSWORD) {
            self.password = Some(v);
        }
        if let Some(v) = get(env::TOPIC_PREFIX) {
            self.topic_prefix = v;
        }
        if let Some(v) = get(env::USE_TLS) {
            self.use_tls = v == "true";
        }
        if let Some(v) = get(env::CA_FILE) {
            self.ca_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get(env::EXEC_KEY) {
            self.exec_key = Some(SharedSecret::new(v));
        }
        if let Some(v) = get(env::EXEC_TIMEOUT) {
            self.exec_timeout = parse_secs(env::EXEC_TIMEOUT, &v)?;
        }
        if let Some(v) = get(env::RESPONSE_TIMEOUT) {
            self.response_timeout = parse_secs(env::RESPONSE_TIMEOUT, &v)?;
        }

        Ok(())
    }

    /// Check everything that must hold before connecting
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared_secret()?;
        self.tls_ca()?;
        if self.topic_prefix.contains(['+', '#']) {
            return Err(ConfigError::Invalid(format!(
                "Topic prefix must not contain wildcards: {}",
                self.topic_prefix
            )));
        }
        if self.exec_timeout.is_zero() || self.response_timeout.is_zero() {
            return Err(ConfigError::Invalid("Timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    /// The shared secret; its absence is fatal
    pub fn shared_secret(&self) -> Result<&SharedSecret, ConfigError> {
        self.exec_key
            .as_ref()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| ConfigError::MissingField(env::EXEC_KEY.to_string()))
    }

    /// Command and response topics for the configured prefix
    pub fn topics(&self) -> Topics {
        Topics::new(&self.topic_prefix)
    }

    /// Client identifier, generated from the hostname when not configured
    pub fn client_id(&self, role: Role) -> String {
        self.client_id.clone().unwrap_or_else(|| {
            let hostname = gethostname::gethostname().to_string_lossy().into_owned();
            let hostname = if hostname.is_empty() {
                role.as_str().to_string()
            } else {
                hostname
            };
            format!("mqtt-shell-{}-{}", role.as_str(), hostname)
        })
    }

    /// CA certificate bytes when TLS is enabled and a CA file is configured.
    ///
    /// The file must hold at least one PEM `CERTIFICATE` block, and every
    /// such block must decode as an X.509 certificate.
    pub fn tls_ca(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        if !self.use_tls {
            return Ok(None);
        }
        let Some(path) = &self.ca_file else {
            return Ok(None);
        };

        let ca = std::fs::read(path).map_err(|e| {
            ConfigError::InvalidTls(format!("failed to read CA file {:?}: {}", path, e))
        })?;
        check_ca_certificates(&ca)
            .map_err(|reason| ConfigError::InvalidTls(format!("CA file {:?}: {}", path, reason)))?;
        Ok(Some(ca))
    }

    /// Broker session settings for the transport
    pub fn mqtt_settings(&self, role: Role) -> Result<MqttSettings, ConfigError> {
        let tls = if self.use_tls {
            Some(TlsSettings { ca: self.tls_ca()? })
        } else {
            None
        };

        Ok(MqttSettings {
            broker_url: self.broker_url.clone(),
            client_id: self.client_id(role),
            username: self.username.clone(),
            password: self.password.clone(),
            tls,
            keep_alive: self.keep_alive,
            connect_timeout: self.connect_timeout,
            ..MqttSettings::default()
        })
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::Invalid(format!("{} must be a whole number of seconds", key)))
}

fn check_ca_certificates(ca: &[u8]) -> Result<(), String> {
    let blocks = pem::parse_many(ca).map_err(|e| format!("invalid PEM: {}", e))?;

    let mut certificates = 0;
    for block in blocks.iter().filter(|block| block.tag() == "CERTIFICATE") {
        X509Certificate::from_der(block.contents())
            .map_err(|e| format!("invalid certificate: {}", e))?;
        certificates += 1;
    }

    if certificates == 0 {
        return Err("no certificate found".to_string());
    }
    Ok(())
}
