//! mqtt-shell server daemon
//!
//! Connects to the broker, listens for sealed commands on the command topic
//! and runs them on this host. Only configuration and the initial broker
//! connection can stop the process; a bad message never does.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ms_core::config::{self, Role, ShellConfig};
use ms_core::{watch_connection, ConnectionEvent, MqttTransport, Transport};
use ms_protocol::EnvelopeCipher;
use ms_server::{Executor, ShellServer};

#[derive(Parser)]
#[command(name = "ms-server")]
#[command(about = "mqtt-shell server - executes encrypted commands received over MQTT")]
#[command(version)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to a .env file (defaults to ./.env if present)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.foreground {
        "debug"
    } else {
        &args.log_level
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Secure MQTT Shell Server v{}", env!("CARGO_PKG_VERSION"));

    if let Some(path) = config::load_dotenv(args.env_file.as_deref())? {
        tracing::debug!("Loaded environment from {:?}", path);
    }
    let config = ShellConfig::load(args.config.as_deref()).context("Failed to load config")?;
    config.validate().context("Invalid configuration")?;

    let cipher = Arc::new(EnvelopeCipher::new(config.shared_secret()?));
    let topics = config.topics();
    let settings = config.mqtt_settings(Role::Server)?;

    tracing::info!("Connecting to {} as {}", settings.broker_url, settings.client_id);
    let transport = Arc::new(
        MqttTransport::connect(&settings)
            .await
            .context("Failed to connect to MQTT")?,
    );

    tokio::spawn(watch_connection(
        transport.connection_events(),
        |event| match event {
            ConnectionEvent::Connected => tracing::info!("Connection restored"),
            ConnectionEvent::ConnectionLost(reason) => {
                tracing::warn!("Connection lost: {}", reason)
            }
        },
    ));

    let server = ShellServer::new(
        transport.clone(),
        topics,
        cipher,
        Executor::new(config.exec_timeout),
    );
    server
        .start()
        .await
        .context("Failed to subscribe to command topic")?;

    tracing::info!("Server started successfully");
    tracing::info!("Listening on: {}", server.topics().command());
    tracing::info!("Waiting for commands...");

    shutdown_signal().await;

    tracing::info!("Shutting down...");
    transport.disconnect().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
