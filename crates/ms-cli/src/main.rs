//! mqtt-shell client
//!
//! Connects to the broker and runs an interactive `remote>` prompt whose
//! commands execute on the host running `ms-server`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ms_core::config::{self, Role, ShellConfig};
use ms_core::{watch_connection, ConnectionEvent, MqttTransport, Transport};
use ms_protocol::EnvelopeCipher;
use mqtt_shell::output::{print_error, print_info, print_success, print_warning};
use mqtt_shell::shell::{banner, directives_summary};
use mqtt_shell::{Correlator, InteractiveShell};

#[derive(Parser)]
#[command(name = "mqtt-shell")]
#[command(author, version, about = "Interactive shell for running commands on a remote host over MQTT")]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to a .env file (defaults to ./.env if present)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,

    /// Seconds to wait for each response (overrides RESPONSE_TIMEOUT_SECS)
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    print!("{}", banner());

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            print_error(&format!("{:#}", e));
            return Err(e);
        }
    };
    let response_timeout = cli
        .timeout
        .map(Duration::from_secs)
        .unwrap_or(config.response_timeout);

    let cipher = Arc::new(EnvelopeCipher::new(config.shared_secret()?));
    let settings = config.mqtt_settings(Role::Client)?;

    tracing::info!("Connecting to {} as {}", settings.broker_url, settings.client_id);
    let transport = Arc::new(
        MqttTransport::connect(&settings)
            .await
            .context("Failed to connect")?,
    );

    tokio::spawn(watch_connection(
        transport.connection_events(),
        |event| match event {
            ConnectionEvent::Connected => print_success("Reconnected to MQTT broker"),
            ConnectionEvent::ConnectionLost(reason) => {
                print_warning(&format!("Connection lost: {}", reason));
                print_info("Will attempt to reconnect...");
            }
        },
    ));

    let correlator = Correlator::attach(transport.clone(), config.topics(), cipher)
        .await
        .context("Failed to subscribe to response topic")?;

    println!();
    print_success("Connected to MQTT broker");
    print_info("Listening for responses...");
    println!();
    print!("{}", directives_summary());

    let mut shell = InteractiveShell::new(correlator, response_timeout);
    let result = shell
        .run(BufReader::new(tokio::io::stdin()), &mut std::io::stdout())
        .await;

    transport.disconnect().await;
    result.context("Failed to read input")
}

fn load_config(cli: &Cli) -> Result<ShellConfig> {
    if let Some(path) = config::load_dotenv(cli.env_file.as_deref())? {
        tracing::debug!("Loaded environment from {:?}", path);
    }

    let config = ShellConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    config
        .validate()
        .context("Invalid configuration (EXEC_KEY must be set in environment or .env file)")?;
    Ok(config)
}
