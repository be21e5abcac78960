//! End-to-end tests
//!
//! Wires the client correlator and shell to a real `ShellServer` over the
//! in-memory broker.

use std::sync::Arc;
use std::time::Duration;

use ms_core::MemoryTransport;
use ms_protocol::{EnvelopeCipher, Topics};
use ms_server::{Executor, ShellServer};
use mqtt_shell::{ClientError, Correlator, InteractiveShell};

const PREFIX: &str = "e2e/shell";

async fn client(broker: &MemoryTransport, key: &str) -> Correlator {
    Correlator::attach(
        Arc::new(broker.clone()),
        Topics::new(PREFIX),
        Arc::new(EnvelopeCipher::from_passphrase(key)),
    )
    .await
    .expect("Failed to attach correlator")
}

async fn server(broker: &MemoryTransport, key: &str) -> Arc<ShellServer> {
    let server = ShellServer::new(
        Arc::new(broker.clone()),
        Topics::new(PREFIX),
        Arc::new(EnvelopeCipher::from_passphrase(key)),
        Executor::new(Duration::from_secs(5)),
    );
    server.start().await.expect("Failed to start server");
    server
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_roundtrip() {
    let broker = MemoryTransport::new();
    let _server = server(&broker, "shared").await;
    let mut correlator = client(&broker, "shared").await;

    correlator
        .send(vec!["echo".into(), "hello".into()])
        .await
        .unwrap();
    let response = correlator.await_reply(Duration::from_secs(10)).await.unwrap();

    assert!(response.success);
    assert_eq!(response.output(), Some("hello\n"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_failed_command_roundtrip() {
    let broker = MemoryTransport::new();
    let _server = server(&broker, "shared").await;
    let mut correlator = client(&broker, "shared").await;

    correlator.send(vec!["false".into()]).await.unwrap();
    let response = correlator.await_reply(Duration::from_secs(10)).await.unwrap();

    assert!(!response.success);
    assert!(!response.error().unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_key_mismatch_times_out() {
    let broker = MemoryTransport::new();
    let _server = server(&broker, "server-key").await;
    let mut correlator = client(&broker, "client-key").await;

    // The server answers "Decryption failed" under its own key, which the
    // client cannot open, so nothing reaches the waiter.
    correlator.send(vec!["id".into()]).await.unwrap();
    let result = correlator.await_reply(Duration::from_millis(500)).await;
    assert!(matches!(result, Err(ClientError::Timeout(_))));
}

#[tokio::test]
async fn test_no_server_times_out() {
    let broker = MemoryTransport::new();
    let mut correlator = client(&broker, "shared").await;

    correlator.send(vec!["uptime".into()]).await.unwrap();
    let result = correlator.await_reply(Duration::from_millis(200)).await;
    assert!(matches!(result, Err(ClientError::Timeout(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn test_interactive_session() {
    let broker = MemoryTransport::new();
    let _server = server(&broker, "shared").await;
    let correlator = client(&broker, "shared").await;

    let input: &[u8] = b"help\n\necho 'hello world'\nexit\necho never\n";
    let mut out = Vec::new();
    let mut shell = InteractiveShell::new(correlator, Duration::from_secs(10));
    shell.run(input, &mut out).await.unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("remote> "));
    assert!(text.contains("docker ps"));
    assert!(text.contains("Waiting for response..."));
    assert!(text.contains("Success: Command executed successfully"));
    assert!(text.contains("Command: echo hello world"));
    assert!(text.contains("---\nhello world\n---\n"));
    assert!(text.trim_end().ends_with("Goodbye!"));
    assert!(!text.contains("never"));
}

#[tokio::test]
async fn test_interactive_timeout_message() {
    let broker = MemoryTransport::new();
    let correlator = client(&broker, "shared").await;

    let input: &[u8] = b"uptime\n";
    let mut out = Vec::new();
    let mut shell = InteractiveShell::new(correlator, Duration::from_millis(100));
    shell.run(input, &mut out).await.unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Response timeout - server may be offline"));
}

#[tokio::test]
async fn test_interactive_publish_error_keeps_going() {
    let broker = MemoryTransport::new();
    let correlator = client(&broker, "shared").await;
    broker.set_offline(true);

    let input: &[u8] = b"uptime\nquit\n";
    let mut out = Vec::new();
    let mut shell = InteractiveShell::new(correlator, Duration::from_millis(100));
    shell.run(input, &mut out).await.unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Error sending command:"));
    assert!(!text.contains("Waiting for response..."));
    assert!(text.contains("Goodbye!"));
}
