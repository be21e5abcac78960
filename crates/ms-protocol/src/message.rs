//! Command and response records
//!
//! Both records are serialized to JSON before sealing and parsed back after
//! opening. Parsing is lenient: unknown fields are ignored and missing
//! optional fields take their defaults. A command with no argv still parses;
//! rejecting it is the receiver's validation step, not a parse failure.
//!
//! # Message Flow
//!
//! 1. Client seals a `Command` and publishes it on the command topic
//! 2. Server opens it, runs `argv[0]` with the remaining arguments
//! 3. Server seals a `Response` and publishes it on the response topic
//!
//! Exactly one `Response` is published for every payload the server
//! receives, including payloads it cannot open or parse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::envelope::EnvelopeCipher;
use crate::error::ProtocolError;

/// Action tag for "execute a command"
pub const ACTION_EXEC: &str = "exec";

/// Status message for a payload that failed to open
pub const MSG_DECRYPTION_FAILED: &str = "Decryption failed";
/// Status message for a payload that opened but is not a command record
pub const MSG_INVALID_FORMAT: &str = "Invalid command format";
/// Status message for a command with an empty argv
pub const MSG_NO_COMMAND: &str = "No command specified";
/// Status message for a command that exited successfully
pub const MSG_EXEC_SUCCESS: &str = "Command executed successfully";
/// Status message for a command that failed, exited non-zero or timed out
pub const MSG_EXEC_FAILED: &str = "Command execution failed";

fn default_action() -> String {
    ACTION_EXEC.to_string()
}

/// Treat an explicit `null` the same as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A request to run one program on the remote host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Action tag, always `"exec"` when produced by this crate
    #[serde(default = "default_action")]
    pub action: String,
    /// Program name followed by its arguments
    #[serde(default, deserialize_with = "null_as_default")]
    pub command: Vec<String>,
}

impl Command {
    /// Build an exec command from an argv
    pub fn exec(argv: Vec<String>) -> Self {
        Self {
            action: default_action(),
            command: argv,
        }
    }

    /// The argv, program name first
    pub fn argv(&self) -> &[String] {
        &self.command
    }

    /// Program name, if the argv is non-empty
    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }

    /// The argv joined with single spaces, as reported back in responses
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize and seal into an envelope
    pub fn seal(&self, cipher: &EnvelopeCipher) -> Result<Vec<u8>, ProtocolError> {
        Ok(cipher.seal(&self.to_bytes()?)?)
    }
}

/// Detail attached to a response once execution has been attempted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseData {
    /// The argv joined as issued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Combined stdout/stderr text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Failure detail, present only on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of handling one inbound payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Whether the command ran and exited successfully
    #[serde(default)]
    pub success: bool,
    /// Short human-readable status
    #[serde(default)]
    pub message: String,
    /// Execution detail; absent when the payload never reached execution
    #[serde(default)]
    pub data: Option<ResponseData>,
    /// When the response was produced
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Response {
    /// Create a response stamped with the current time
    pub fn new(success: bool, message: impl Into<String>, data: Option<ResponseData>) -> Self {
        Self {
            success,
            message: message.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// A failure response with no execution detail
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(false, message, None)
    }

    /// Response for a payload that could not be opened
    pub fn decryption_failed() -> Self {
        Self::failure(MSG_DECRYPTION_FAILED)
    }

    /// Response for a payload that is not a valid command record
    pub fn invalid_format() -> Self {
        Self::failure(MSG_INVALID_FORMAT)
    }

    /// Response for a command with an empty argv
    pub fn no_command() -> Self {
        Self::failure(MSG_NO_COMMAND)
    }

    /// Captured output, if any
    pub fn output(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.output.as_deref())
    }

    /// Failure detail, if any
    pub fn error(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.error.as_deref())
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize and seal into an envelope
    pub fn seal(&self, cipher: &EnvelopeCipher) -> Result<Vec<u8>, ProtocolError> {
        Ok(cipher.seal(&self.to_bytes()?)?)
    }

    /// Open an envelope and parse the response inside
    pub fn open(envelope: &[u8], cipher: &EnvelopeCipher) -> Result<Self, ProtocolError> {
        Self::from_bytes(&cipher.open(envelope)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_shape() {
        let cmd = Command::exec(vec!["ls".into(), "-la".into()]);
        let json = String::from_utf8(cmd.to_bytes().unwrap()).unwrap();
        assert_eq!(json, r#"{"action":"exec","command":["ls","-la"]}"#);
        assert_eq!(cmd.command_line(), "ls -la");
        assert_eq!(cmd.program(), Some("ls"));
    }

    #[test]
    fn test_command_missing_argv_is_empty() {
        for raw in [r#"{"action":"exec"}"#, r#"{"action":"exec","command":null}"#, "{}"] {
            let cmd = Command::from_bytes(raw.as_bytes()).unwrap();
            assert!(cmd.argv().is_empty(), "{}", raw);
            assert_eq!(cmd.program(), None);
        }
    }

    #[test]
    fn test_command_ignores_unknown_fields() {
        let cmd =
            Command::from_bytes(br#"{"command":["id"],"nonce":42,"extra":{"a":1}}"#).unwrap();
        assert_eq!(cmd.action, ACTION_EXEC);
        assert_eq!(cmd.argv(), ["id".to_string()]);
    }

    #[test]
    fn test_command_malformed_is_error() {
        assert!(Command::from_bytes(b"not json").is_err());
        assert!(Command::from_bytes(br#"{"command":"ls"}"#).is_err());
        assert!(Command::from_bytes(br#"["ls"]"#).is_err());
    }

    #[test]
    fn test_response_without_data_serializes_null() {
        let resp = Response::no_command();
        let value: serde_json::Value = serde_json::from_slice(&resp.to_bytes().unwrap()).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["message"], MSG_NO_COMMAND);
        assert!(value["data"].is_null());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_response_data_omits_absent_keys() {
        let resp = Response::new(
            true,
            MSG_EXEC_SUCCESS,
            Some(ResponseData {
                command: Some("echo hi".into()),
                output: Some("hi\n".into()),
                error: None,
            }),
        );
        let value: serde_json::Value = serde_json::from_slice(&resp.to_bytes().unwrap()).unwrap();
        assert_eq!(value["data"]["command"], "echo hi");
        assert_eq!(value["data"]["output"], "hi\n");
        assert!(value["data"].get("error").is_none());
    }

    #[test]
    fn test_response_parses_foreign_timestamp_offset() {
        let raw = br#"{
            "success": false,
            "message": "Command execution failed",
            "data": {"command": "false", "output": "", "error": "exit status 1", "pid": 7},
            "timestamp": "2024-05-01T12:30:00.123456789+02:00"
        }"#;
        let resp = Response::from_bytes(raw).unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error(), Some("exit status 1"));
        assert_eq!(resp.output(), Some(""));
        assert_eq!(resp.timestamp.to_rfc3339(), "2024-05-01T10:30:00.123456789+00:00");
    }

    #[test]
    fn test_response_missing_fields_default() {
        let resp = Response::from_bytes(br#"{"success":true}"#).unwrap();
        assert!(resp.success);
        assert!(resp.message.is_empty());
        assert!(resp.data.is_none());
    }

    #[test]
    fn test_sealed_response_opens() {
        let cipher = EnvelopeCipher::from_passphrase("k");
        let resp = Response::decryption_failed();
        let sealed = resp.seal(&cipher).unwrap();
        let opened = Response::open(&sealed, &cipher).unwrap();
        assert_eq!(opened, resp);

        let other = EnvelopeCipher::from_passphrase("other");
        assert!(matches!(
            Response::open(&sealed, &other),
            Err(ProtocolError::Envelope(_))
        ));
    }
}
