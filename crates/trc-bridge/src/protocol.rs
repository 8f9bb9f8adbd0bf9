//! Wire envelopes for the runner channel.
//!
//! JSON messages with a `type` discriminator. Unknown discriminants are
//! rejected at decode time, not silently ignored.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trc_policy::CommandClass;
use uuid::Uuid;

/// A completed runner request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerResult {
    /// The request this result answers.
    pub request_id: Uuid,
    /// Session the runner believes it belongs to; stale ids are dropped.
    pub runner_session_id: Uuid,
    /// Process exit code; blocked and timed-out requests report 1.
    pub exit_code: i32,
    /// Captured stdout (redacted by the bridge before use).
    pub stdout: String,
    /// Captured stderr (redacted by the bridge before use).
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Messages the runner sends to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Opens (or replaces) the session for a project.
    #[serde(rename = "HELLO")]
    Hello {
        /// Project this runner owns.
        project_id: Uuid,
    },

    /// Answer to a server request.
    #[serde(rename = "RUNNER_RESULT")]
    Result(RunnerResult),
}

/// Messages the server sends to the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Successful handshake.
    #[serde(rename = "HELLO_ACK")]
    HelloAck {
        /// The session id the runner must echo in every result.
        runner_session_id: Uuid,
    },

    /// Run a shell command under the permission floor.
    #[serde(rename = "RUNNER_EXEC")]
    Exec {
        /// Fresh per-request id.
        request_id: Uuid,
        /// Current session.
        runner_session_id: Uuid,
        /// The command line.
        command: String,
        /// Request budget in milliseconds.
        timeout_ms: u64,
        /// The server's classification; the runner applies the most
        /// restrictive of this and its local policy.
        permission_class: CommandClass,
    },

    /// Read a file.
    #[serde(rename = "RUNNER_READ")]
    Read {
        /// Fresh per-request id.
        request_id: Uuid,
        /// Current session.
        runner_session_id: Uuid,
        /// Repository-relative path.
        path: String,
    },

    /// Search file contents.
    #[serde(rename = "RUNNER_GREP")]
    Grep {
        /// Fresh per-request id.
        request_id: Uuid,
        /// Current session.
        runner_session_id: Uuid,
        /// Pattern to search for.
        pattern: String,
        /// Optional path restriction.
        path: Option<String>,
    },

    /// List a directory.
    #[serde(rename = "RUNNER_LIST")]
    List {
        /// Fresh per-request id.
        request_id: Uuid,
        /// Current session.
        runner_session_id: Uuid,
        /// Optional path; the repo root when absent.
        path: Option<String>,
    },

    /// Write a file. Only the apply pipeline sends this.
    #[serde(rename = "RUNNER_WRITE")]
    Write {
        /// Fresh per-request id.
        request_id: Uuid,
        /// Current session.
        runner_session_id: Uuid,
        /// Repository-relative path.
        path: String,
        /// File content.
        content: String,
    },
}

impl ServerMessage {
    /// The request id of a request message, if it carries one.
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            Self::HelloAck { .. } => None,
            Self::Exec { request_id, .. }
            | Self::Read { request_id, .. }
            | Self::Grep { request_id, .. }
            | Self::List { request_id, .. }
            | Self::Write { request_id, .. } => Some(*request_id),
        }
    }
}

/// Protocol-level failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A message failed to decode (bad JSON or unknown discriminant).
    #[error("invalid runner message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Decode one client message from its JSON text.
pub fn decode_client(text: &str) -> Result<ClientMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Encode one server message as JSON text.
pub fn encode_server(message: &ServerMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_roundtrip_and_tag() {
        let hello = ClientMessage::Hello {
            project_id: Uuid::nil(),
        };
        let json = serde_json::to_string(&hello).unwrap();
        assert!(json.contains("\"type\":\"HELLO\""));
        assert!(matches!(
            decode_client(&json).unwrap(),
            ClientMessage::Hello { .. }
        ));
    }

    #[test]
    fn exec_carries_permission_class() {
        let msg = ServerMessage::Exec {
            request_id: Uuid::nil(),
            runner_session_id: Uuid::nil(),
            command: "git status".into(),
            timeout_ms: 120_000,
            permission_class: CommandClass::Allow,
        };
        let json = encode_server(&msg).unwrap();
        assert!(json.contains("\"type\":\"RUNNER_EXEC\""));
        assert!(json.contains("\"permission_class\":\"allow\""));
    }

    #[test]
    fn unknown_discriminant_is_rejected() {
        let err = decode_client("{\"type\":\"RUNNER_SUDO\",\"project_id\":\"x\"}");
        assert!(err.is_err());
    }

    #[test]
    fn result_roundtrip() {
        let result = RunnerResult {
            request_id: Uuid::new_v4(),
            runner_session_id: Uuid::new_v4(),
            exit_code: 0,
            stdout: "ok".into(),
            stderr: String::new(),
            duration_ms: 12,
        };
        let json =
            serde_json::to_string(&ClientMessage::Result(result.clone())).unwrap();
        match decode_client(&json).unwrap() {
            ClientMessage::Result(back) => {
                assert_eq!(back.request_id, result.request_id);
                assert_eq!(back.exit_code, 0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn request_id_accessor() {
        let ack = ServerMessage::HelloAck {
            runner_session_id: Uuid::nil(),
        };
        assert!(ack.request_id().is_none());

        let id = Uuid::new_v4();
        let read = ServerMessage::Read {
            request_id: id,
            runner_session_id: Uuid::nil(),
            path: "src/lib.rs".into(),
        };
        assert_eq!(read.request_id(), Some(id));
    }
}
