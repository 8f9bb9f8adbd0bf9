//! trc-bridge
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The duplex session between the server and a per-project runner.
//!
//! The server never touches the working tree directly: every exec, read,
//! grep, list, and write is a request/response over the session, matched by
//! `request_id` through a typed pending table. Results carrying a stale
//! session id are dropped. Responses are redacted before callers see them.

/// Wire envelopes.
pub mod protocol;
/// Sessions and the registry.
pub mod session;

pub use protocol::{ClientMessage, ProtocolError, RunnerResult, ServerMessage};
pub use session::{probe_repo_state, BridgeError, RepoState, RunnerSession, SessionRegistry};

/// Default budget for an exec request.
pub const DEFAULT_EXEC_TIMEOUT_MS: u64 = 120_000;
/// Default budget for read/grep/list/write requests.
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 30_000;

/// Stderr marker a runner emits when the permission floor denies a command.
pub const BLOCKED_DENY_STDERR: &str = "command blocked by permission policy (deny)";
/// Stderr marker a runner emits when the user refuses an `ask` command.
pub const BLOCKED_ASK_STDERR: &str = "command blocked by permission policy (ask_denied)";

/// Classify a failed result as permission-blocked, returning `deny` or
/// `ask_denied` when the runner's distinguishable stderr marker is present.
pub fn blocked_reason(result: &RunnerResult) -> Option<String> {
    if result.exit_code == 0 {
        return None;
    }
    if result.stderr.contains(BLOCKED_DENY_STDERR) {
        return Some("deny".to_string());
    }
    if result.stderr.contains(BLOCKED_ASK_STDERR) {
        return Some("ask_denied".to_string());
    }
    None
}
