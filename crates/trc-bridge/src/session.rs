//! Runner sessions and the per-project registry.

use crate::protocol::{RunnerResult, ServerMessage};
use crate::{DEFAULT_EXEC_TIMEOUT_MS, DEFAULT_IO_TIMEOUT_MS};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, warn};
use trc_policy::CommandClass;
use uuid::Uuid;

/// Errors from the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// No live runner session for the project.
    #[error("no runner connected for project {0}")]
    NotConnected(Uuid),
    /// The outbound channel to the runner is gone.
    #[error("runner channel closed")]
    ChannelClosed,
}

/// One live duplex session with a project's runner.
pub struct RunnerSession {
    /// Session identity echoed in every result.
    pub session_id: Uuid,
    /// Project whose working tree this runner owns.
    pub project_id: Uuid,
    /// Organization that authenticated the runner.
    pub org_id: String,
    /// User that authenticated the runner.
    pub user_id: String,
    outbound: mpsc::Sender<ServerMessage>,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<RunnerResult>>>,
}

impl RunnerSession {
    fn new(
        project_id: Uuid,
        org_id: String,
        user_id: String,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            project_id,
            org_id,
            user_id,
            outbound,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Send one request and wait for its result, bounded by `timeout`.
    ///
    /// A request that never answers yields a synthetic `exit_code=1` result
    /// and its pending entry is cleaned up. Stdout and stderr are redacted
    /// before the caller sees them.
    async fn request(
        &self,
        request_id: Uuid,
        message: ServerMessage,
        timeout: Duration,
    ) -> Result<RunnerResult, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, tx);

        if self.outbound.send(message).await.is_err() {
            self.pending.lock().await.remove(&request_id);
            return Err(BridgeError::ChannelClosed);
        }

        let result = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) | Err(_) => {
                self.pending.lock().await.remove(&request_id);
                debug!(%request_id, "runner request timed out");
                RunnerResult {
                    request_id,
                    runner_session_id: self.session_id,
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: format!("runner request timed out after {} ms", timeout.as_millis()),
                    duration_ms: timeout.as_millis() as u64,
                }
            }
        };

        Ok(redacted(result))
    }

    /// Route an inbound result to its waiter. Returns `false` when nothing
    /// was waiting (timed out or unknown id).
    pub async fn complete(&self, result: RunnerResult) -> bool {
        if result.runner_session_id != self.session_id {
            warn!(
                got = %result.runner_session_id,
                want = %self.session_id,
                "dropping result with stale session id"
            );
            return false;
        }
        match self.pending.lock().await.remove(&result.request_id) {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Execute a command under the permission floor.
    pub async fn exec(
        &self,
        command: &str,
        permission_class: CommandClass,
        timeout_ms: Option<u64>,
    ) -> Result<RunnerResult, BridgeError> {
        let timeout_ms = timeout_ms.unwrap_or(DEFAULT_EXEC_TIMEOUT_MS);
        let request_id = Uuid::new_v4();
        self.request(
            request_id,
            ServerMessage::Exec {
                request_id,
                runner_session_id: self.session_id,
                command: command.to_string(),
                timeout_ms,
                permission_class,
            },
            Duration::from_millis(timeout_ms),
        )
        .await
    }

    /// Read a file from the working tree.
    pub async fn read(&self, path: &str) -> Result<RunnerResult, BridgeError> {
        let request_id = Uuid::new_v4();
        self.request(
            request_id,
            ServerMessage::Read {
                request_id,
                runner_session_id: self.session_id,
                path: path.to_string(),
            },
            Duration::from_millis(DEFAULT_IO_TIMEOUT_MS),
        )
        .await
    }

    /// Search the working tree.
    pub async fn grep(
        &self,
        pattern: &str,
        path: Option<&str>,
    ) -> Result<RunnerResult, BridgeError> {
        let request_id = Uuid::new_v4();
        self.request(
            request_id,
            ServerMessage::Grep {
                request_id,
                runner_session_id: self.session_id,
                pattern: pattern.to_string(),
                path: path.map(str::to_string),
            },
            Duration::from_millis(DEFAULT_IO_TIMEOUT_MS),
        )
        .await
    }

    /// List a directory of the working tree.
    pub async fn list(&self, path: Option<&str>) -> Result<RunnerResult, BridgeError> {
        let request_id = Uuid::new_v4();
        self.request(
            request_id,
            ServerMessage::List {
                request_id,
                runner_session_id: self.session_id,
                path: path.map(str::to_string),
            },
            Duration::from_millis(DEFAULT_IO_TIMEOUT_MS),
        )
        .await
    }

    /// Write a file. Only the apply pipeline calls this.
    pub async fn write(&self, path: &str, content: &str) -> Result<RunnerResult, BridgeError> {
        let request_id = Uuid::new_v4();
        self.request(
            request_id,
            ServerMessage::Write {
                request_id,
                runner_session_id: self.session_id,
                path: path.to_string(),
                content: content.to_string(),
            },
            Duration::from_millis(DEFAULT_IO_TIMEOUT_MS),
        )
        .await
    }
}

fn redacted(mut result: RunnerResult) -> RunnerResult {
    result.stdout = trc_redact::redact(&result.stdout).text;
    result.stderr = trc_redact::redact(&result.stderr).text;
    result
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// All live sessions, at most one per project.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<RunnerSession>>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new authenticated session, superseding any previous one
    /// for the project. The old session's outbound channel is dropped, which
    /// closes its socket task.
    pub async fn register(
        &self,
        project_id: Uuid,
        org_id: String,
        user_id: String,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Arc<RunnerSession> {
        let session = Arc::new(RunnerSession::new(project_id, org_id, user_id, outbound));
        let previous = self
            .sessions
            .write()
            .await
            .insert(project_id, session.clone());
        if let Some(previous) = previous {
            debug!(
                %project_id,
                old = %previous.session_id,
                new = %session.session_id,
                "superseding runner session"
            );
        }
        session
    }

    /// The live session for a project, if any.
    pub async fn session(&self, project_id: Uuid) -> Option<Arc<RunnerSession>> {
        self.sessions.read().await.get(&project_id).cloned()
    }

    /// Remove a session, but only if it is still the registered one.
    pub async fn remove(&self, project_id: Uuid, session_id: Uuid) {
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(&project_id)
            .is_some_and(|s| s.session_id == session_id)
        {
            sessions.remove(&project_id);
        }
    }

    /// Route an inbound result to the project's session. Results with a
    /// stale session id are dropped.
    pub async fn dispatch_result(&self, project_id: Uuid, result: RunnerResult) -> bool {
        match self.session(project_id).await {
            Some(session) => session.complete(result).await,
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Repo state probe
// ---------------------------------------------------------------------------

/// Observed repository state, used for plan staleness checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoState {
    /// Current HEAD commit, when readable.
    pub head: Option<String>,
    /// Whether `git status --porcelain` reported changes, when readable.
    pub dirty: Option<bool>,
}

/// Ask the runner for HEAD and working-tree cleanliness. Read-only commands.
pub async fn probe_repo_state(session: &RunnerSession) -> RepoState {
    let head = match session
        .exec("git rev-parse HEAD", CommandClass::Allow, Some(15_000))
        .await
    {
        Ok(result) if result.exit_code == 0 => Some(result.stdout.trim().to_string()),
        _ => None,
    };
    let dirty = match session
        .exec("git status --porcelain", CommandClass::Allow, Some(15_000))
        .await
    {
        Ok(result) if result.exit_code == 0 => Some(!result.stdout.trim().is_empty()),
        _ => None,
    };
    RepoState { head, dirty }
}
