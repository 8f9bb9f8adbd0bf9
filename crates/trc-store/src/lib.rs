//! trc-store
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! SQLite persistence for the TRCODER control plane: projects, plans, runs,
//! task executions, context packs, API keys, and the append-only ledger.
//!
//! The ledger is the single source of truth for every derived number; its
//! only write operation is [`Store::append`], and no background job ever
//! mutates it.

/// Projects, plans, and API keys.
mod catalog;
/// The append-only ledger.
mod ledger;
/// Runs, task executions, and context packs.
mod runs;

pub use catalog::ApiKeyIdentity;

use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Errors from the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An event with the same `event_id` already exists. Programmer error.
    #[error("duplicate ledger event: {0}")]
    DuplicateEvent(String),

    /// A second active task execution for the same `(run_id, plan_task_id)`.
    #[error("duplicate task execution for run {run_id} task {task_id}")]
    DuplicateTaskExecution {
        /// Owning run.
        run_id: String,
        /// Plan task id.
        task_id: String,
    },

    /// The requested row does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The underlying database failed.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored document failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Handle to the SQLite database. Clone freely; the connection is shared.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at `path` and initialize the schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn).await
    }

    /// Open an in-memory database. Used by tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn).await
    }

    async fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(10))?;
        // PRAGMA journal_mode returns a row, so query_row and ignore it.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute("PRAGMA synchronous = NORMAL", [])?;
        conn.execute("PRAGMA foreign_keys = OFF", [])?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS projects (
                id             TEXT PRIMARY KEY,
                repo_name      TEXT NOT NULL,
                repo_root_hash TEXT NOT NULL UNIQUE,
                created_at     INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS plans (
                id         TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES projects(id),
                created_at INTEGER NOT NULL,
                approved_at INTEGER,
                document   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS runs (
                id              TEXT PRIMARY KEY,
                project_id      TEXT NOT NULL REFERENCES projects(id),
                plan_id         TEXT NOT NULL REFERENCES plans(id),
                state           TEXT NOT NULL,
                lane            TEXT NOT NULL,
                risk            TEXT NOT NULL,
                budget_cap_usd  REAL,
                cost_to_date    REAL NOT NULL DEFAULT 0,
                current_task_id TEXT,
                created_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS task_executions (
                id           TEXT PRIMARY KEY,
                run_id       TEXT NOT NULL REFERENCES runs(id),
                plan_task_id TEXT NOT NULL,
                state        TEXT NOT NULL,
                document     TEXT NOT NULL,
                UNIQUE(run_id, plan_task_id)
            );

            CREATE TABLE IF NOT EXISTS context_packs (
                pack_id    TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                run_id     TEXT NOT NULL,
                task_id    TEXT NOT NULL,
                document   TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS api_keys (
                token   TEXT PRIMARY KEY,
                org_id  TEXT NOT NULL,
                user_id TEXT NOT NULL,
                billing_plan TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ledger_events (
                event_id   TEXT PRIMARY KEY,
                ts         INTEGER NOT NULL,
                org_id     TEXT NOT NULL,
                user_id    TEXT NOT NULL,
                project_id TEXT,
                run_id     TEXT,
                plan_id    TEXT,
                task_id    TEXT,
                event_type TEXT NOT NULL,
                payload    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ledger_ts ON ledger_events(ts);
            CREATE INDEX IF NOT EXISTS idx_ledger_run ON ledger_events(run_id, ts);
            CREATE INDEX IF NOT EXISTS idx_ledger_type ON ledger_events(event_type, ts);
            ",
        )?;
        Ok(())
    }

    pub(crate) async fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock().await;
        f(&conn)
    }
}

/// Returns `true` when a rusqlite error is a primary-key or unique-constraint
/// violation.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
