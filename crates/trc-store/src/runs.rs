//! Runs, task executions, and context packs.

use crate::{is_constraint_violation, Store, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use trc_core::{ContextPack, RiskLevel, Run, RunState, TaskExecState, TaskExecution};
use uuid::Uuid;

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<Run> {
    let id: String = row.get("id")?;
    let project_id: String = row.get("project_id")?;
    let plan_id: String = row.get("plan_id")?;
    let state: String = row.get("state")?;
    let risk: String = row.get("risk")?;
    let created_at: i64 = row.get("created_at")?;
    let updated_at: i64 = row.get("updated_at")?;
    Ok(Run {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        project_id: Uuid::parse_str(&project_id).unwrap_or_default(),
        plan_id: Uuid::parse_str(&plan_id).unwrap_or_default(),
        state: serde_json::from_value(serde_json::Value::String(state))
            .unwrap_or(RunState::Failed),
        lane: row.get("lane")?,
        risk: serde_json::from_value(serde_json::Value::String(risk))
            .unwrap_or(RiskLevel::Standard),
        budget_cap_usd: row.get("budget_cap_usd")?,
        cost_to_date: row.get("cost_to_date")?,
        current_task_id: row.get("current_task_id")?,
        created_at: DateTime::<Utc>::from_timestamp_micros(created_at).unwrap_or_default(),
        updated_at: DateTime::<Utc>::from_timestamp_micros(updated_at).unwrap_or_default(),
    })
}

fn enum_name<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

impl Store {
    // -- Runs ----------------------------------------------------------------

    /// Insert a new run record.
    pub async fn insert_run(&self, run: &Run) -> Result<(), StoreError> {
        let run = run.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO runs
                 (id, project_id, plan_id, state, lane, risk, budget_cap_usd,
                  cost_to_date, current_task_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    run.id.to_string(),
                    run.project_id.to_string(),
                    run.plan_id.to_string(),
                    enum_name(&run.state),
                    run.lane,
                    enum_name(&run.risk),
                    run.budget_cap_usd,
                    run.cost_to_date,
                    run.current_task_id,
                    run.created_at.timestamp_micros(),
                    run.updated_at.timestamp_micros(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Fetch a run by id.
    pub async fn run(&self, id: Uuid) -> Result<Option<Run>, StoreError> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM runs WHERE id = ?1",
                    params![id.to_string()],
                    run_from_row,
                )
                .optional()?)
        })
        .await
    }

    /// Runs of a project, newest first.
    pub async fn list_runs(&self, project_id: Uuid) -> Result<Vec<Run>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare("SELECT * FROM runs WHERE project_id = ?1 ORDER BY created_at DESC")?;
            let rows = stmt
                .query_map(params![project_id.to_string()], run_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Move a run to a new state and stamp `updated_at`.
    pub async fn update_run_state(&self, id: Uuid, state: RunState) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE runs SET state = ?2, updated_at = ?3 WHERE id = ?1",
                params![
                    id.to_string(),
                    enum_name(&state),
                    Utc::now().timestamp_micros()
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("run"));
            }
            Ok(())
        })
        .await
    }

    /// Record the task currently being driven.
    pub async fn set_current_task(&self, id: Uuid, task_id: &str) -> Result<(), StoreError> {
        let task_id = task_id.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE runs SET current_task_id = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), task_id, Utc::now().timestamp_micros()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("run"));
            }
            Ok(())
        })
        .await
    }

    /// Add a non-negative charge to the run's materialized cost.
    pub async fn add_run_cost(&self, id: Uuid, delta_usd: f64) -> Result<(), StoreError> {
        let delta_usd = delta_usd.max(0.0);
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE runs SET cost_to_date = cost_to_date + ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), delta_usd, Utc::now().timestamp_micros()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("run"));
            }
            Ok(())
        })
        .await
    }

    // -- Task executions -----------------------------------------------------

    /// Insert a task execution record. Exactly one record may exist per
    /// `(run_id, plan_task_id)`.
    pub async fn insert_task_execution(&self, exec: &TaskExecution) -> Result<(), StoreError> {
        let document = serde_json::to_string(exec)?;
        let exec = exec.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO task_executions (id, run_id, plan_task_id, state, document)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    exec.id.to_string(),
                    exec.run_id.to_string(),
                    exec.plan_task_id,
                    enum_name(&exec.state),
                    document,
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    StoreError::DuplicateTaskExecution {
                        run_id: exec.run_id.to_string(),
                        task_id: exec.plan_task_id.clone(),
                    }
                } else {
                    StoreError::Sqlite(e)
                }
            })?;
            Ok(())
        })
        .await
    }

    /// Overwrite a task execution record (state, decision, patch, costs).
    pub async fn update_task_execution(&self, exec: &TaskExecution) -> Result<(), StoreError> {
        let document = serde_json::to_string(exec)?;
        let exec = exec.clone();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE task_executions SET state = ?2, document = ?3 WHERE id = ?1",
                params![exec.id.to_string(), enum_name(&exec.state), document],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("task execution"));
            }
            Ok(())
        })
        .await
    }

    /// Fetch the execution record for a run's task.
    pub async fn task_execution(
        &self,
        run_id: Uuid,
        plan_task_id: &str,
    ) -> Result<Option<TaskExecution>, StoreError> {
        let plan_task_id = plan_task_id.to_string();
        self.with_conn(move |conn| {
            let document: Option<String> = conn
                .query_row(
                    "SELECT document FROM task_executions
                     WHERE run_id = ?1 AND plan_task_id = ?2",
                    params![run_id.to_string(), plan_task_id],
                    |row| row.get(0),
                )
                .optional()?;
            document
                .map(|d| serde_json::from_str(&d).map_err(StoreError::Serde))
                .transpose()
        })
        .await
    }

    /// The most recent execution record for a plan task across runs.
    pub async fn latest_execution_for_task(
        &self,
        plan_task_id: &str,
    ) -> Result<Option<TaskExecution>, StoreError> {
        let plan_task_id = plan_task_id.to_string();
        self.with_conn(move |conn| {
            let document: Option<String> = conn
                .query_row(
                    "SELECT document FROM task_executions WHERE plan_task_id = ?1
                     ORDER BY rowid DESC LIMIT 1",
                    params![plan_task_id],
                    |row| row.get(0),
                )
                .optional()?;
            document
                .map(|d| serde_json::from_str(&d).map_err(StoreError::Serde))
                .transpose()
        })
        .await
    }

    /// Count of `DONE` task executions in a run.
    pub async fn completed_tasks(&self, run_id: Uuid) -> Result<u64, StoreError> {
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM task_executions WHERE run_id = ?1 AND state = ?2",
                params![run_id.to_string(), enum_name(&TaskExecState::Done)],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    // -- Context packs -------------------------------------------------------

    /// Persist a context pack. Rebuilds save a new `pack_id`; older packs are
    /// retained.
    pub async fn save_pack(&self, pack: &ContextPack) -> Result<(), StoreError> {
        let document = serde_json::to_string(pack)?;
        let pack = pack.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO context_packs (pack_id, project_id, run_id, task_id, document, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    pack.pack_id,
                    pack.project_id.to_string(),
                    pack.run_id.to_string(),
                    pack.task_id,
                    document,
                    pack.created_at.timestamp_micros(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Fetch a pack by id.
    pub async fn pack(&self, pack_id: &str) -> Result<Option<ContextPack>, StoreError> {
        let pack_id = pack_id.to_string();
        self.with_conn(move |conn| {
            let document: Option<String> = conn
                .query_row(
                    "SELECT document FROM context_packs WHERE pack_id = ?1",
                    params![pack_id],
                    |row| row.get(0),
                )
                .optional()?;
            document
                .map(|d| serde_json::from_str(&d).map_err(StoreError::Serde))
                .transpose()
        })
        .await
    }

    /// Packs of a project, newest first.
    pub async fn list_packs(&self, project_id: Uuid) -> Result<Vec<ContextPack>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT document FROM context_packs WHERE project_id = ?1
                 ORDER BY created_at DESC",
            )?;
            let docs = stmt
                .query_map(params![project_id.to_string()], |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            docs.into_iter()
                .map(|d| serde_json::from_str(&d).map_err(StoreError::Serde))
                .collect()
        })
        .await
    }
}
