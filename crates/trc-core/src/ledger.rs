//! Append-only ledger event model.
//!
//! The ledger is the single source of truth for every billable number.
//! Aggregates (usage, invoices, session stats) are recomputed from these
//! events; no derived total is ever stored.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of ledger event types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEventType {
    /// A plan was created.
    PlanCreated,
    /// A plan was approved at a commit.
    PlanApproved,
    /// A plan status check was served.
    PlanStatus,
    /// A run entered `RUNNING`.
    RunStarted,
    /// A run was paused.
    RunPaused,
    /// A run was resumed.
    RunResumed,
    /// A run was cancelled.
    RunCancelled,
    /// A run failed.
    RunFailed,
    /// A run completed.
    RunCompleted,
    /// A task execution began.
    TaskStarted,
    /// A task stage boundary was crossed.
    TaskStage,
    /// A task execution completed.
    TaskCompleted,
    /// A task execution failed.
    TaskFailed,
    /// The router selected a model.
    RouterDecision,
    /// A context pack was built and persisted.
    ContextPackBuilt,
    /// An LLM call began.
    LlmCallStarted,
    /// An LLM call finished; payload carries the cost breakdown.
    LlmCallFinished,
    /// A patch artifact was produced.
    PatchProduced,
    /// A verify pipeline began.
    VerifyStarted,
    /// A verify pipeline finished.
    VerifyFinished,
    /// A runner command began.
    RunnerCmdStarted,
    /// A runner command finished.
    RunnerCmdFinished,
    /// A runner command was blocked by the permission floor.
    RunnerCmdBlocked,
    /// A runner failed authentication.
    RunnerAuthFailed,
    /// An anomaly was detected (budget cap, provider outage).
    AnomalyDetected,
    /// Billing for a completed run was posted.
    BillingPosted,
    /// Session statistics were computed and served.
    SessionStats,
    /// A pull request was created by the apply pipeline.
    PrCreated,
}

/// One immutable entry in the append-only ledger.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LedgerEvent {
    /// Globally unique event identifier; duplicate writes must fail.
    pub event_id: String,
    /// Emission timestamp; per-run ordering key.
    pub ts: DateTime<Utc>,
    /// Owning organization.
    pub org_id: String,
    /// Acting user.
    pub user_id: String,
    /// Related project, if any.
    pub project_id: Option<Uuid>,
    /// Related run, if any.
    pub run_id: Option<Uuid>,
    /// Related plan, if any.
    pub plan_id: Option<Uuid>,
    /// Related plan task, if any.
    pub task_id: Option<String>,
    /// Event type discriminant.
    pub event_type: LedgerEventType,
    /// Event-specific payload.
    pub payload: serde_json::Value,
}

impl LedgerEvent {
    /// Create an event with a fresh id and the current timestamp.
    pub fn new(
        event_type: LedgerEventType,
        org_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            org_id: org_id.into(),
            user_id: user_id.into(),
            project_id: None,
            run_id: None,
            plan_id: None,
            task_id: None,
            event_type,
            payload: serde_json::Value::Null,
        }
    }

    /// Attach a project id.
    pub fn with_project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Attach a run id.
    pub fn with_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Attach a plan id.
    pub fn with_plan(mut self, plan_id: Uuid) -> Self {
        self.plan_id = Some(plan_id);
        self
    }

    /// Attach a plan task id.
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_type_serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&LedgerEventType::LlmCallFinished).unwrap(),
            "\"LLM_CALL_FINISHED\""
        );
        assert_eq!(
            serde_json::to_string(&LedgerEventType::RunnerCmdBlocked).unwrap(),
            "\"RUNNER_CMD_BLOCKED\""
        );
    }

    #[test]
    fn builder_attaches_scope() {
        let run_id = Uuid::new_v4();
        let e = LedgerEvent::new(LedgerEventType::RunStarted, "org-1", "user-1")
            .with_run(run_id)
            .with_task("task-001")
            .with_payload(json!({"lane": "balanced"}));
        assert_eq!(e.run_id, Some(run_id));
        assert_eq!(e.task_id.as_deref(), Some("task-001"));
        assert_eq!(e.payload["lane"], "balanced");
        assert!(!e.event_id.is_empty());
    }

    #[test]
    fn fresh_events_get_distinct_ids() {
        let a = LedgerEvent::new(LedgerEventType::RunStarted, "o", "u");
        let b = LedgerEvent::new(LedgerEventType::RunStarted, "o", "u");
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn ledger_event_roundtrips() {
        let e = LedgerEvent::new(LedgerEventType::BillingPosted, "org", "user")
            .with_payload(json!({"our_charge_usd": 1.25}));
        let json = serde_json::to_string(&e).unwrap();
        let back: LedgerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_id, e.event_id);
        assert_eq!(back.event_type, LedgerEventType::BillingPosted);
    }
}
