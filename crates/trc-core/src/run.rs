//! Run and task-execution state machines.

use crate::plan::RiskLevel;
use crate::router::RouterDecision;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Lifecycle state of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Created but not yet executing.
    Init,
    /// Currently driving a task through the stage pipeline.
    Running,
    /// Paused by the user or by a budget anomaly.
    Paused,
    /// Terminal: the run failed.
    Failed,
    /// Terminal: the run was cancelled.
    Cancelled,
    /// Terminal: the run completed.
    Done,
}

impl RunState {
    /// Returns `true` if this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// The set of states that are valid successors of `self`.
    pub fn valid_transitions(&self) -> &'static [RunState] {
        match self {
            Self::Init => &[Self::Running, Self::Cancelled],
            Self::Running => &[
                Self::Paused,
                Self::Done,
                Self::Failed,
                Self::Cancelled,
            ],
            Self::Paused => &[Self::Running, Self::Cancelled, Self::Failed],
            Self::Done | Self::Failed | Self::Cancelled => &[],
        }
    }

    /// Returns `true` if transitioning from `self` to `next` is valid.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// A run: one drive of a plan task (or sequence of tasks) through the
/// orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Run {
    /// Unique run identifier.
    pub id: Uuid,
    /// Owning project.
    pub project_id: Uuid,
    /// Plan this run executes.
    pub plan_id: Uuid,
    /// Current lifecycle state.
    pub state: RunState,
    /// Execution lane name (speed, balanced, quality, cost-saver).
    pub lane: String,
    /// Risk level in effect.
    pub risk: RiskLevel,
    /// Budget cap in USD, if any.
    pub budget_cap_usd: Option<f64>,
    /// Monotone materialization of ledger charges for this run.
    pub cost_to_date: f64,
    /// The task currently (or last) being driven.
    pub current_task_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last state-change timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// Remaining budget, when a cap is set.
    pub fn budget_remaining(&self) -> Option<f64> {
        self.budget_cap_usd
            .map(|cap| (cap - self.cost_to_date).max(0.0))
    }
}

// ---------------------------------------------------------------------------
// Task execution
// ---------------------------------------------------------------------------

/// Lifecycle state of a single task execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskExecState {
    /// Actively being driven through stages.
    Running,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

/// The record of one task driven inside a run. Exactly one active record
/// exists per `(run_id, plan_task_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaskExecution {
    /// Unique record identifier.
    pub id: Uuid,
    /// Owning run.
    pub run_id: Uuid,
    /// Plan task being executed, e.g. `task-001`.
    pub plan_task_id: String,
    /// Current state.
    pub state: TaskExecState,
    /// The router decision that selected the model.
    pub router_decision: Option<RouterDecision>,
    /// Path of the persisted patch artifact, if one was produced.
    pub patch_path: Option<String>,
    /// The produced patch text, if any.
    pub patch_text: Option<String>,
    /// Input tokens consumed.
    pub tokens_in: u64,
    /// Output tokens produced.
    pub tokens_out: u64,
    /// Charge for this task in USD.
    pub cost_usd: f64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_state_serializes_screaming_snake_case() {
        assert_eq!(serde_json::to_string(&RunState::Init).unwrap(), "\"INIT\"");
        assert_eq!(serde_json::to_string(&RunState::Done).unwrap(), "\"DONE\"");
    }

    #[test]
    fn running_pauses_and_resumes() {
        assert!(RunState::Running.can_transition_to(RunState::Paused));
        assert!(RunState::Paused.can_transition_to(RunState::Running));
    }

    #[test]
    fn terminal_states_have_no_transitions() {
        for state in [RunState::Done, RunState::Failed, RunState::Cancelled] {
            assert!(state.is_terminal());
            assert!(state.valid_transitions().is_empty());
        }
    }

    #[test]
    fn init_cannot_jump_to_done() {
        assert!(!RunState::Init.can_transition_to(RunState::Done));
    }

    #[test]
    fn budget_remaining_clamps_at_zero() {
        let run = Run {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            state: RunState::Running,
            lane: "balanced".into(),
            risk: RiskLevel::Standard,
            budget_cap_usd: Some(1.0),
            cost_to_date: 2.5,
            current_task_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(run.budget_remaining(), Some(0.0));
    }

    #[test]
    fn budget_remaining_absent_without_cap() {
        let run = Run {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            state: RunState::Init,
            lane: "balanced".into(),
            risk: RiskLevel::Low,
            budget_cap_usd: None,
            cost_to_date: 0.0,
            current_task_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(run.budget_remaining(), None);
    }
}
