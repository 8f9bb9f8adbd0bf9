//! Events streamed to run subscribers over SSE.
//!
//! The stream carries a single projection per run; historical replay comes
//! from the ledger, never from the hub.

use crate::cost::{CostBreakdown, SessionStats};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Task stages
// ---------------------------------------------------------------------------

/// Observable stages of a task execution, always emitted in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStage {
    /// Context pack assembly.
    PrepareContext,
    /// Prompt design and model routing.
    Design,
    /// Patch emission.
    ImplementPatch,
    /// Verify gates running through the bridge.
    LocalVerify,
    /// Model self-review of the produced patch.
    SelfReview,
    /// Ready for `/apply`.
    ProposeApply,
}

impl TaskStage {
    /// The canonical stage order for a successful task, excluding
    /// `LocalVerify` (which appears once per `/verify` invocation).
    pub fn pipeline() -> &'static [TaskStage] {
        &[
            Self::PrepareContext,
            Self::Design,
            Self::ImplementPatch,
            Self::SelfReview,
            Self::ProposeApply,
        ]
    }

    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrepareContext => "PREPARE_CONTEXT",
            Self::Design => "DESIGN",
            Self::ImplementPatch => "IMPLEMENT_PATCH",
            Self::LocalVerify => "LOCAL_VERIFY",
            Self::SelfReview => "SELF_REVIEW",
            Self::ProposeApply => "PROPOSE_APPLY",
        }
    }
}

impl std::fmt::Display for TaskStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Verify
// ---------------------------------------------------------------------------

/// Ordered verify strictness domain: `targeted < standard < strict`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMode {
    /// Only gates scoped to the touched files.
    Targeted,
    /// The default gate set.
    Standard,
    /// Every configured gate.
    Strict,
}

impl Default for VerifyMode {
    fn default() -> Self {
        Self::Standard
    }
}

impl VerifyMode {
    /// Stable lowercase name used in policy files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Targeted => "targeted",
            Self::Standard => "standard",
            Self::Strict => "strict",
        }
    }
}

/// Outcome of one verify gate.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GateOutcome {
    /// Gate name from the verify config.
    pub gate: String,
    /// Command that was executed (or blocked).
    pub command: String,
    /// Exit code; blocked gates report 1.
    pub exit_code: i32,
    /// Block reason when the permission floor refused the command
    /// (`deny` or `ask_denied`).
    pub blocked: Option<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl GateOutcome {
    /// Whether the gate passed.
    pub fn passed(&self) -> bool {
        self.exit_code == 0 && self.blocked.is_none()
    }
}

// ---------------------------------------------------------------------------
// Stream events
// ---------------------------------------------------------------------------

/// The single event projection served to `/v1/runs/{id}/stream` subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamEvent {
    /// First event of every run.
    RunBanner {
        /// Run identifier.
        run_id: Uuid,
        /// Plan being executed.
        plan_id: Uuid,
        /// Lane name.
        lane: String,
        /// Risk level name.
        risk: String,
        /// Task being driven.
        task_id: String,
        /// Budget cap, if set.
        budget_cap_usd: Option<f64>,
    },

    /// A task execution began.
    TaskStarted {
        /// Run identifier.
        run_id: Uuid,
        /// Plan task id.
        task_id: String,
        /// Task title.
        title: String,
    },

    /// A stage boundary was crossed.
    TaskStage {
        /// Run identifier.
        run_id: Uuid,
        /// Plan task id.
        task_id: String,
        /// The stage that began.
        stage: TaskStage,
    },

    /// The task produced its result.
    TaskResult {
        /// Run identifier.
        run_id: Uuid,
        /// Plan task id.
        task_id: String,
        /// The produced patch text.
        patch_text: String,
        /// Files the patch touches.
        changed_files: Vec<String>,
        /// Input tokens consumed.
        tokens_in: u64,
        /// Output tokens produced.
        tokens_out: u64,
        /// Full cost breakdown for the call.
        cost: CostBreakdown,
        /// Verification status; `"pending"` until `/verify` runs.
        verify_status: String,
    },

    /// Something went wrong enough to change the run's course.
    Anomaly {
        /// Run identifier.
        run_id: Uuid,
        /// What happened.
        reason: String,
        /// What the orchestrator did about it (e.g. `"paused"`).
        action: String,
    },

    /// A verify pipeline finished.
    VerifyFinished {
        /// Run identifier.
        run_id: Uuid,
        /// Plan task id the verify covered.
        task_id: String,
        /// Effective verify mode.
        mode: VerifyMode,
        /// Whether every gate exited 0.
        passed: bool,
        /// Per-gate outcomes.
        gates: Vec<GateOutcome>,
        /// Markdown report path in the artifact directory.
        report_path: String,
    },

    /// The permission floor blocked a command.
    PermissionDenied {
        /// Run identifier.
        run_id: Uuid,
        /// The blocked command.
        command: String,
        /// `deny` or `ask_denied`.
        reason: String,
    },

    /// Session statistics computed from the ledger.
    SessionStats {
        /// Run identifier.
        run_id: Uuid,
        /// The statistics.
        stats: SessionStats,
    },
}

impl StreamEvent {
    /// The run this event belongs to.
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::RunBanner { run_id, .. }
            | Self::TaskStarted { run_id, .. }
            | Self::TaskStage { run_id, .. }
            | Self::TaskResult { run_id, .. }
            | Self::Anomaly { run_id, .. }
            | Self::VerifyFinished { run_id, .. }
            | Self::PermissionDenied { run_id, .. }
            | Self::SessionStats { run_id, .. } => *run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_are_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&TaskStage::PrepareContext).unwrap(),
            "\"PREPARE_CONTEXT\""
        );
        assert_eq!(TaskStage::ProposeApply.to_string(), "PROPOSE_APPLY");
    }

    #[test]
    fn pipeline_order_is_fixed() {
        let names: Vec<&str> = TaskStage::pipeline().iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "PREPARE_CONTEXT",
                "DESIGN",
                "IMPLEMENT_PATCH",
                "SELF_REVIEW",
                "PROPOSE_APPLY"
            ]
        );
    }

    #[test]
    fn verify_modes_are_ordered() {
        assert!(VerifyMode::Targeted < VerifyMode::Standard);
        assert!(VerifyMode::Standard < VerifyMode::Strict);
        assert_eq!(
            VerifyMode::Standard.max(VerifyMode::Strict),
            VerifyMode::Strict
        );
    }

    #[test]
    fn gate_outcome_passed() {
        let ok = GateOutcome {
            gate: "unit".into(),
            command: "cargo test".into(),
            exit_code: 0,
            blocked: None,
            duration_ms: 10,
        };
        assert!(ok.passed());

        let blocked = GateOutcome {
            gate: "lint".into(),
            command: "rm -rf /".into(),
            exit_code: 1,
            blocked: Some("deny".into()),
            duration_ms: 0,
        };
        assert!(!blocked.passed());
    }

    #[test]
    fn stream_event_tag_is_event_name() {
        let e = StreamEvent::Anomaly {
            run_id: Uuid::nil(),
            reason: "budget cap would be exceeded".into(),
            action: "paused".into(),
        };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["event"], "ANOMALY");
        assert_eq!(v["reason"], "budget cap would be exceeded");
    }

    #[test]
    fn stream_event_exposes_run_id() {
        let id = Uuid::new_v4();
        let e = StreamEvent::PermissionDenied {
            run_id: id,
            command: "rm -rf /".into(),
            reason: "deny".into(),
        };
        assert_eq!(e.run_id(), id);
    }
}
