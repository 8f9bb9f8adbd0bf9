//! Projects, plans, and the tasks document.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// A registered repository. Created once per distinct `repo_root_hash` and
/// never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Project {
    /// Unique project identifier.
    pub id: Uuid,
    /// Human-readable repository name.
    pub repo_name: String,
    /// Stable hash of the repository root; the idempotency key for connect.
    pub repo_root_hash: String,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

/// Risk level attached to a plan task. Gates downgrades and confirmation
/// requirements.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Low-risk change; downgrades are freely allowed.
    Low,
    /// Default risk level.
    Standard,
    /// High-risk change; requires explicit confirmation to start.
    High,
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Standard
    }
}

impl RiskLevel {
    /// Stable lowercase name used in policy files and ledger payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Standard => "standard",
            Self::High => "high",
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks document
// ---------------------------------------------------------------------------

/// File and symbol scope for a single plan task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TaskScope {
    /// Paths the task is expected to touch.
    #[serde(default)]
    pub paths: Vec<String>,
    /// Paths explicitly out of bounds.
    #[serde(default)]
    pub exclude_paths: Vec<String>,
    /// Symbols of interest (functions, types).
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Free-form search queries that located the scope.
    #[serde(default)]
    pub queries: Vec<String>,
}

/// One task inside an approved plan.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlanTask {
    /// Stable identifier, e.g. `task-001`.
    pub id: String,
    /// Short human title.
    pub title: String,
    /// Task type; must be a key of the model stack's task-type map.
    pub task_type: String,
    /// Risk level for this task.
    #[serde(default)]
    pub risk: RiskLevel,
    /// Ids of tasks that must complete first.
    #[serde(default)]
    pub deps: Vec<String>,
    /// File and symbol scope.
    #[serde(default)]
    pub scope: TaskScope,
    /// Acceptance criteria.
    #[serde(default)]
    pub acceptance: Vec<String>,
    /// Execution notes for the model.
    #[serde(default)]
    pub execution: Option<String>,
    /// Expected outputs (artifact names).
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// An ordered phase of tasks.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlanPhase {
    /// Phase identifier, e.g. `phase-1`.
    pub id: String,
    /// Phase title.
    pub title: String,
    /// Tasks in execution order.
    pub tasks: Vec<PlanTask>,
}

/// The ordered document of phases and tasks attached to a plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TasksDocument {
    /// Phases in execution order.
    #[serde(default)]
    pub phases: Vec<PlanPhase>,
}

impl TasksDocument {
    /// The first task of the first non-empty phase, if any.
    pub fn first_task(&self) -> Option<&PlanTask> {
        self.phases.iter().flat_map(|p| p.tasks.iter()).next()
    }

    /// Find a task by id across all phases.
    pub fn find_task(&self, task_id: &str) -> Option<&PlanTask> {
        self.phases
            .iter()
            .flat_map(|p| p.tasks.iter())
            .find(|t| t.id == task_id)
    }

    /// Total number of tasks across all phases.
    pub fn task_count(&self) -> usize {
        self.phases.iter().map(|p| p.tasks.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Record of what the user supplied when creating the plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct InputRecord {
    /// Free text, already redacted.
    #[serde(default)]
    pub text: Option<String>,
    /// Names of attached files.
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// An immutable plan, except for its one-time approval.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    /// Unique plan identifier.
    pub id: Uuid,
    /// Owning project.
    pub project_id: Uuid,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Approval timestamp; set together with `approved_repo_commit`.
    pub approved_at: Option<DateTime<Utc>>,
    /// Commit the plan was approved against.
    pub approved_repo_commit: Option<String>,
    /// Paths of plan artifacts written to the data directory.
    #[serde(default)]
    pub artifacts_manifest: Vec<String>,
    /// The tasks document.
    pub tasks_document: TasksDocument,
    /// What the user supplied.
    #[serde(default)]
    pub input_record: InputRecord,
}

/// Errors from plan state changes.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Approval is one-time; a second approval is rejected.
    #[error("plan {0} is already approved")]
    AlreadyApproved(Uuid),
}

impl Plan {
    /// Whether the plan has been approved.
    pub fn is_approved(&self) -> bool {
        self.approved_at.is_some()
    }

    /// One-time approval at a specific repository commit.
    ///
    /// `approved_at` and `approved_repo_commit` are always set together.
    pub fn approve(&mut self, repo_commit: impl Into<String>) -> Result<(), PlanError> {
        if self.is_approved() {
            return Err(PlanError::AlreadyApproved(self.id));
        }
        self.approved_at = Some(Utc::now());
        self.approved_repo_commit = Some(repo_commit.into());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Staleness
// ---------------------------------------------------------------------------

/// Why a plan is considered stale relative to the working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// The runner could not report the repository state.
    RepoStateUnavailable,
    /// `git status --porcelain` reported uncommitted changes.
    WorkingTreeDirty,
    /// Current HEAD differs from the approved commit.
    CommitMismatch,
}

/// Result of comparing an approved plan against the live repository state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlanStaleness {
    /// Whether the plan is stale.
    pub stale: bool,
    /// Why, when stale.
    pub reason: Option<StaleReason>,
}

impl PlanStaleness {
    /// A fresh (non-stale) result.
    pub fn fresh() -> Self {
        Self {
            stale: false,
            reason: None,
        }
    }

    /// A stale result with the given reason.
    pub fn stale(reason: StaleReason) -> Self {
        Self {
            stale: true,
            reason: Some(reason),
        }
    }

    /// Evaluate staleness from the approved commit and observed repo state.
    ///
    /// `head` and `dirty` are `None` when the repo state could not be read.
    pub fn evaluate(
        approved_commit: Option<&str>,
        head: Option<&str>,
        dirty: Option<bool>,
    ) -> Self {
        let Some(approved) = approved_commit else {
            return Self::fresh();
        };
        let (Some(head), Some(dirty)) = (head, dirty) else {
            return Self::stale(StaleReason::RepoStateUnavailable);
        };
        if dirty {
            return Self::stale(StaleReason::WorkingTreeDirty);
        }
        if head != approved {
            return Self::stale(StaleReason::CommitMismatch);
        }
        Self::fresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(ids: &[&str]) -> TasksDocument {
        TasksDocument {
            phases: vec![PlanPhase {
                id: "phase-1".into(),
                title: "Phase 1".into(),
                tasks: ids
                    .iter()
                    .map(|id| PlanTask {
                        id: (*id).into(),
                        title: format!("Task {id}"),
                        task_type: "feature".into(),
                        risk: RiskLevel::Standard,
                        deps: vec![],
                        scope: TaskScope::default(),
                        acceptance: vec![],
                        execution: None,
                        outputs: vec![],
                    })
                    .collect(),
            }],
        }
    }

    fn plan(doc: TasksDocument) -> Plan {
        Plan {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            created_at: Utc::now(),
            approved_at: None,
            approved_repo_commit: None,
            artifacts_manifest: vec![],
            tasks_document: doc,
            input_record: InputRecord::default(),
        }
    }

    #[test]
    fn first_task_skips_empty_phases() {
        let mut doc = doc_with(&["task-001", "task-002"]);
        doc.phases.insert(
            0,
            PlanPhase {
                id: "phase-0".into(),
                title: "Empty".into(),
                tasks: vec![],
            },
        );
        assert_eq!(doc.first_task().unwrap().id, "task-001");
    }

    #[test]
    fn find_task_by_id() {
        let doc = doc_with(&["task-001", "task-002"]);
        assert!(doc.find_task("task-002").is_some());
        assert!(doc.find_task("task-009").is_none());
    }

    #[test]
    fn approval_is_one_time() {
        let mut p = plan(doc_with(&["task-001"]));
        p.approve("abc123").unwrap();
        assert!(p.is_approved());
        assert_eq!(p.approved_repo_commit.as_deref(), Some("abc123"));
        assert!(p.approved_at.is_some());
        assert!(matches!(
            p.approve("def456"),
            Err(PlanError::AlreadyApproved(_))
        ));
    }

    #[test]
    fn staleness_fresh_without_approved_commit() {
        let s = PlanStaleness::evaluate(None, Some("abc"), Some(true));
        assert!(!s.stale);
        assert!(s.reason.is_none());
    }

    #[test]
    fn staleness_unavailable_repo_state() {
        let s = PlanStaleness::evaluate(Some("abc"), None, None);
        assert_eq!(s.reason, Some(StaleReason::RepoStateUnavailable));
    }

    #[test]
    fn staleness_dirty_tree_wins_over_commit() {
        let s = PlanStaleness::evaluate(Some("abc"), Some("def"), Some(true));
        assert_eq!(s.reason, Some(StaleReason::WorkingTreeDirty));
    }

    #[test]
    fn staleness_commit_mismatch() {
        let s = PlanStaleness::evaluate(Some("abc"), Some("def"), Some(false));
        assert_eq!(s.reason, Some(StaleReason::CommitMismatch));
    }

    #[test]
    fn staleness_clean_and_matching_is_fresh() {
        let s = PlanStaleness::evaluate(Some("abc"), Some("abc"), Some(false));
        assert!(!s.stale);
    }

    #[test]
    fn risk_level_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&RiskLevel::High).unwrap(), "\"high\"");
        assert_eq!(serde_json::to_string(&RiskLevel::Low).unwrap(), "\"low\"");
    }

    #[test]
    fn risk_level_order_low_to_high() {
        assert!(RiskLevel::Low < RiskLevel::Standard);
        assert!(RiskLevel::Standard < RiskLevel::High);
    }
}
