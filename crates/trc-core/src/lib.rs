#![doc = include_str!("../README.md")]
//! trc-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable contract for the TRCODER control plane.
//!
//! If you only take one dependency, take this one.

/// Cost breakdowns, usage reports, and session statistics.
pub mod cost;
/// Contracts for external collaborators (secret store, billing).
pub mod external;
/// Append-only ledger event model.
pub mod ledger;
/// Context pack manifest types.
pub mod pack;
/// Projects, plans, and task documents.
pub mod plan;
/// Model router decision record.
pub mod router;
/// Run and task-execution state machines.
pub mod run;
/// Events streamed to run subscribers.
pub mod stream;

pub use cost::{CostBreakdown, ModelStat, SessionStats};
pub use ledger::{LedgerEvent, LedgerEventType};
pub use pack::{ContextPack, FileEntry, PackBudgets, PackMode, PackSignals, RedactionStats};
pub use plan::{
    InputRecord, Plan, PlanError, PlanPhase, PlanStaleness, PlanTask, Project, RiskLevel,
    StaleReason, TaskScope, TasksDocument,
};
pub use router::{ModelTier, RouterDecision};
pub use run::{Run, RunState, TaskExecState, TaskExecution};
pub use stream::{GateOutcome, StreamEvent, TaskStage, VerifyMode};

/// API version string embedded in HTTP responses and handshakes.
pub const API_VERSION: &str = "trcoder/v1";
