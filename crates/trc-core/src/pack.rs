//! Context pack manifest types.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether the pack is a manifest of pointers or carries hydrated content
/// metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PackMode {
    /// Pointers only.
    Manifest,
    /// Entries enriched with hashes and line ranges.
    Hydrated,
}

/// One file referenced by a context pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileEntry {
    /// Repository-relative path.
    pub path: String,
    /// Why the file is in the pack.
    pub why: String,
    /// Inclusive 1-based line range, filled by enrichment.
    pub range: Option<(u32, u32)>,
    /// Hex SHA-256 of the content, filled by enrichment.
    pub hash: Option<String>,
}

/// Signals gathered from the working tree when the pack was built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PackSignals {
    /// Most recent failing-test report, if any.
    pub failing_tests: Option<String>,
    /// Recent log excerpt, if any.
    pub logs: Option<String>,
    /// `git diff --stat` summary, if any.
    pub diff_summary: Option<String>,
}

/// Budgets bounding pack construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PackBudgets {
    /// Maximum number of file entries.
    pub max_files: u32,
    /// Maximum total lines across entries.
    pub max_lines: u32,
    /// Dependency-graph expansion depth.
    pub graph_depth: u32,
    /// Top-k retrieval cutoff.
    pub top_k: u32,
    /// Whether enrichment should hydrate content metadata.
    pub hydrate: bool,
}

impl Default for PackBudgets {
    fn default() -> Self {
        Self {
            max_files: 24,
            max_lines: 4000,
            graph_depth: 2,
            top_k: 12,
            hydrate: true,
        }
    }
}

/// Counts of secret material masked while assembling the pack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RedactionStats {
    /// Number of distinct secrets masked.
    pub masked_entries: u64,
    /// Number of characters replaced.
    pub masked_chars: u64,
}

/// The per-task manifest of what to show the model.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContextPack {
    /// Unique across all rebuilds: run, task, and a monotonic clock component.
    pub pack_id: String,
    /// Owning run.
    pub run_id: Uuid,
    /// Plan task id.
    pub task_id: String,
    /// Owning project.
    pub project_id: Uuid,
    /// Manifest or hydrated.
    pub mode: PackMode,
    /// Sanitized user pins.
    pub pinned_sources: Vec<String>,
    /// Files selected for the pack.
    pub file_entries: Vec<FileEntry>,
    /// Working-tree signals at build time.
    pub signals: PackSignals,
    /// Budgets the build honored.
    pub budgets: PackBudgets,
    /// Redaction counters.
    pub redaction_stats: RedactionStats,
    /// Build timestamp.
    pub created_at: DateTime<Utc>,
}
