//! trc-apply
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The only code path that runs write-class commands in a working tree.
//!
//! The patch is committed in an isolated `git worktree` off the current HEAD
//! and pushed to a fresh branch; the worktree is always removed afterwards,
//! and the branch is deleted when the push never happened. A [`PrAdapter`]
//! turns the pushed branch into a pull request.

/// GitHub adapter.
pub mod github;
/// The apply pipeline.
pub mod pipeline;

pub use github::GithubAdapter;
pub use pipeline::{apply_patch, ApplyError, ApplyOutcome, ApplyRequest};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Repo references
// ---------------------------------------------------------------------------

/// An `owner/name` repository reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    /// Repository owner or organization.
    pub owner: String,
    /// Repository name.
    pub name: String,
}

/// Parse a GitHub remote URL (`https://github.com/o/r.git` or
/// `git@github.com:o/r.git`). Returns `None` for non-GitHub remotes.
pub fn parse_github_remote(url: &str) -> Option<RepoRef> {
    let url = url.trim();
    let rest = url
        .strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("http://github.com/"))
        .or_else(|| url.strip_prefix("ssh://git@github.com/"))
        .or_else(|| url.strip_prefix("git@github.com:"))?;
    let rest = rest.strip_suffix(".git").unwrap_or(rest);
    let mut parts = rest.splitn(2, '/');
    let owner = parts.next()?.trim();
    let name = parts.next()?.trim().trim_end_matches('/');
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some(RepoRef {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

// ---------------------------------------------------------------------------
// PR adapter contract
// ---------------------------------------------------------------------------

/// Typed failures shared by every PR adapter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PrError {
    /// The forge is rate limiting us.
    #[error("forge rate limited")]
    RateLimit,
    /// Token rejected.
    #[error("forge authentication failed: {0}")]
    Auth(String),
    /// Repository or branch not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// A PR for this branch already exists, or the state conflicts.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// What to open a pull request with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequestSpec {
    /// PR title.
    pub title: String,
    /// PR body (Markdown).
    pub body: String,
    /// Source branch.
    pub source: String,
    /// Target branch.
    pub target: String,
    /// Open as draft.
    pub draft: bool,
    /// Labels to attach.
    pub labels: Vec<String>,
    /// Requested reviewers.
    pub reviewers: Vec<String>,
    /// Assignees.
    pub assignees: Vec<String>,
}

/// A created pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedPr {
    /// PR number.
    pub number: u64,
    /// Web URL.
    pub url: String,
}

/// The forge contract. Only the GitHub implementation ships; GitLab remains
/// interface-only.
#[async_trait]
pub trait PrAdapter: Send + Sync {
    /// The repository's default branch.
    async fn default_branch(&self, repo: &RepoRef) -> Result<String, PrError>;
    /// Whether a branch exists on the remote.
    async fn branch_exists(&self, repo: &RepoRef, branch: &str) -> Result<bool, PrError>;
    /// Open a pull request.
    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        spec: &PullRequestSpec,
    ) -> Result<CreatedPr, PrError>;
}
