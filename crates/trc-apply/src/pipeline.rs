//! The apply pipeline: isolated worktree, branch, commit, push, PR.

use crate::{parse_github_remote, CreatedPr, PrAdapter, PrError, PullRequestSpec, RepoRef};
use tracing::{info, warn};
use trc_bridge::{BridgeError, RunnerSession};
use trc_policy::{CommandClass, PermissionRules};
use uuid::Uuid;

const PATCH_FILE: &str = ".trcoder-patch.diff";

/// Errors from the apply pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// The `origin` remote is not a GitHub URL.
    #[error("origin remote is not GitHub: {0}")]
    NonGithubRemote(String),
    /// The target branch already exists locally or remotely.
    #[error("branch already exists: {0}")]
    BranchExists(String),
    /// A git step failed. The worktree has been cleaned up.
    #[error("git {step} failed: {stderr}")]
    Git {
        /// The step that failed (e.g. `apply --index`).
        step: String,
        /// Captured stderr, redacted.
        stderr: String,
    },
    /// The runner channel failed.
    #[error(transparent)]
    Runner(#[from] BridgeError),
    /// The PR adapter failed after the push.
    #[error(transparent)]
    Pr(#[from] PrError),
}

/// What to apply.
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    /// Run the patch came from.
    pub run_id: Uuid,
    /// Task the patch belongs to.
    pub task_id: String,
    /// The unified diff to commit.
    pub patch_text: String,
    /// PR title.
    pub title: String,
    /// PR body.
    pub body: String,
    /// Open as draft.
    pub draft: bool,
}

/// Result of a successful apply.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    /// The pushed branch.
    pub branch: String,
    /// The created pull request.
    pub pr: CreatedPr,
    /// The repository the PR was opened against.
    pub repo: RepoRef,
}

/// The branch name for a run/task pair.
pub fn branch_name(run_id: Uuid, task_id: &str) -> String {
    format!("trcoder/{run_id}/{task_id}")
}

struct GitSteps<'a> {
    session: &'a RunnerSession,
    rules: &'a PermissionRules,
}

impl GitSteps<'_> {
    /// Run one command, classifying it under the server policy so the
    /// runner's permission floor sees an honest class.
    async fn run(&self, step: &str, command: &str) -> Result<String, ApplyError> {
        let class = self.rules.classify(command);
        let result = self
            .session
            .exec(command, class, None)
            .await?;
        if result.exit_code != 0 {
            return Err(ApplyError::Git {
                step: step.to_string(),
                stderr: if result.stderr.is_empty() {
                    result.stdout
                } else {
                    result.stderr
                },
            });
        }
        Ok(result.stdout)
    }

    /// Best-effort command whose failure is only logged.
    async fn run_quietly(&self, command: &str) {
        let class = self.rules.classify(command);
        match self.session.exec(command, class, None).await {
            Ok(result) if result.exit_code != 0 => {
                warn!(command, stderr = %result.stderr, "cleanup command failed");
            }
            Err(err) => warn!(command, error = %err, "cleanup command failed"),
            Ok(_) => {}
        }
    }
}

/// Commit the patch on a fresh branch in an isolated worktree, push it, and
/// open a pull request.
///
/// The worktree is always removed, whatever happens; the branch is deleted
/// when the push never happened. PR-adapter failures after a successful push
/// leave the branch in place.
pub async fn apply_patch(
    session: &RunnerSession,
    adapter: &dyn PrAdapter,
    rules: &PermissionRules,
    request: &ApplyRequest,
) -> Result<ApplyOutcome, ApplyError> {
    let git = GitSteps { session, rules };

    let remote = git.run("remote get-url", "git remote get-url origin").await?;
    let repo = parse_github_remote(&remote)
        .ok_or_else(|| ApplyError::NonGithubRemote(remote.trim().to_string()))?;

    let branch = branch_name(request.run_id, &request.task_id);
    let local_probe = session
        .exec(
            &format!("git rev-parse --verify --quiet refs/heads/{branch}"),
            CommandClass::Allow,
            None,
        )
        .await?;
    if local_probe.exit_code == 0 {
        return Err(ApplyError::BranchExists(branch));
    }
    if adapter.branch_exists(&repo, &branch).await? {
        return Err(ApplyError::BranchExists(branch));
    }

    let worktree = format!(".trcoder/worktrees/{}-{}", request.run_id, request.task_id);
    git.run(
        "worktree add",
        &format!("git worktree add -b {branch} {worktree} HEAD"),
    )
    .await?;

    let mut pushed = false;
    let staged = stage_and_push(&git, session, request, &branch, &worktree, &mut pushed).await;

    // The worktree is removed on every path.
    git.run_quietly(&format!("git worktree remove --force {worktree}"))
        .await;

    match staged {
        Ok(()) => {}
        Err(err) => {
            if !pushed {
                git.run_quietly(&format!("git branch -D {branch}")).await;
            }
            return Err(err);
        }
    }

    let target = adapter.default_branch(&repo).await?;
    let pr = adapter
        .create_pull_request(
            &repo,
            &PullRequestSpec {
                title: request.title.clone(),
                body: request.body.clone(),
                source: branch.clone(),
                target,
                draft: request.draft,
                labels: vec!["trcoder".into()],
                reviewers: vec![],
                assignees: vec![],
            },
        )
        .await?;

    info!(%branch, pr = pr.number, "apply pipeline complete");
    Ok(ApplyOutcome { branch, pr, repo })
}

async fn stage_and_push(
    git: &GitSteps<'_>,
    session: &RunnerSession,
    request: &ApplyRequest,
    branch: &str,
    worktree: &str,
    pushed: &mut bool,
) -> Result<(), ApplyError> {
    let patch_path = format!("{worktree}/{PATCH_FILE}");
    let write = session.write(&patch_path, &request.patch_text).await?;
    if write.exit_code != 0 {
        return Err(ApplyError::Git {
            step: "write patch".into(),
            stderr: write.stderr,
        });
    }

    git.run(
        "apply --index",
        &format!("git -C {worktree} apply --index {PATCH_FILE}"),
    )
    .await?;
    git.run_quietly(&format!("git -C {worktree} rm --cached -q {PATCH_FILE}"))
        .await;
    git.run(
        "commit",
        &format!(
            "git -C {worktree} commit -m \"trcoder: {task_id}\"",
            task_id = request.task_id
        ),
    )
    .await?;
    git.run(
        "push",
        &format!("git -C {worktree} push -u origin {branch}"),
    )
    .await?;
    *pushed = true;
    Ok(())
}
