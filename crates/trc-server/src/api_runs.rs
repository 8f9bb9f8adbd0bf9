//! Run lifecycle, streaming, verify, and apply endpoints.

use crate::auth::Identity;
use crate::error::ApiError;
use crate::orchestrator::{self, StartRunRequest, VerifyRequest};
use crate::AppState;
use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::{Extension, Json};
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt as _;
use tracing::warn;
use trc_apply::{ApplyError, ApplyRequest};
use trc_core::{LedgerEvent, LedgerEventType, RunState};
use uuid::Uuid;

fn event(identity: &Identity, event_type: LedgerEventType) -> LedgerEvent {
    LedgerEvent::new(event_type, identity.org_id.clone(), identity.user_id.clone())
}

/// `POST /v1/projects/{id}/runs/start` — drive one task end-to-end.
pub async fn start_run(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(project_id): Path<Uuid>,
    Json(body): Json<StartRunRequest>,
) -> Result<Json<orchestrator::StartRunResponse>, ApiError> {
    let response = orchestrator::start_run(&state, &identity, project_id, body).await?;
    Ok(Json(response))
}

/// `GET /v1/projects/{id}/runs` — list a project's runs, newest first.
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<Identity>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<trc_core::Run>>, ApiError> {
    Ok(Json(state.store.list_runs(project_id).await?))
}

/// `GET /v1/runs/{id}/status`.
pub async fn run_status(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<Identity>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(run) = state.store.run(run_id).await? else {
        return Err(ApiError::not_found("run not found"));
    };
    Ok(Json(json!({
        "run_id": run.id,
        "state": run.state,
        "current_task_id": run.current_task_id,
        "cost_to_date": run.cost_to_date,
        "budget_cap_usd": run.budget_cap_usd,
        "budget_remaining": run.budget_remaining(),
        "lane": run.lane,
        "risk": run.risk,
    })))
}

/// `GET /v1/runs/{id}/stream` — the run's server-sent-event stream.
pub async fn stream_run(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<Identity>,
    Path(run_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    if state.store.run(run_id).await?.is_none() {
        return Err(ApiError::not_found("run not found"));
    }
    let subscription = state.hub.attach(run_id).await;
    let stream = tokio_stream::wrappers::ReceiverStream::new(subscription.rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(SseEvent::default().data(data))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// `POST /v1/runs/{id}/verify` — execute verify gates through the runner.
pub async fn verify_run(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(run_id): Path<Uuid>,
    body: Option<Json<VerifyRequest>>,
) -> Result<Json<orchestrator::VerifyReport>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let report = orchestrator::verify_run(&state, &identity, run_id, request).await?;
    Ok(Json(report))
}

/// Body of `POST /v1/runs/{id}/apply`.
#[derive(Debug, Default, Deserialize)]
pub struct ApplyBody {
    /// Open the PR as a draft.
    #[serde(default)]
    pub draft: bool,
}

/// `POST /v1/runs/{id}/apply` — strict verify, branch, commit, push, PR.
pub async fn apply_run(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(run_id): Path<Uuid>,
    body: Option<Json<ApplyBody>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let Some(run) = state.store.run(run_id).await? else {
        return Err(ApiError::not_found("run not found"));
    };
    let Some(session) = state.registry.session(run.project_id).await else {
        return Err(ApiError::conflict(
            "runner_not_connected",
            "no runner session for project",
        ));
    };
    let Some(task_id) = run.current_task_id.clone() else {
        return Err(ApiError::conflict("no_patch", "run has no task"));
    };
    let Some(exec) = state.store.task_execution(run_id, &task_id).await? else {
        return Err(ApiError::conflict("no_patch", "no task execution for run"));
    };
    let Some(patch_text) = exec.patch_text.clone() else {
        return Err(ApiError::conflict("no_patch", "task produced no patch"));
    };

    // A strict verify gates every apply.
    let report = orchestrator::verify_run(
        &state,
        &identity,
        run_id,
        VerifyRequest {
            mode: Some(trc_core::VerifyMode::Strict),
        },
    )
    .await?;
    if !report.passed {
        return Err(ApiError::conflict("verify_failed", "strict verify did not pass")
            .with_details(json!({ "report_path": report.report_path })));
    }

    let Some(adapter) = state.pr_adapter.clone() else {
        return Err(ApiError::bad_gateway("no PR adapter configured"));
    };

    let request = ApplyRequest {
        run_id,
        task_id: task_id.clone(),
        patch_text,
        title: format!("trcoder: {task_id}"),
        body: format!("Automated patch for task `{task_id}` (run `{run_id}`)."),
        draft: body.draft,
    };
    let outcome =
        trc_apply::apply_patch(&session, adapter.as_ref(), &state.rules, &request)
            .await
            .map_err(|err| match err {
                ApplyError::NonGithubRemote(remote) => {
                    ApiError::validation(format!("origin remote is not GitHub: {remote}"))
                }
                ApplyError::BranchExists(branch) => {
                    ApiError::conflict("branch_exists", format!("branch already exists: {branch}"))
                }
                ApplyError::Git { step, stderr } => {
                    warn!(%step, "apply git step failed");
                    ApiError::internal(format!("git {step} failed"))
                        .with_details(json!({ "stderr": stderr }))
                }
                ApplyError::Runner(e) => ApiError::conflict("runner_not_connected", e.to_string()),
                ApplyError::Pr(e) => ApiError::bad_gateway(e.to_string()),
            })?;

    state
        .ledger(
            event(&identity, LedgerEventType::PrCreated)
                .with_project(run.project_id)
                .with_run(run_id)
                .with_task(&task_id)
                .with_payload(json!({
                    "branch": outcome.branch,
                    "pr_number": outcome.pr.number,
                    "pr_url": outcome.pr.url,
                    "repo": format!("{}/{}", outcome.repo.owner, outcome.repo.name),
                })),
        )
        .await;

    Ok(Json(json!({
        "branch": outcome.branch,
        "pr_number": outcome.pr.number,
        "pr_url": outcome.pr.url,
    })))
}

// ---------------------------------------------------------------------------
// State transitions
// ---------------------------------------------------------------------------

async fn transition(
    state: &Arc<AppState>,
    identity: &Identity,
    run_id: Uuid,
    next: RunState,
    event_type: LedgerEventType,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(run) = state.store.run(run_id).await? else {
        return Err(ApiError::not_found("run not found"));
    };
    if !run.state.can_transition_to(next) {
        return Err(ApiError::conflict(
            "invalid_transition",
            format!("cannot move run from {:?} to {next:?}", run.state),
        ));
    }
    state.store.update_run_state(run_id, next).await?;
    state
        .ledger(
            event(identity, event_type)
                .with_project(run.project_id)
                .with_run(run_id)
                .with_payload(json!({ "from": run.state, "to": next })),
        )
        .await;
    Ok(Json(json!({ "run_id": run_id, "state": next })))
}

/// `POST /v1/runs/{id}/pause`. In-flight provider calls are not interrupted.
pub async fn pause_run(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    transition(&state, &identity, run_id, RunState::Paused, LedgerEventType::RunPaused).await
}

/// `POST /v1/runs/{id}/resume`.
pub async fn resume_run(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    transition(&state, &identity, run_id, RunState::Running, LedgerEventType::RunResumed).await
}

/// `POST /v1/runs/{id}/cancel`.
pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    transition(
        &state,
        &identity,
        run_id,
        RunState::Cancelled,
        LedgerEventType::RunCancelled,
    )
    .await
}
