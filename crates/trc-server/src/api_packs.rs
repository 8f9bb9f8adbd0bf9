//! Context-pack introspection, served through the pack's project runner.

use crate::auth::Identity;
use crate::error::ApiError;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use trc_bridge::RunnerSession;
use trc_core::{ContextPack, PackBudgets};
use trc_policy::CommandClass;

async fn pack_of(state: &AppState, pack_id: &str) -> Result<ContextPack, ApiError> {
    state
        .store
        .pack(pack_id)
        .await?
        .ok_or_else(|| ApiError::not_found("pack not found"))
}

async fn session_of(
    state: &AppState,
    pack: &ContextPack,
) -> Result<Arc<RunnerSession>, ApiError> {
    state
        .registry
        .session(pack.project_id)
        .await
        .ok_or_else(|| {
            ApiError::conflict("runner_not_connected", "no runner session for project")
        })
}

/// `GET /v1/packs/{id}/stats`.
pub async fn pack_stats(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<Identity>,
    Path(pack_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pack = pack_of(&state, &pack_id).await?;
    Ok(Json(json!({
        "pack_id": pack.pack_id,
        "run_id": pack.run_id,
        "task_id": pack.task_id,
        "mode": pack.mode,
        "files": pack.file_entries.len(),
        "pinned": pack.pinned_sources.len(),
        "budgets": pack.budgets,
        "redaction_stats": pack.redaction_stats,
        "created_at": pack.created_at,
    })))
}

/// Body of `POST /v1/packs/{id}/rebuild`.
#[derive(Debug, Default, Deserialize)]
pub struct RebuildBody {
    /// Replacement budgets.
    pub budgets: Option<PackBudgets>,
    /// Replacement pins.
    pub pins: Option<Vec<String>>,
}

/// `POST /v1/packs/{id}/rebuild` — mint a new pack; the old one is retained.
pub async fn pack_rebuild(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<Identity>,
    Path(pack_id): Path<String>,
    body: Option<Json<RebuildBody>>,
) -> Result<Json<ContextPack>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let pack = pack_of(&state, &pack_id).await?;
    let mut rebuilt = trc_context::rebuild(&pack, body.budgets, body.pins.as_deref());
    if let Ok(session) = session_of(&state, &rebuilt).await {
        trc_context::enrich(&mut rebuilt, &session).await;
    }
    state.store.save_pack(&rebuilt).await?;
    Ok(Json(rebuilt))
}

/// Query with an optional path.
#[derive(Debug, Default, Deserialize)]
pub struct PathQuery {
    /// Path within the working tree.
    pub path: Option<String>,
}

/// `GET /v1/packs/{id}/list` — list the working tree through the runner.
pub async fn pack_list(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<Identity>,
    Path(pack_id): Path<String>,
    Query(query): Query<PathQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pack = pack_of(&state, &pack_id).await?;
    let session = session_of(&state, &pack).await?;
    let result = session
        .list(query.path.as_deref())
        .await
        .map_err(|e| ApiError::conflict("runner_not_connected", e.to_string()))?;
    Ok(Json(json!({ "exit_code": result.exit_code, "entries": result.stdout })))
}

/// `GET /v1/packs/{id}/read?path=...`.
pub async fn pack_read(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<Identity>,
    Path(pack_id): Path<String>,
    Query(query): Query<PathQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(path) = query.path else {
        return Err(ApiError::validation("path is required"));
    };
    let pack = pack_of(&state, &pack_id).await?;
    let session = session_of(&state, &pack).await?;
    let result = session
        .read(&path)
        .await
        .map_err(|e| ApiError::conflict("runner_not_connected", e.to_string()))?;
    if result.exit_code != 0 {
        return Err(ApiError::not_found(format!("cannot read {path}")));
    }
    Ok(Json(json!({ "path": path, "content": result.stdout })))
}

/// Query of `GET /v1/packs/{id}/search`.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Pattern to search for.
    pub q: String,
    /// Optional path restriction.
    pub path: Option<String>,
}

/// `GET /v1/packs/{id}/search?q=...`.
pub async fn pack_search(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<Identity>,
    Path(pack_id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pack = pack_of(&state, &pack_id).await?;
    let session = session_of(&state, &pack).await?;
    let result = session
        .grep(&query.q, query.path.as_deref())
        .await
        .map_err(|e| ApiError::conflict("runner_not_connected", e.to_string()))?;
    Ok(Json(json!({ "matches": result.stdout, "exit_code": result.exit_code })))
}

async fn exec_readonly(
    state: &AppState,
    pack_id: &str,
    command: &str,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pack = pack_of(state, pack_id).await?;
    let session = session_of(state, &pack).await?;
    let result = session
        .exec(command, CommandClass::Allow, Some(30_000))
        .await
        .map_err(|e| ApiError::conflict("runner_not_connected", e.to_string()))?;
    Ok(Json(json!({
        "command": command,
        "exit_code": result.exit_code,
        "stdout": result.stdout,
        "stderr": result.stderr,
    })))
}

/// `GET /v1/packs/{id}/diff` — `git diff` through the runner.
pub async fn pack_diff(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<Identity>,
    Path(pack_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    exec_readonly(&state, &pack_id, "git diff --stat").await
}

/// `GET /v1/packs/{id}/gitlog` — recent history through the runner.
pub async fn pack_gitlog(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<Identity>,
    Path(pack_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    exec_readonly(&state, &pack_id, "git log --oneline -20").await
}

/// `GET /v1/packs/{id}/failures` — the most recent verify failure for the
/// pack's run.
pub async fn pack_failures(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<Identity>,
    Path(pack_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pack = pack_of(&state, &pack_id).await?;
    let events = state
        .store
        .list_by_type(
            Some(pack.project_id),
            trc_core::LedgerEventType::VerifyFinished,
            5,
        )
        .await?;
    let failures: Vec<_> = events
        .into_iter()
        .filter(|e| e.payload["passed"].as_bool() == Some(false))
        .map(|e| e.payload)
        .collect();
    Ok(Json(json!({ "failures": failures })))
}

/// `GET /v1/packs/{id}/logs` — recent ledger events for the pack's run.
pub async fn pack_logs(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<Identity>,
    Path(pack_id): Path<String>,
) -> Result<Json<Vec<trc_core::LedgerEvent>>, ApiError> {
    let pack = pack_of(&state, &pack_id).await?;
    Ok(Json(state.store.tail_for_run(pack.run_id, 50).await?))
}
