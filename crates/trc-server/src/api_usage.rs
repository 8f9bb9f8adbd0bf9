//! Usage, invoice, cost-explain, and ledger endpoints. Every number here is
//! recomputed from the ledger on demand.

use crate::auth::Identity;
use crate::error::ApiError;
use crate::AppState;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Local;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use trc_core::LedgerEvent;
use uuid::Uuid;

async fn usage_between(
    state: &AppState,
    identity: &Identity,
    range: (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>),
) -> Result<trc_cost::UsageReport, ApiError> {
    let events: Vec<LedgerEvent> = state
        .store
        .list_in_range(range.0, range.1)
        .await?
        .into_iter()
        .filter(|e| e.org_id == identity.org_id)
        .collect();
    Ok(trc_cost::compute_usage(&events))
}

/// `GET /v1/usage/month` — the current local month.
pub async fn usage_month(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<trc_cost::UsageReport>, ApiError> {
    let range = trc_cost::month_range_local(Local::now());
    Ok(Json(usage_between(&state, &identity, range).await?))
}

/// `GET /v1/usage/today` — the current local day.
pub async fn usage_today(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<trc_cost::UsageReport>, ApiError> {
    let range = trc_cost::today_range_local(Local::now());
    Ok(Json(usage_between(&state, &identity, range).await?))
}

/// `GET /v1/invoice/preview` — plan price + month usage + minimum.
pub async fn invoice_preview(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(plan) = state.config.pricing.plans.get(&identity.billing_plan) else {
        return Err(ApiError::validation(format!(
            "unknown billing plan: {}",
            identity.billing_plan
        )));
    };
    let range = trc_cost::month_range_local(Local::now());
    let usage = usage_between(&state, &identity, range).await?;
    let preview = trc_cost::invoice_preview(plan, &usage);
    Ok(Json(json!({ "preview": preview, "usage": usage })))
}

/// Query of `GET /v1/cost/explain`.
#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    /// Explain by plan task id.
    pub task_id: Option<String>,
    /// Explain by run id (uses the run's current task).
    pub run_id: Option<Uuid>,
}

/// `GET /v1/cost/explain` — the router decision behind a task's cost.
pub async fn cost_explain(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<Identity>,
    Query(query): Query<ExplainQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let exec = match (&query.task_id, query.run_id) {
        (Some(task_id), _) => state.store.latest_execution_for_task(task_id).await?,
        (None, Some(run_id)) => {
            let Some(run) = state.store.run(run_id).await? else {
                return Err(ApiError::not_found("run not found"));
            };
            match run.current_task_id {
                Some(task_id) => state.store.task_execution(run_id, &task_id).await?,
                None => None,
            }
        }
        (None, None) => {
            return Err(ApiError::validation("task_id or run_id is required"));
        }
    };
    let Some(exec) = exec else {
        return Err(ApiError::not_found("no execution record"));
    };
    Ok(Json(json!({
        "task_id": exec.plan_task_id,
        "run_id": exec.run_id,
        "router_decision": exec.router_decision,
        "tokens_in": exec.tokens_in,
        "tokens_out": exec.tokens_out,
        "cost_usd": exec.cost_usd,
    })))
}

/// Query of `GET /v1/logs/tail`.
#[derive(Debug, Deserialize)]
pub struct TailQuery {
    /// The run to tail.
    pub run_id: Uuid,
    /// Max events; newest first. Defaults to 50.
    pub limit: Option<usize>,
}

/// `GET /v1/logs/tail` — recent ledger events for a run.
pub async fn logs_tail(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<Identity>,
    Query(query): Query<TailQuery>,
) -> Result<Json<Vec<LedgerEvent>>, ApiError> {
    let limit = query.limit.unwrap_or(50).min(500);
    Ok(Json(state.store.tail_for_run(query.run_id, limit).await?))
}

/// `GET /v1/ledger/export` — the full ledger as JSON lines.
pub async fn ledger_export(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let jsonl = state.store.export_jsonl().await?;
    Ok(([(header::CONTENT_TYPE, "application/jsonl")], jsonl))
}
