//! Project, plan, and chat endpoints.

use crate::auth::Identity;
use crate::error::ApiError;
use crate::AppState;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use trc_bridge::probe_repo_state;
use trc_core::{
    InputRecord, LedgerEvent, LedgerEventType, Plan, PlanPhase, PlanStaleness, PlanTask,
    TasksDocument,
};
use trc_provider::{ChatMessage, ChatRequest};
use uuid::Uuid;

fn event(identity: &Identity, event_type: LedgerEventType) -> LedgerEvent {
    LedgerEvent::new(event_type, identity.org_id.clone(), identity.user_id.clone())
}

// ---------------------------------------------------------------------------
// Connect / whoami
// ---------------------------------------------------------------------------

/// Body of `POST /v1/projects/connect`.
#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    /// Human-readable repository name.
    pub repo_name: String,
    /// Stable hash of the repository root.
    pub repo_root_hash: String,
}

/// Idempotent project registration keyed by `repo_root_hash`.
pub async fn connect(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<Identity>,
    Json(body): Json<ConnectRequest>,
) -> Result<Json<trc_core::Project>, ApiError> {
    if body.repo_name.trim().is_empty() || body.repo_root_hash.trim().is_empty() {
        return Err(ApiError::validation("repo_name and repo_root_hash are required"));
    }
    let project = state
        .store
        .connect_project(body.repo_name.trim(), body.repo_root_hash.trim())
        .await?;
    Ok(Json(project))
}

/// Identity plus current-month usage.
pub async fn whoami(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (start, end) = trc_cost::month_range_local(Local::now());
    let events: Vec<_> = state
        .store
        .list_in_range(start, end)
        .await?
        .into_iter()
        .filter(|e| e.org_id == identity.org_id)
        .collect();
    let usage = trc_cost::compute_usage(&events);
    Ok(Json(json!({
        "org_id": identity.org_id,
        "user_id": identity.user_id,
        "billing_plan": identity.billing_plan,
        "month_usage": usage,
    })))
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// Body of `POST /v1/projects/{id}/plan`.
#[derive(Debug, Default, Deserialize)]
pub struct CreatePlanRequest {
    /// Free-text intent.
    pub text: Option<String>,
    /// Names of attached files.
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Explicit tasks document; a one-task default is derived when absent.
    pub tasks_document: Option<TasksDocument>,
}

/// Summary returned for a created plan.
#[derive(Debug, Serialize)]
pub struct PlanSummary {
    /// Plan id.
    pub plan_id: Uuid,
    /// Number of tasks in the document.
    pub task_count: usize,
}

fn default_tasks_document(text: Option<&str>) -> TasksDocument {
    let title = text
        .and_then(|t| t.lines().next())
        .filter(|line| !line.trim().is_empty())
        .unwrap_or("Implement the requested change")
        .trim()
        .to_string();
    TasksDocument {
        phases: vec![PlanPhase {
            id: "phase-1".into(),
            title: "Implementation".into(),
            tasks: vec![PlanTask {
                id: "task-001".into(),
                title,
                task_type: "feature".into(),
                risk: Default::default(),
                deps: vec![],
                scope: Default::default(),
                acceptance: vec![],
                execution: text.map(str::to_string),
                outputs: vec![],
            }],
        }],
    }
}

/// Create a plan from free text and/or attachments.
pub async fn create_plan(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(project_id): Path<Uuid>,
    Json(body): Json<CreatePlanRequest>,
) -> Result<Json<PlanSummary>, ApiError> {
    if state.store.project(project_id).await?.is_none() {
        return Err(ApiError::not_found("project not found"));
    }

    // User input may carry secrets; mask before anything is stored.
    let text = body.text.as_deref().map(|t| trc_redact::redact(t).text);
    let tasks_document = body
        .tasks_document
        .unwrap_or_else(|| default_tasks_document(text.as_deref()));

    let plan = Plan {
        id: Uuid::new_v4(),
        project_id,
        created_at: Utc::now(),
        approved_at: None,
        approved_repo_commit: None,
        artifacts_manifest: vec![],
        tasks_document,
        input_record: InputRecord {
            text,
            attachments: body.attachments,
        },
    };
    state.store.insert_plan(&plan).await?;
    state
        .ledger(
            event(&identity, LedgerEventType::PlanCreated)
                .with_project(project_id)
                .with_plan(plan.id)
                .with_payload(json!({ "task_count": plan.tasks_document.task_count() })),
        )
        .await;

    Ok(Json(PlanSummary {
        plan_id: plan.id,
        task_count: plan.tasks_document.task_count(),
    }))
}

/// Body of `POST /v1/projects/{id}/plan/approve`.
#[derive(Debug, Deserialize)]
pub struct ApprovePlanRequest {
    /// The commit the plan is approved against.
    pub repo_commit: String,
}

/// One-time approval of the latest plan.
pub async fn approve_plan(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(project_id): Path<Uuid>,
    Json(body): Json<ApprovePlanRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(mut plan) = state.store.latest_plan(project_id).await? else {
        return Err(ApiError::not_found("no plan for project"));
    };
    plan.approve(body.repo_commit.trim())
        .map_err(|e| ApiError::conflict("already_approved", e.to_string()))?;
    state.store.update_plan(&plan).await?;
    state
        .ledger(
            event(&identity, LedgerEventType::PlanApproved)
                .with_project(project_id)
                .with_plan(plan.id)
                .with_payload(json!({ "repo_commit": plan.approved_repo_commit })),
        )
        .await;

    Ok(Json(json!({
        "plan_id": plan.id,
        "approved_at": plan.approved_at,
        "approved_repo_commit": plan.approved_repo_commit,
    })))
}

/// Latest/approved plan ids, commits, and staleness.
pub async fn plan_status(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let latest = state.store.latest_plan(project_id).await?;
    let approved = state.store.approved_plan(project_id).await?;

    let (head, dirty) = match state.registry.session(project_id).await {
        Some(session) => {
            let repo = probe_repo_state(&session).await;
            (repo.head, repo.dirty)
        }
        None => (None, None),
    };
    let staleness = match &approved {
        Some(plan) => PlanStaleness::evaluate(
            plan.approved_repo_commit.as_deref(),
            head.as_deref(),
            dirty,
        ),
        None => PlanStaleness::fresh(),
    };

    state
        .ledger(
            event(&identity, LedgerEventType::PlanStatus)
                .with_project(project_id)
                .with_payload(json!({ "stale": staleness.stale, "reason": staleness.reason })),
        )
        .await;

    Ok(Json(json!({
        "latest_plan_id": latest.as_ref().map(|p| p.id),
        "approved_plan_id": approved.as_ref().map(|p| p.id),
        "approved_repo_commit": approved.as_ref().and_then(|p| p.approved_repo_commit.clone()),
        "head": head,
        "dirty": dirty,
        "stale": staleness.stale,
        "stale_reason": staleness.reason,
    })))
}

/// The approved plan's tasks document.
pub async fn plan_tasks(
    State(state): State<Arc<AppState>>,
    Extension(_identity): Extension<Identity>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<TasksDocument>, ApiError> {
    let Some(plan) = state.store.approved_plan(project_id).await? else {
        return Err(ApiError::not_found("no approved plan for project"));
    };
    Ok(Json(plan.tasks_document))
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Body of `POST /v1/projects/{id}/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatBody {
    /// The user's message.
    pub message: String,
    /// Prior turns, oldest first.
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

/// One prior turn.
#[derive(Debug, Deserialize)]
pub struct ChatTurn {
    /// `user` or `assistant`.
    pub role: String,
    /// Turn text.
    pub content: String,
}

/// One-turn chat routed through the router and provider layer.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(project_id): Path<Uuid>,
    Json(body): Json<ChatBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.store.project(project_id).await?.is_none() {
        return Err(ApiError::not_found("project not found"));
    }

    let decision = trc_router::decide(
        "chat",
        &state.config.lane_policy.default_lane,
        Default::default(),
        None,
        4000,
        &state.config.model_stack,
        &state.config.lane_policy,
        &state.config.risk_policy,
        &state.config.pricing,
    )
    .map_err(|e| ApiError::validation(e.to_string()))?;

    let mut messages: Vec<ChatMessage> = body
        .history
        .iter()
        .map(|turn| ChatMessage {
            role: turn.role.clone(),
            content: trc_redact::redact(&turn.content).text,
        })
        .collect();
    messages.push(ChatMessage::user(trc_redact::redact(&body.message).text));

    state
        .ledger(
            event(&identity, LedgerEventType::LlmCallStarted)
                .with_project(project_id)
                .with_payload(json!({ "model": decision.selected_model, "kind": "chat" })),
        )
        .await;

    let (completion, resolved) = state
        .factory
        .chat_with_fallback(ChatRequest {
            model: decision.selected_model.clone(),
            messages,
            max_tokens: Some(2048),
        })
        .await
        .map_err(|e| ApiError::service_unavailable(e.to_string()))?;

    let (tokens_in, tokens_out) = match completion.usage {
        Some(usage) => (usage.tokens_in, usage.tokens_out),
        None => {
            let half = decision.expected_tokens / 2;
            (half, decision.expected_tokens - half)
        }
    };
    let cost = trc_cost::calculate_cost(
        tokens_in,
        tokens_out,
        &resolved.selected_model,
        state.config.model_stack.tier_of(&resolved.selected_model),
        &state.config.pricing,
        &identity.billing_plan,
        state.billing.credit_balance(&identity.org_id),
    );
    state
        .ledger(
            event(&identity, LedgerEventType::LlmCallFinished)
                .with_project(project_id)
                .with_payload(json!({
                    "model": resolved.selected_model,
                    "task_type": "chat",
                    "tokens_in": tokens_in,
                    "tokens_out": tokens_out,
                    "provider_cost_usd": cost.provider_cost_usd,
                    "credits_applied_usd": cost.credits_applied_usd,
                    "billable_provider_cost_usd": cost.billable_provider_cost_usd,
                    "markup": cost.markup,
                    "our_charge_usd": cost.our_charge_usd,
                    "used_fallback": resolved.used_fallback,
                })),
        )
        .await;

    Ok(Json(json!({
        "text": completion.text,
        "model": resolved.selected_model,
        "used_fallback": resolved.used_fallback,
        "cost": cost,
    })))
}
