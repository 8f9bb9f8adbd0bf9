//! trc-server
#![deny(unsafe_code)]
//!
//! The TRCODER control-plane server: REST API, SSE run streams, the runner
//! WebSocket endpoint, and the run orchestrator.

/// Projects, plans, and chat endpoints.
pub mod api_projects;
/// Run lifecycle, verify, and apply endpoints.
pub mod api_runs;
/// Usage, invoice, cost-explain, and ledger endpoints.
pub mod api_usage;
/// Context-pack introspection endpoints.
pub mod api_packs;
/// Artifact persistence.
pub mod artifacts;
/// Bearer authentication.
pub mod auth;
/// HTTP error mapping.
pub mod error;
/// Request-id and logging middleware.
pub mod middleware;
/// The run orchestrator state machine.
pub mod orchestrator;
/// The runner WebSocket endpoint.
pub mod ws;

use artifacts::ArtifactStore;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};
use trc_bridge::SessionRegistry;
use trc_config::CoreConfig;
use trc_core::external::{BillingSubscription, StaticBilling};
use trc_core::LedgerEvent;
use trc_hub::RunEventHub;
use trc_policy::{PermissionRules, PolicyError};
use trc_provider::ProviderFactory;
use trc_store::Store;

/// Shared state behind every handler.
pub struct AppState {
    /// SQLite persistence and the ledger.
    pub store: Store,
    /// Loaded configuration and policies.
    pub config: CoreConfig,
    /// Compiled command permission rules.
    pub rules: PermissionRules,
    /// Per-run event fan-out.
    pub hub: RunEventHub,
    /// Live runner sessions.
    pub registry: SessionRegistry,
    /// LLM providers and fallback chains.
    pub factory: ProviderFactory,
    /// Artifact persistence.
    pub artifacts: ArtifactStore,
    /// Credit balance source.
    pub billing: Arc<dyn BillingSubscription>,
    /// Forge adapter for the apply pipeline, when configured.
    pub pr_adapter: Option<Arc<dyn trc_apply::PrAdapter>>,
    /// Process start, for /health uptime.
    pub started_at: std::time::Instant,
}

impl AppState {
    /// Assemble state from its parts, compiling the permission rules.
    pub fn new(
        store: Store,
        config: CoreConfig,
        factory: ProviderFactory,
        artifacts: ArtifactStore,
    ) -> Result<Self, PolicyError> {
        let rules = PermissionRules::compile(&config.permissions)?;
        Ok(Self {
            store,
            config,
            rules,
            hub: RunEventHub::new(),
            registry: SessionRegistry::new(),
            factory,
            artifacts,
            billing: Arc::new(StaticBilling::default()),
            pr_adapter: None,
            started_at: std::time::Instant::now(),
        })
    }

    /// Attach a PR adapter.
    pub fn with_pr_adapter(mut self, adapter: Arc<dyn trc_apply::PrAdapter>) -> Self {
        self.pr_adapter = Some(adapter);
        self
    }

    /// Attach a billing source.
    pub fn with_billing(mut self, billing: Arc<dyn BillingSubscription>) -> Self {
        self.billing = billing;
        self
    }

    /// Append one ledger event. Duplicate ids are programmer errors and are
    /// logged loudly; other failures are logged and swallowed so a ledger
    /// hiccup cannot wedge a run mid-flight.
    pub async fn ledger(&self, event: LedgerEvent) {
        match self.store.append(&event).await {
            Ok(()) => {}
            Err(trc_store::StoreError::DuplicateEvent(id)) => {
                error!(event_id = %id, "duplicate ledger event id");
            }
            Err(err) => warn!(error = %err, "ledger append failed"),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_app(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/v1/projects/connect", post(api_projects::connect))
        .route("/v1/whoami", get(api_projects::whoami))
        .route("/v1/projects/{id}/plan", post(api_projects::create_plan))
        .route(
            "/v1/projects/{id}/plan/approve",
            post(api_projects::approve_plan),
        )
        .route(
            "/v1/projects/{id}/plan/status",
            get(api_projects::plan_status),
        )
        .route("/v1/projects/{id}/plan/tasks", get(api_projects::plan_tasks))
        .route("/v1/projects/{id}/chat", post(api_projects::chat))
        .route("/v1/projects/{id}/runs/start", post(api_runs::start_run))
        .route("/v1/projects/{id}/runs", get(api_runs::list_runs))
        .route("/v1/runs/{id}/status", get(api_runs::run_status))
        .route("/v1/runs/{id}/stream", get(api_runs::stream_run))
        .route("/v1/runs/{id}/verify", post(api_runs::verify_run))
        .route("/v1/runs/{id}/apply", post(api_runs::apply_run))
        .route("/v1/runs/{id}/pause", post(api_runs::pause_run))
        .route("/v1/runs/{id}/resume", post(api_runs::resume_run))
        .route("/v1/runs/{id}/cancel", post(api_runs::cancel_run))
        .route("/v1/usage/month", get(api_usage::usage_month))
        .route("/v1/usage/today", get(api_usage::usage_today))
        .route("/v1/invoice/preview", get(api_usage::invoice_preview))
        .route("/v1/cost/explain", get(api_usage::cost_explain))
        .route("/v1/logs/tail", get(api_usage::logs_tail))
        .route("/v1/ledger/export", get(api_usage::ledger_export))
        .route("/v1/packs/{id}/stats", get(api_packs::pack_stats))
        .route("/v1/packs/{id}/rebuild", post(api_packs::pack_rebuild))
        .route("/v1/packs/{id}/list", get(api_packs::pack_list))
        .route("/v1/packs/{id}/read", get(api_packs::pack_read))
        .route("/v1/packs/{id}/search", get(api_packs::pack_search))
        .route("/v1/packs/{id}/diff", get(api_packs::pack_diff))
        .route("/v1/packs/{id}/gitlog", get(api_packs::pack_gitlog))
        .route("/v1/packs/{id}/failures", get(api_packs::pack_failures))
        .route("/v1/packs/{id}/logs", get(api_packs::pack_logs))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/v1/runner/ws", get(ws::runner_ws))
        .merge(protected)
        .layer(axum::middleware::from_fn(middleware::request_log_middleware))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": trc_core::API_VERSION,
            "uptime_seconds": state.started_at.elapsed().as_secs(),
        })),
    )
}
