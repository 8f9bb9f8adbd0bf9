//! The run orchestrator: drives a task through the stage pipeline, emitting
//! stream events to the hub and durable events to the ledger.
//!
//! Ledger appends always happen after the side effect they record, so a
//! crash can never leave a claim of work that wasn't done.

use crate::auth::Identity;
use crate::error::ApiError;
use crate::AppState;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use trc_bridge::{probe_repo_state, RunnerSession};
use trc_core::{
    GateOutcome, LedgerEvent, LedgerEventType, PackBudgets, Plan, PlanStaleness, PlanTask,
    RiskLevel, Run, RunState, StreamEvent, TaskExecState, TaskExecution, TaskStage, VerifyMode,
};
use trc_provider::ProviderError;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

/// Body of `POST /v1/projects/{id}/runs/start`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartRunRequest {
    /// Task to drive; the plan's first task when absent.
    pub task_id: Option<String>,
    /// Lane name; the policy default when absent.
    pub lane: Option<String>,
    /// Budget cap for the run.
    pub budget_cap_usd: Option<f64>,
    /// Acknowledge a stale plan.
    #[serde(default)]
    pub confirm_stale: bool,
    /// Acknowledge a high-risk task.
    #[serde(default)]
    pub confirm_high_risk: bool,
    /// Client-supplied model overrides are never trusted; any value here is
    /// rejected.
    pub model: Option<serde_json::Value>,
}

/// Response of a completed (or paused) start.
#[derive(Debug, Clone, Serialize)]
pub struct StartRunResponse {
    /// The run.
    pub run_id: Uuid,
    /// Final state of this request's drive.
    pub state: RunState,
    /// The task that was driven.
    pub task_id: String,
    /// Charge incurred by this drive.
    pub cost_usd: f64,
}

/// Body of `POST /v1/runs/{id}/verify`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyRequest {
    /// Override the effective verify mode.
    pub mode: Option<VerifyMode>,
}

/// Result of a verify pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    /// Effective mode that ran.
    pub mode: VerifyMode,
    /// Whether every gate exited 0.
    pub passed: bool,
    /// Per-gate outcomes.
    pub gates: Vec<GateOutcome>,
    /// Markdown report path.
    pub report_path: String,
}

// ---------------------------------------------------------------------------
// Event helpers
// ---------------------------------------------------------------------------

impl AppState {
    fn event(&self, identity: &Identity, event_type: LedgerEventType) -> LedgerEvent {
        LedgerEvent::new(event_type, identity.org_id.clone(), identity.user_id.clone())
    }

    async fn stage(&self, identity: &Identity, run: &Run, task_id: &str, stage: TaskStage) {
        self.hub
            .emit(StreamEvent::TaskStage {
                run_id: run.id,
                task_id: task_id.to_string(),
                stage,
            })
            .await;
        self.ledger(
            self.event(identity, LedgerEventType::TaskStage)
                .with_project(run.project_id)
                .with_run(run.id)
                .with_task(task_id)
                .with_payload(json!({ "stage": stage })),
        )
        .await;
    }

    async fn pause_with_anomaly(&self, identity: &Identity, run: &Run, reason: &str) {
        self.hub
            .emit(StreamEvent::Anomaly {
                run_id: run.id,
                reason: reason.to_string(),
                action: "paused".to_string(),
            })
            .await;
        self.ledger(
            self.event(identity, LedgerEventType::AnomalyDetected)
                .with_project(run.project_id)
                .with_run(run.id)
                .with_payload(json!({ "reason": reason, "action": "paused" })),
        )
        .await;
        if let Err(err) = self.store.update_run_state(run.id, RunState::Paused).await {
            warn!(run_id = %run.id, error = %err, "failed to pause run");
        }
        self.ledger(
            self.event(identity, LedgerEventType::RunPaused)
                .with_project(run.project_id)
                .with_run(run.id)
                .with_payload(json!({ "reason": reason })),
        )
        .await;
    }
}

// ---------------------------------------------------------------------------
// High-risk evaluation
// ---------------------------------------------------------------------------

/// Whether starting this task needs an explicit high-risk confirmation.
pub fn high_risk_required(config: &trc_config::CoreConfig, task: &PlanTask) -> bool {
    if task.risk == RiskLevel::High {
        return true;
    }
    if config
        .risk_policy
        .rules(task.risk.as_str())
        .is_some_and(|r| r.require_confirmation)
    {
        return true;
    }
    if config
        .risk_policy
        .high_risk_task_types
        .iter()
        .any(|t| t == &task.task_type)
    {
        return true;
    }
    let patterns = &config.risk_policy.high_risk_path_patterns;
    if patterns.is_empty() {
        return false;
    }
    match globset_for(patterns) {
        Some(set) => task
            .scope
            .paths
            .iter()
            .any(|path| set.is_match(path.as_str())),
        None => false,
    }
}

fn globset_for(patterns: &[String]) -> Option<globset::GlobSet> {
    let mut builder = globset::GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(globset::Glob::new(pattern).ok()?);
    }
    builder.build().ok()
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

/// Drive one task end-to-end. See the stage pipeline in the crate docs.
pub async fn start_run(
    state: &Arc<AppState>,
    identity: &Identity,
    project_id: Uuid,
    body: StartRunRequest,
) -> Result<StartRunResponse, ApiError> {
    let Some(project) = state.store.project(project_id).await? else {
        return Err(ApiError::not_found("project not found"));
    };

    // 1. An approved plan must exist.
    let Some(plan) = state.store.approved_plan(project_id).await? else {
        return Err(ApiError::validation("no approved plan for project"));
    };

    // 2. Staleness against the live repo state.
    let session = state.registry.session(project_id).await;
    let staleness = staleness_of(&plan, session.as_deref()).await;
    if staleness.stale && !body.confirm_stale {
        return Err(ApiError::conflict("plan_stale", "approved plan is stale")
            .with_details(json!({ "stale_reason": staleness.reason })));
    }

    // 3. Client model overrides are never trusted.
    if body.model.is_some() {
        return Err(ApiError::validation("model overrides are not accepted"));
    }

    // 4. Task selection and high-risk confirmation.
    let task = match &body.task_id {
        Some(task_id) => plan
            .tasks_document
            .find_task(task_id)
            .ok_or_else(|| ApiError::validation(format!("unknown task: {task_id}")))?,
        None => plan
            .tasks_document
            .first_task()
            .ok_or_else(|| ApiError::validation("plan has no tasks"))?,
    }
    .clone();
    if !state
        .config
        .model_stack
        .task_type_map
        .contains_key(&task.task_type)
    {
        return Err(ApiError::validation(format!(
            "task type '{}' is not in the model stack",
            task.task_type
        )));
    }
    if high_risk_required(&state.config, &task) && !body.confirm_high_risk {
        return Err(ApiError::conflict(
            "high_risk_confirmation_required",
            "task requires high-risk confirmation",
        ));
    }

    let lane_name = body
        .lane
        .clone()
        .unwrap_or_else(|| state.config.lane_policy.default_lane.clone());
    let Some((_, lane)) = state.config.lane_policy.lane(Some(&lane_name)) else {
        return Err(ApiError::validation(format!("unknown lane: {lane_name}")));
    };
    let lane = lane.clone();

    // 5. Insert the run, then announce it.
    let now = Utc::now();
    let run = Run {
        id: Uuid::new_v4(),
        project_id,
        plan_id: plan.id,
        state: RunState::Running,
        lane: lane_name.clone(),
        risk: task.risk,
        budget_cap_usd: body.budget_cap_usd,
        cost_to_date: 0.0,
        current_task_id: Some(task.id.clone()),
        created_at: now,
        updated_at: now,
    };
    state.store.insert_run(&run).await?;
    let mut exec = TaskExecution {
        id: Uuid::new_v4(),
        run_id: run.id,
        plan_task_id: task.id.clone(),
        state: TaskExecState::Running,
        router_decision: None,
        patch_path: None,
        patch_text: None,
        tokens_in: 0,
        tokens_out: 0,
        cost_usd: 0.0,
        created_at: now,
    };
    state.store.insert_task_execution(&exec).await?;

    state
        .hub
        .emit(StreamEvent::RunBanner {
            run_id: run.id,
            plan_id: plan.id,
            lane: lane_name.clone(),
            risk: task.risk.as_str().to_string(),
            task_id: task.id.clone(),
            budget_cap_usd: body.budget_cap_usd,
        })
        .await;
    state
        .ledger(
            state
                .event(identity, LedgerEventType::RunStarted)
                .with_project(project_id)
                .with_plan(plan.id)
                .with_run(run.id)
                .with_task(&task.id)
                .with_payload(json!({
                    "lane": lane_name,
                    "risk": task.risk.as_str(),
                    "budget_cap_usd": body.budget_cap_usd,
                    "repo": project.repo_name,
                })),
        )
        .await;

    // 6. PREPARE_CONTEXT: build, enrich, persist the pack.
    state.stage(identity, &run, &task.id, TaskStage::PrepareContext).await;
    let signals = match session.as_deref() {
        Some(session) => {
            trc_context::gather_signals(session, last_verify_failure(state, project_id).await)
                .await
        }
        None => Default::default(),
    };
    let budgets = PackBudgets {
        max_lines: (4000.0 * lane.context_factor) as u32,
        ..PackBudgets::default()
    };
    let mut pack = trc_context::build(
        run.id,
        &task.id,
        project_id,
        budgets,
        &task.scope.paths,
        signals,
    );
    if let Some(session) = session.as_deref() {
        trc_context::enrich(&mut pack, session).await;
    }
    state.store.save_pack(&pack).await?;
    state
        .ledger(
            state
                .event(identity, LedgerEventType::ContextPackBuilt)
                .with_project(project_id)
                .with_run(run.id)
                .with_task(&task.id)
                .with_payload(json!({
                    "pack_id": pack.pack_id,
                    "files": pack.file_entries.len(),
                    "redaction_stats": pack.redaction_stats,
                })),
        )
        .await;

    // 7. Route.
    let decision = trc_router::decide(
        &task.task_type,
        &lane_name,
        task.risk,
        run.budget_remaining(),
        u64::from(budgets.max_lines),
        &state.config.model_stack,
        &state.config.lane_policy,
        &state.config.risk_policy,
        &state.config.pricing,
    )
    .map_err(|e| ApiError::validation(e.to_string()))?;
    exec.router_decision = Some(decision.clone());
    state.store.update_task_execution(&exec).await?;
    state
        .ledger(
            state
                .event(identity, LedgerEventType::RouterDecision)
                .with_project(project_id)
                .with_run(run.id)
                .with_task(&task.id)
                .with_payload(serde_json::to_value(&decision).unwrap_or_default()),
        )
        .await;

    if decision.budget_violation {
        state
            .pause_with_anomaly(identity, &run, "budget cap would be exceeded")
            .await;
        return Ok(StartRunResponse {
            run_id: run.id,
            state: RunState::Paused,
            task_id: task.id,
            cost_usd: 0.0,
        });
    }

    // 8. Resolve a provider through the fallback chain.
    let resolved = match state.factory.resolve(&decision.selected_model).await {
        Ok(resolved) => resolved,
        Err(err) => {
            warn!(error = %err, "provider resolution failed");
            state
                .pause_with_anomaly(identity, &run, "provider unavailable")
                .await;
            return Err(ApiError::service_unavailable("no provider available"));
        }
    };

    // 9. DESIGN and the LLM call.
    state
        .hub
        .emit(StreamEvent::TaskStarted {
            run_id: run.id,
            task_id: task.id.clone(),
            title: task.title.clone(),
        })
        .await;
    state
        .ledger(
            state
                .event(identity, LedgerEventType::TaskStarted)
                .with_project(project_id)
                .with_run(run.id)
                .with_task(&task.id)
                .with_payload(json!({ "title": task.title })),
        )
        .await;
    state.stage(identity, &run, &task.id, TaskStage::Design).await;
    state
        .ledger(
            state
                .event(identity, LedgerEventType::LlmCallStarted)
                .with_project(project_id)
                .with_run(run.id)
                .with_task(&task.id)
                .with_payload(json!({
                    "model": resolved.selected_model,
                    "used_fallback": resolved.used_fallback,
                })),
        )
        .await;

    // 10. Generate the patch.
    let instructions = render_instructions(&task);
    let context = trc_context::render_for_prompt(&pack);
    let patch = match resolved
        .provider
        .generate_patch(
            &resolved.selected_model,
            &task.id,
            Some(&instructions),
            Some(&context),
        )
        .await
    {
        Ok(patch) => patch,
        Err(err) => {
            warn!(error = %err, "patch generation failed");
            exec.state = TaskExecState::Failed;
            let _ = state.store.update_task_execution(&exec).await;
            state
                .pause_with_anomaly(identity, &run, "provider unavailable")
                .await;
            return Err(provider_error_to_api(err));
        }
    };

    let (tokens_in, tokens_out) = match patch.usage {
        Some(usage) => (usage.tokens_in, usage.tokens_out),
        None => {
            let half = decision.expected_tokens / 2;
            (half, decision.expected_tokens - half)
        }
    };
    let credits_remaining = state.billing.credit_balance(&identity.org_id);
    let cost = trc_cost::calculate_cost(
        tokens_in,
        tokens_out,
        &resolved.selected_model,
        state.config.model_stack.tier_of(&resolved.selected_model),
        &state.config.pricing,
        &identity.billing_plan,
        credits_remaining,
    );
    if cost.credits_applied_usd > 0.0 {
        state.billing.record_transaction(
            &identity.org_id,
            trc_core::external::CreditTransaction {
                id: Uuid::new_v4().to_string(),
                amount_usd: -cost.credits_applied_usd,
                description: format!("run {} task {}", run.id, task.id),
            },
        );
    }
    state.store.add_run_cost(run.id, cost.our_charge_usd).await?;
    state
        .ledger(
            state
                .event(identity, LedgerEventType::LlmCallFinished)
                .with_project(project_id)
                .with_run(run.id)
                .with_task(&task.id)
                .with_payload(json!({
                    "model": resolved.selected_model,
                    "task_type": task.task_type,
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

    let patch_path = state
        .artifacts
        .write(run.id, "patch.diff", &patch.patch_text)
        .await
        .map_err(|e| ApiError::internal(format!("persist patch: {e}")))?;
    state
        .ledger(
            state
                .event(identity, LedgerEventType::PatchProduced)
                .with_project(project_id)
                .with_run(run.id)
                .with_task(&task.id)
                .with_payload(json!({
                    "patch_path": patch_path.display().to_string(),
                    "changed_files": patch.changed_files,
                })),
        )
        .await;
    state.stage(identity, &run, &task.id, TaskStage::ImplementPatch).await;

    exec.patch_path = Some(patch_path.display().to_string());
    exec.patch_text = Some(patch.patch_text.clone());
    exec.tokens_in = tokens_in;
    exec.tokens_out = tokens_out;
    exec.cost_usd = cost.our_charge_usd;
    state.store.update_task_execution(&exec).await?;

    // 11. The task result, verification still pending.
    state
        .hub
        .emit(StreamEvent::TaskResult {
            run_id: run.id,
            task_id: task.id.clone(),
            patch_text: patch.patch_text.clone(),
            changed_files: patch.changed_files.clone(),
            tokens_in,
            tokens_out,
            cost: cost.clone(),
            verify_status: "pending".to_string(),
        })
        .await;

    // 12. Remaining stages and completion.
    state.stage(identity, &run, &task.id, TaskStage::SelfReview).await;
    state.stage(identity, &run, &task.id, TaskStage::ProposeApply).await;
    exec.state = TaskExecState::Done;
    state.store.update_task_execution(&exec).await?;
    state
        .ledger(
            state
                .event(identity, LedgerEventType::TaskCompleted)
                .with_project(project_id)
                .with_run(run.id)
                .with_task(&task.id)
                .with_payload(json!({ "cost_usd": cost.our_charge_usd })),
        )
        .await;

    // 13. Session stats, then close out the run.
    let events = state.store.events_for_run(run.id).await?;
    let final_run = state.store.run(run.id).await?.unwrap_or(run.clone());
    let stats = trc_cost::session_stats(
        &final_run,
        plan.tasks_document.task_count() as u64,
        state.store.completed_tasks(run.id).await?,
        &events,
    );
    state
        .hub
        .emit(StreamEvent::SessionStats {
            run_id: run.id,
            stats: stats.clone(),
        })
        .await;
    state
        .ledger(
            state
                .event(identity, LedgerEventType::SessionStats)
                .with_project(project_id)
                .with_run(run.id)
                .with_payload(serde_json::to_value(&stats).unwrap_or_default()),
        )
        .await;

    state.store.update_run_state(run.id, RunState::Done).await?;
    state
        .ledger(
            state
                .event(identity, LedgerEventType::RunCompleted)
                .with_project(project_id)
                .with_run(run.id)
                .with_payload(json!({ "cost_to_date": final_run.cost_to_date })),
        )
        .await;
    state
        .ledger(
            state
                .event(identity, LedgerEventType::BillingPosted)
                .with_project(project_id)
                .with_run(run.id)
                .with_payload(json!({
                    "our_charge_usd": cost.our_charge_usd,
                    "provider_cost_usd": cost.provider_cost_usd,
                    "credits_applied_usd": cost.credits_applied_usd,
                })),
        )
        .await;

    info!(run_id = %run.id, task_id = %task.id, "run complete");
    Ok(StartRunResponse {
        run_id: run.id,
        state: RunState::Done,
        task_id: task.id,
        cost_usd: cost.our_charge_usd,
    })
}

async fn staleness_of(plan: &Plan, session: Option<&RunnerSession>) -> PlanStaleness {
    match session {
        Some(session) => {
            let repo = probe_repo_state(session).await;
            PlanStaleness::evaluate(
                plan.approved_repo_commit.as_deref(),
                repo.head.as_deref(),
                repo.dirty,
            )
        }
        None => PlanStaleness::evaluate(plan.approved_repo_commit.as_deref(), None, None),
    }
}

async fn last_verify_failure(state: &AppState, project_id: Uuid) -> Option<String> {
    let events = state
        .store
        .list_by_type(Some(project_id), LedgerEventType::VerifyFinished, 1)
        .await
        .ok()?;
    let event = events.first()?;
    if event.payload["passed"].as_bool() == Some(false) {
        event.payload["summary"].as_str().map(str::to_string)
    } else {
        None
    }
}

fn render_instructions(task: &PlanTask) -> String {
    let mut out = format!("{}\n", task.title);
    if let Some(execution) = &task.execution {
        out.push_str(execution);
        out.push('\n');
    }
    if !task.acceptance.is_empty() {
        out.push_str("Acceptance:\n");
        for item in &task.acceptance {
            out.push_str(&format!("- {item}\n"));
        }
    }
    trc_redact::redact(&out).text
}

fn provider_error_to_api(err: ProviderError) -> ApiError {
    match &err {
        ProviderError::RateLimit { .. } => ApiError::service_unavailable("provider rate limited"),
        ProviderError::ModelNotFound(model) => {
            ApiError::service_unavailable(format!("model unavailable: {model}"))
        }
        _ => ApiError::service_unavailable(err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Verify
// ---------------------------------------------------------------------------

/// Execute the verify gates for a run through its runner session.
pub async fn verify_run(
    state: &Arc<AppState>,
    identity: &Identity,
    run_id: Uuid,
    request: VerifyRequest,
) -> Result<VerifyReport, ApiError> {
    let Some(run) = state.store.run(run_id).await? else {
        return Err(ApiError::not_found("run not found"));
    };
    let Some(session) = state.registry.session(run.project_id).await else {
        return Err(ApiError::conflict(
            "runner_not_connected",
            "no runner session for project",
        ));
    };

    let task_id = run
        .current_task_id
        .clone()
        .unwrap_or_else(|| "task-001".to_string());
    let lane_mode = state
        .config
        .lane_policy
        .lane(Some(&run.lane))
        .map(|(_, lane)| lane.verify_mode)
        .unwrap_or_default();
    let risk_mode = state
        .config
        .risk_policy
        .rules(run.risk.as_str())
        .map(|r| r.verify_strictness)
        .unwrap_or_default();
    let mode = request.mode.unwrap_or_else(|| lane_mode.max(risk_mode));

    state
        .ledger(
            state
                .event(identity, LedgerEventType::VerifyStarted)
                .with_project(run.project_id)
                .with_run(run.id)
                .with_task(&task_id)
                .with_payload(json!({ "mode": mode })),
        )
        .await;
    state.stage(identity, &run, &task_id, TaskStage::LocalVerify).await;

    let mut gates = Vec::new();
    for (gate, command) in state.config.verify_gates.gates_for(mode) {
        let class = state.rules.classify(&command);
        state
            .ledger(
                state
                    .event(identity, LedgerEventType::RunnerCmdStarted)
                    .with_project(run.project_id)
                    .with_run(run.id)
                    .with_task(&task_id)
                    .with_payload(json!({
                        "gate": gate,
                        "command": command,
                        "permission_class": class,
                    })),
            )
            .await;

        let result = session
            .exec(&command, class, None)
            .await
            .map_err(|e| ApiError::conflict("runner_not_connected", e.to_string()))?;
        let blocked = trc_bridge::blocked_reason(&result);

        state
            .ledger(
                state
                    .event(identity, LedgerEventType::RunnerCmdFinished)
                    .with_project(run.project_id)
                    .with_run(run.id)
                    .with_task(&task_id)
                    .with_payload(json!({
                        "gate": gate,
                        "command": command,
                        "exit_code": result.exit_code,
                        "duration_ms": result.duration_ms,
                    })),
            )
            .await;

        if let Some(reason) = &blocked {
            state
                .ledger(
                    state
                        .event(identity, LedgerEventType::RunnerCmdBlocked)
                        .with_project(run.project_id)
                        .with_run(run.id)
                        .with_task(&task_id)
                        .with_payload(json!({ "command": command, "reason": reason })),
                )
                .await;
            state
                .hub
                .emit(StreamEvent::PermissionDenied {
                    run_id: run.id,
                    command: command.clone(),
                    reason: reason.clone(),
                })
                .await;
        }

        gates.push(GateOutcome {
            gate,
            command,
            exit_code: result.exit_code,
            blocked,
            duration_ms: result.duration_ms,
        });
    }

    let passed = gates.iter().all(GateOutcome::passed);
    let report = render_verify_report(&run, &task_id, mode, passed, &gates);
    let report_path = state
        .artifacts
        .write(
            run.id,
            &format!("verify-{}.md", Utc::now().timestamp_millis()),
            &report,
        )
        .await
        .map_err(|e| ApiError::internal(format!("persist verify report: {e}")))?
        .display()
        .to_string();

    let summary = gates
        .iter()
        .filter(|g| !g.passed())
        .map(|g| format!("{} exited {}", g.gate, g.exit_code))
        .collect::<Vec<_>>()
        .join("; ");
    state
        .hub
        .emit(StreamEvent::VerifyFinished {
            run_id: run.id,
            task_id: task_id.clone(),
            mode,
            passed,
            gates: gates.clone(),
            report_path: report_path.clone(),
        })
        .await;
    state
        .ledger(
            state
                .event(identity, LedgerEventType::VerifyFinished)
                .with_project(run.project_id)
                .with_run(run.id)
                .with_task(&task_id)
                .with_payload(json!({
                    "mode": mode,
                    "passed": passed,
                    "report_path": report_path,
                    "summary": summary,
                })),
        )
        .await;

    Ok(VerifyReport {
        mode,
        passed,
        gates,
        report_path,
    })
}

fn render_verify_report(
    run: &Run,
    task_id: &str,
    mode: VerifyMode,
    passed: bool,
    gates: &[GateOutcome],
) -> String {
    let mut out = format!(
        "# Verify report\n\n- run: {}\n- task: {task_id}\n- mode: {}\n- passed: {passed}\n\n| gate | command | exit | blocked |\n|---|---|---|---|\n",
        run.id,
        mode.as_str(),
    );
    for gate in gates {
        out.push_str(&format!(
            "| {} | `{}` | {} | {} |\n",
            gate.gate,
            gate.command,
            gate.exit_code,
            gate.blocked.as_deref().unwrap_or("-"),
        ));
    }
    trc_redact::redact(&out).text
}
