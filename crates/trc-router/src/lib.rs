//! trc-router
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Deterministic model selection.
//!
//! [`decide`] is a pure function of its inputs: no randomness, no I/O, no
//! clock. Same inputs, same decision, bitwise.

use thiserror::Error;
use trc_config::{Lane, LanePolicy, ModelStack, PricingConfig, RiskPolicy, RiskRules};
use trc_core::{RiskLevel, RouterDecision};

/// Token base used for task types missing from the stack map.
const FALLBACK_BASE_TOKENS: u64 = 4000;

/// Errors from routing.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The lane is not configured.
    #[error("unknown lane: {0}")]
    UnknownLane(String),
    /// The risk level is not configured.
    #[error("unknown risk level: {0}")]
    UnknownRisk(String),
}

/// Deterministic token estimate: task-type base multiplied by the lane and
/// risk factors, integer-rounded.
pub fn estimate_tokens(task_type: &str, lane: &Lane, risk: &RiskRules, stack: &ModelStack) -> u64 {
    let base = stack
        .task_type_map
        .get(task_type)
        .map_or(FALLBACK_BASE_TOKENS, |route| route.base_tokens);
    ((base as f64) * lane.token_factor * risk.token_factor).round() as u64
}

/// Expected cost of `expected_tokens` against the model's per-1k pricing,
/// using the average of the input and output rates.
pub fn expected_cost_usd(model: &str, expected_tokens: u64, pricing: &PricingConfig) -> f64 {
    let Some(rate) = pricing.rate(model) else {
        return 0.0;
    };
    let avg_per_1k = (rate.input_per_1k + rate.output_per_1k) / 2.0;
    (expected_tokens as f64) / 1000.0 * avg_per_1k
}

/// Select a model for `(task_type, lane, risk)` under the configured
/// policies.
#[allow(clippy::too_many_arguments)]
pub fn decide(
    task_type: &str,
    lane_name: &str,
    risk: RiskLevel,
    budget_remaining: Option<f64>,
    context_budget: u64,
    stack: &ModelStack,
    lane_policy: &LanePolicy,
    risk_policy: &RiskPolicy,
    pricing: &PricingConfig,
) -> Result<RouterDecision, RouterError> {
    let Some((_, lane)) = lane_policy.lane(Some(lane_name)) else {
        return Err(RouterError::UnknownLane(lane_name.to_string()));
    };
    let Some(risk_rules) = risk_policy.rules(risk.as_str()) else {
        return Err(RouterError::UnknownRisk(risk.as_str().to_string()));
    };

    let mut reasons = Vec::new();
    let mut constraints = vec![format!("context_budget={context_budget}")];

    // 1. Base model: lane override, then task-type map, then default.
    let mut selected_model = if let Some(model) = lane.model_overrides.get(task_type) {
        reasons.push(format!("lane '{lane_name}' overrides '{task_type}' to '{model}'"));
        model.clone()
    } else if let Some(route) = stack.task_type_map.get(task_type) {
        reasons.push(format!("task type '{task_type}' maps to '{}'", route.model));
        route.model.clone()
    } else {
        reasons.push(format!(
            "no route for '{task_type}'; default '{}'",
            stack.default_model
        ));
        stack.default_model.clone()
    };

    // 2. Downgrade bias, gated by the risk policy.
    let mut downgrade_applied = false;
    if !risk_rules.downgrade_allowed {
        constraints.push(format!("downgrade disabled at {} risk", risk.as_str()));
    } else if lane.downgrade_bias {
        let min_rank = risk_rules.min_allowed_tier.rank();
        let cheapest = stack
            .chain_for(&selected_model)
            .into_iter()
            .chain(std::iter::once(selected_model.clone()))
            .filter(|m| stack.tier_of(m).rank() >= min_rank)
            .min_by(|a, b| {
                let cost_a = expected_cost_usd(a, 1000, pricing);
                let cost_b = expected_cost_usd(b, 1000, pricing);
                cost_a.total_cmp(&cost_b).then_with(|| a.cmp(b))
            });
        if let Some(cheapest) = cheapest {
            if cheapest != selected_model {
                reasons.push(format!(
                    "downgrade bias selects cheaper '{cheapest}' (min tier {})",
                    risk_rules.min_allowed_tier.as_str()
                ));
                selected_model = cheapest;
                downgrade_applied = true;
            }
        }
    }

    // 3-4. Deterministic token and cost estimates.
    let expected_tokens = estimate_tokens(task_type, lane, risk_rules, stack);
    let expected_cost = expected_cost_usd(&selected_model, expected_tokens, pricing);

    // 5. Budget check. The model is kept; the caller pauses the run.
    let budget_violation = match budget_remaining {
        Some(remaining) if expected_cost > remaining => {
            reasons.push(format!(
                "expected cost {expected_cost:.6} exceeds remaining budget {remaining:.6}"
            ));
            true
        }
        _ => false,
    };

    // 6. Selected model first, then its chain with self-entries removed.
    let mut fallback_chain = vec![selected_model.clone()];
    for model in stack.chain_for(&selected_model) {
        if !fallback_chain.contains(&model) {
            fallback_chain.push(model);
        }
    }

    Ok(RouterDecision {
        selected_model,
        reasons,
        expected_tokens,
        expected_cost_usd: expected_cost,
        fallback_chain,
        downgrade_applied,
        budget_violation,
        constraints,
    })
}
