//! Cost breakdowns and session statistics.
//!
//! The math lives in `trc-cost`; these are the shared shapes that travel in
//! ledger payloads and stream events.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Full cost breakdown of one LLM call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CostBreakdown {
    /// What the provider charges us.
    pub provider_cost_usd: f64,
    /// Credits applied against the provider cost.
    pub credits_applied_usd: f64,
    /// Provider cost remaining after credits.
    pub billable_provider_cost_usd: f64,
    /// Markup fraction applied to the billable cost.
    pub markup: f64,
    /// What we charge the user.
    pub our_charge_usd: f64,
}

/// Per-model call statistics inside [`SessionStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelStat {
    /// Logical model name.
    pub model: String,
    /// Number of LLM calls.
    pub calls: u64,
    /// Summed provider cost.
    pub provider_cost_usd: f64,
    /// Summed user charge.
    pub charged_usd: f64,
}

/// Statistics for one run, recomputed from the ledger on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SessionStats {
    /// Run identifier.
    pub run_id: Uuid,
    /// Seconds between the first and last ledger event of the run.
    pub elapsed_seconds: u64,
    /// Tasks completed so far.
    pub tasks_completed: u64,
    /// Total tasks in the plan.
    pub tasks_total: u64,
    /// Summed user charges for the run.
    pub cost_to_date: f64,
    /// Remaining budget under the cap, if one is set.
    pub budget_remaining: Option<f64>,
    /// Per-model statistics, ordered by model name.
    pub per_model: Vec<ModelStat>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakdown_roundtrips() {
        let c = CostBreakdown {
            provider_cost_usd: 2.0,
            credits_applied_usd: 0.5,
            billable_provider_cost_usd: 1.5,
            markup: 0.3,
            our_charge_usd: 1.95,
        };
        let json = serde_json::to_string(&c).unwrap();
        let back: CostBreakdown = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn default_breakdown_is_zeroed() {
        let c = CostBreakdown::default();
        assert_eq!(c.provider_cost_usd, 0.0);
        assert_eq!(c.our_charge_usd, 0.0);
    }
}
