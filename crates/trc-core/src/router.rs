//! The record of "which model, why, expected cost, fallbacks".

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Pricing tier of a logical model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Cheapest tier.
    Economy,
    /// Default tier.
    Standard,
    /// Flagship tier.
    Premium,
    /// Flagship tier with extended reasoning; billed as `premium`.
    PremiumReasoning,
}

impl ModelTier {
    /// Ordering rank; higher is more capable.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Economy => 0,
            Self::Standard => 1,
            Self::Premium => 2,
            Self::PremiumReasoning => 3,
        }
    }

    /// The tier used for markup lookup; `premium_reasoning` bills as
    /// `premium`.
    pub fn billing_tier(&self) -> ModelTier {
        match self {
            Self::PremiumReasoning => Self::Premium,
            other => *other,
        }
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Economy => "economy",
            Self::Standard => "standard",
            Self::Premium => "premium",
            Self::PremiumReasoning => "premium_reasoning",
        }
    }
}

/// The deterministic output of the model router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouterDecision {
    /// The chosen logical model.
    pub selected_model: String,
    /// Human-readable reasons, in evaluation order.
    pub reasons: Vec<String>,
    /// Deterministic token estimate for the call.
    pub expected_tokens: u64,
    /// Expected cost in USD derived from the pricing table.
    pub expected_cost_usd: f64,
    /// Models to try when the selected one fails terminally.
    pub fallback_chain: Vec<String>,
    /// Whether a downgrade replaced the base model.
    pub downgrade_applied: bool,
    /// Whether the expected cost exceeds the remaining budget.
    pub budget_violation: bool,
    /// Constraints that shaped the decision.
    pub constraints: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ranks_ascend() {
        assert!(ModelTier::Economy.rank() < ModelTier::Standard.rank());
        assert!(ModelTier::Standard.rank() < ModelTier::Premium.rank());
        assert!(ModelTier::Premium.rank() < ModelTier::PremiumReasoning.rank());
    }

    #[test]
    fn premium_reasoning_bills_as_premium() {
        assert_eq!(
            ModelTier::PremiumReasoning.billing_tier(),
            ModelTier::Premium
        );
        assert_eq!(ModelTier::Economy.billing_tier(), ModelTier::Economy);
    }

    #[test]
    fn decision_roundtrips() {
        let d = RouterDecision {
            selected_model: "gpt-4.1".into(),
            reasons: vec!["task type map".into()],
            expected_tokens: 4800,
            expected_cost_usd: 0.024,
            fallback_chain: vec!["claude-sonnet".into()],
            downgrade_applied: false,
            budget_violation: false,
            constraints: vec![],
        };
        let json = serde_json::to_string(&d).unwrap();
        let back: RouterDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
