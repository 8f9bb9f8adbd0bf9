//! Property tests: the router is a pure function of its inputs.

use proptest::prelude::*;
use trc_config::CoreConfig;
use trc_core::RiskLevel;
use trc_router::decide;

fn risk_strategy() -> impl Strategy<Value = RiskLevel> {
    prop_oneof![
        Just(RiskLevel::Low),
        Just(RiskLevel::Standard),
        Just(RiskLevel::High),
    ]
}

proptest! {
    /// Identical inputs produce bitwise-identical decisions.
    #[test]
    fn decide_is_deterministic(
        task_type in prop_oneof![
            Just("feature"), Just("bugfix"), Just("refactor"),
            Just("test"), Just("docs"), Just("unknown-kind")
        ],
        lane in prop_oneof![
            Just("speed"), Just("balanced"), Just("quality"), Just("cost_saver")
        ],
        risk in risk_strategy(),
        budget in proptest::option::of(0.0f64..10.0),
        context_budget in 100u64..100_000,
    ) {
        let config = CoreConfig::default();
        let run = || decide(
            task_type,
            lane,
            risk,
            budget,
            context_budget,
            &config.model_stack,
            &config.lane_policy,
            &config.risk_policy,
            &config.pricing,
        ).unwrap();

        let a = run();
        let b = run();
        prop_assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );

        // Structural invariants that hold for every decision.
        prop_assert!(!a.selected_model.is_empty());
        prop_assert_eq!(&a.fallback_chain[0], &a.selected_model);
        prop_assert!(a.expected_tokens > 0);
        prop_assert!(a.expected_cost_usd >= 0.0);
        let selfs = a.fallback_chain.iter()
            .filter(|m| **m == a.selected_model)
            .count();
        prop_assert_eq!(selfs, 1);
    }
}
