//! trc-cost
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Every billable number is a pure function of ledger events. Nothing here
//! stores a total; callers re-run these functions over whatever event slice
//! the store hands them, so adjacent ranges always add up exactly.

use chrono::{DateTime, Datelike, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trc_config::{PlanPricing, PricingConfig};
use trc_core::{
    CostBreakdown, LedgerEvent, LedgerEventType, ModelStat, ModelTier, Run, SessionStats,
};

// ---------------------------------------------------------------------------
// Per-call cost
// ---------------------------------------------------------------------------

/// Price one LLM call and apply credits and markup.
///
/// Provider cost is `tokens/1000 · rate` per direction; credits cover as much
/// of it as remain; the markup keyed by the model's billing tier applies to
/// the billable remainder only.
pub fn calculate_cost(
    tokens_in: u64,
    tokens_out: u64,
    model: &str,
    tier: ModelTier,
    pricing: &PricingConfig,
    billing_plan: &str,
    credits_remaining: f64,
) -> CostBreakdown {
    let provider_cost = pricing.rate(model).map_or(0.0, |rate| {
        (tokens_in as f64) / 1000.0 * rate.input_per_1k
            + (tokens_out as f64) / 1000.0 * rate.output_per_1k
    });
    let credits_applied = provider_cost.min(credits_remaining.max(0.0));
    let billable = provider_cost - credits_applied;
    let markup = pricing.markup(billing_plan, tier);
    CostBreakdown {
        provider_cost_usd: provider_cost,
        credits_applied_usd: credits_applied,
        billable_provider_cost_usd: billable,
        markup,
        our_charge_usd: billable * (1.0 + markup),
    }
}

// ---------------------------------------------------------------------------
// Usage aggregation
// ---------------------------------------------------------------------------

/// One `(model, task_type)` usage bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageGroup {
    /// Logical model.
    pub model: String,
    /// Task type of the calls.
    pub task_type: String,
    /// Number of calls.
    pub calls: u64,
    /// Summed provider cost.
    pub provider_cost_usd: f64,
    /// Summed user charge.
    pub charged_usd: f64,
}

/// Usage aggregated from `LLM_CALL_FINISHED` events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    /// Number of LLM calls in range.
    pub calls: u64,
    /// Summed provider cost.
    pub provider_cost_total: f64,
    /// Summed user charges.
    pub charged_total: f64,
    /// Summed credits applied.
    pub credits_used: f64,
    /// Summed billable provider cost.
    pub billable_total: f64,
    /// Every `(model, task_type)` bucket, ordered by key.
    pub groups: Vec<UsageGroup>,
    /// The top 5 buckets by provider cost.
    pub top_drivers: Vec<UsageGroup>,
    /// `charged / billable − 1`, 0 when nothing was billable.
    pub effective_markup: f64,
}

fn f(value: &serde_json::Value, key: &str) -> f64 {
    value[key].as_f64().unwrap_or(0.0)
}

/// Aggregate `LLM_CALL_FINISHED` events into a [`UsageReport`]. Other event
/// types in the slice are ignored.
pub fn compute_usage(events: &[LedgerEvent]) -> UsageReport {
    let mut report = UsageReport::default();
    let mut buckets: BTreeMap<(String, String), UsageGroup> = BTreeMap::new();

    for event in events {
        if event.event_type != LedgerEventType::LlmCallFinished {
            continue;
        }
        let payload = &event.payload;
        let provider_cost = f(payload, "provider_cost_usd");
        let charged = f(payload, "our_charge_usd");
        let credits = f(payload, "credits_applied_usd");
        let billable = f(payload, "billable_provider_cost_usd");

        report.calls += 1;
        report.provider_cost_total += provider_cost;
        report.charged_total += charged;
        report.credits_used += credits;
        report.billable_total += billable;

        let model = payload["model"].as_str().unwrap_or("unknown").to_string();
        let task_type = payload["task_type"].as_str().unwrap_or("unknown").to_string();
        let bucket = buckets
            .entry((model.clone(), task_type.clone()))
            .or_insert_with(|| UsageGroup {
                model,
                task_type,
                calls: 0,
                provider_cost_usd: 0.0,
                charged_usd: 0.0,
            });
        bucket.calls += 1;
        bucket.provider_cost_usd += provider_cost;
        bucket.charged_usd += charged;
    }

    report.groups = buckets.into_values().collect();
    let mut ranked = report.groups.clone();
    ranked.sort_by(|a, b| {
        b.provider_cost_usd
            .total_cmp(&a.provider_cost_usd)
            .then_with(|| a.model.cmp(&b.model))
    });
    ranked.truncate(5);
    report.top_drivers = ranked;

    report.effective_markup = if report.billable_total > 0.0 {
        report.charged_total / report.billable_total - 1.0
    } else {
        0.0
    };
    report
}

// ---------------------------------------------------------------------------
// Time ranges (local boundaries)
// ---------------------------------------------------------------------------

/// The current month's `[start, end)` in local time, as UTC instants.
pub fn month_range_local(now: DateTime<Local>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Local
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now);
    let (next_year, next_month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    let end = Local
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now);
    (start.with_timezone(&Utc), end.with_timezone(&Utc))
}

/// The current local day's `[start, end)` as UTC instants.
pub fn today_range_local(now: DateTime<Local>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Local
        .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
        .single()
        .unwrap_or(now);
    let end = start + chrono::Duration::days(1);
    (start.with_timezone(&Utc), end.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Invoice preview
// ---------------------------------------------------------------------------

/// A previewed invoice: plan price plus usage, floored at the plan minimum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoicePreview {
    /// Subscription price.
    pub monthly_price_usd: f64,
    /// Usage charges before the minimum.
    pub usage_charged_usd: f64,
    /// The plan's usage floor.
    pub minimum_monthly_charge_usd: f64,
    /// What the invoice would total today.
    pub total_due_usd: f64,
}

/// Combine plan pricing with a month's usage.
pub fn invoice_preview(plan: &PlanPricing, usage: &UsageReport) -> InvoicePreview {
    let usage_component = usage.charged_total.max(plan.minimum_monthly_charge_usd);
    InvoicePreview {
        monthly_price_usd: plan.monthly_price_usd,
        usage_charged_usd: usage.charged_total,
        minimum_monthly_charge_usd: plan.minimum_monthly_charge_usd,
        total_due_usd: plan.monthly_price_usd + usage_component,
    }
}

// ---------------------------------------------------------------------------
// Session stats
// ---------------------------------------------------------------------------

/// Compute a run's session stats from its ledger events.
pub fn session_stats(
    run: &Run,
    tasks_total: u64,
    tasks_completed: u64,
    events: &[LedgerEvent],
) -> SessionStats {
    let elapsed_seconds = match (events.first(), events.last()) {
        (Some(first), Some(last)) => (last.ts - first.ts).num_seconds().max(0) as u64,
        _ => 0,
    };

    let mut per_model: BTreeMap<String, ModelStat> = BTreeMap::new();
    let mut cost_to_date = 0.0;
    for event in events {
        if event.event_type != LedgerEventType::LlmCallFinished {
            continue;
        }
        let model = event.payload["model"].as_str().unwrap_or("unknown").to_string();
        let charged = f(&event.payload, "our_charge_usd");
        cost_to_date += charged;
        let stat = per_model.entry(model.clone()).or_insert_with(|| ModelStat {
            model,
            calls: 0,
            provider_cost_usd: 0.0,
            charged_usd: 0.0,
        });
        stat.calls += 1;
        stat.provider_cost_usd += f(&event.payload, "provider_cost_usd");
        stat.charged_usd += charged;
    }

    SessionStats {
        run_id: run.id,
        elapsed_seconds,
        tasks_completed,
        tasks_total,
        cost_to_date,
        budget_remaining: run.budget_cap_usd.map(|cap| (cap - cost_to_date).max(0.0)),
        per_model: per_model.into_values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trc_config::CoreConfig;

    fn call_event(
        model: &str,
        task_type: &str,
        provider: f64,
        credits: f64,
        billable: f64,
        charged: f64,
    ) -> LedgerEvent {
        LedgerEvent::new(LedgerEventType::LlmCallFinished, "org", "user").with_payload(json!({
            "model": model,
            "task_type": task_type,
            "provider_cost_usd": provider,
            "credits_applied_usd": credits,
            "billable_provider_cost_usd": billable,
            "our_charge_usd": charged,
        }))
    }

    #[test]
    fn calculate_cost_applies_credits_then_markup() {
        let pricing = CoreConfig::default().pricing;
        // gpt-4.1: 1000 in × 0.002 + 1000 out × 0.008 = 0.010 provider cost.
        let cost = calculate_cost(
            1000,
            1000,
            "gpt-4.1",
            ModelTier::Premium,
            &pricing,
            "dev",
            0.004,
        );
        assert!((cost.provider_cost_usd - 0.010).abs() < 1e-12);
        assert!((cost.credits_applied_usd - 0.004).abs() < 1e-12);
        assert!((cost.billable_provider_cost_usd - 0.006).abs() < 1e-12);
        assert!((cost.markup - 0.3).abs() < 1e-12);
        assert!((cost.our_charge_usd - 0.006 * 1.3).abs() < 1e-12);
    }

    #[test]
    fn credits_cover_entire_cost() {
        let pricing = CoreConfig::default().pricing;
        let cost = calculate_cost(
            1000,
            1000,
            "gpt-4.1",
            ModelTier::Premium,
            &pricing,
            "dev",
            100.0,
        );
        assert_eq!(cost.billable_provider_cost_usd, 0.0);
        assert_eq!(cost.our_charge_usd, 0.0);
        assert!((cost.credits_applied_usd - 0.010).abs() < 1e-12);
    }

    #[test]
    fn premium_reasoning_billed_as_premium() {
        let pricing = CoreConfig::default().pricing;
        let a = calculate_cost(100, 100, "gpt-4.1", ModelTier::PremiumReasoning, &pricing, "dev", 0.0);
        let b = calculate_cost(100, 100, "gpt-4.1", ModelTier::Premium, &pricing, "dev", 0.0);
        assert_eq!(a.markup, b.markup);
    }

    #[test]
    fn usage_sums_and_groups() {
        let events = vec![
            call_event("gpt-4.1", "bugfix", 1.0, 1.0, 0.0, 0.0),
            call_event("gpt-4.1", "bugfix", 2.0, 0.0, 2.0, 2.6),
            call_event("claude-sonnet-4", "feature", 0.5, 0.0, 0.5, 0.65),
        ];
        let report = compute_usage(&events);
        assert_eq!(report.calls, 3);
        assert!((report.provider_cost_total - 3.5).abs() < 1e-12);
        assert!((report.charged_total - 3.25).abs() < 1e-12);
        assert!((report.credits_used - 1.0).abs() < 1e-12);
        assert_eq!(report.groups.len(), 2);

        let gpt = report
            .groups
            .iter()
            .find(|g| g.model == "gpt-4.1")
            .unwrap();
        assert_eq!(gpt.calls, 2);
        assert!((gpt.provider_cost_usd - 3.0).abs() < 1e-12);

        assert_eq!(report.top_drivers[0].model, "gpt-4.1");
        // charged 3.25 / billable 2.5 − 1 = 0.3.
        assert!((report.effective_markup - 0.3).abs() < 1e-12);
    }

    #[test]
    fn effective_markup_zero_when_nothing_billable() {
        let events = vec![call_event("gpt-4.1", "bugfix", 1.0, 1.0, 0.0, 0.0)];
        let report = compute_usage(&events);
        assert_eq!(report.effective_markup, 0.0);
    }

    #[test]
    fn non_llm_events_are_ignored() {
        let events = vec![
            LedgerEvent::new(LedgerEventType::RunStarted, "org", "user"),
            call_event("gpt-4.1", "bugfix", 1.0, 0.0, 1.0, 1.3),
        ];
        let report = compute_usage(&events);
        assert_eq!(report.calls, 1);
    }

    #[test]
    fn top_drivers_capped_at_five() {
        let events: Vec<LedgerEvent> = (0..8)
            .map(|i| call_event(&format!("model-{i}"), "chat", i as f64, 0.0, i as f64, 0.0))
            .collect();
        let report = compute_usage(&events);
        assert_eq!(report.top_drivers.len(), 5);
        assert_eq!(report.top_drivers[0].model, "model-7");
    }

    #[test]
    fn invoice_enforces_minimum() {
        let plan = &CoreConfig::default().pricing.plans["dev"];
        let light = compute_usage(&[call_event("gpt-4.1", "chat", 0.5, 0.0, 0.5, 0.65)]);
        let preview = invoice_preview(plan, &light);
        // Usage 0.65 is below the 5.0 minimum.
        assert_eq!(preview.total_due_usd, 20.0 + 5.0);

        let heavy = compute_usage(&[call_event("gpt-4.1", "chat", 10.0, 0.0, 10.0, 13.0)]);
        let preview = invoice_preview(plan, &heavy);
        assert_eq!(preview.total_due_usd, 20.0 + 13.0);
    }

    #[test]
    fn month_range_covers_now() {
        let now = Local::now();
        let (start, end) = month_range_local(now);
        let now_utc = now.with_timezone(&Utc);
        assert!(start <= now_utc && now_utc < end);
    }

    #[test]
    fn today_range_is_one_day() {
        let (start, end) = today_range_local(Local::now());
        assert_eq!(end - start, chrono::Duration::days(1));
    }

    #[test]
    fn session_stats_aggregate_per_model() {
        let run = Run {
            id: uuid::Uuid::new_v4(),
            project_id: uuid::Uuid::new_v4(),
            plan_id: uuid::Uuid::new_v4(),
            state: trc_core::RunState::Done,
            lane: "balanced".into(),
            risk: trc_core::RiskLevel::Standard,
            budget_cap_usd: Some(10.0),
            cost_to_date: 0.0,
            current_task_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let mut first = call_event("gpt-4.1", "bugfix", 1.0, 0.0, 1.0, 1.3);
        first.ts = Utc::now() - chrono::Duration::seconds(30);
        let events = vec![first, call_event("gpt-4.1", "bugfix", 1.0, 0.0, 1.0, 1.3)];

        let stats = session_stats(&run, 4, 1, &events);
        assert_eq!(stats.tasks_total, 4);
        assert_eq!(stats.tasks_completed, 1);
        assert!(stats.elapsed_seconds >= 29);
        assert!((stats.cost_to_date - 2.6).abs() < 1e-12);
        assert!((stats.budget_remaining.unwrap() - 7.4).abs() < 1e-12);
        assert_eq!(stats.per_model.len(), 1);
        assert_eq!(stats.per_model[0].calls, 2);
    }
}
