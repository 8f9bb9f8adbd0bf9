//! Configuration loading, validation, and defaults for the TRCODER control
//! plane.
//!
//! The config root holds six documents: the model stack (JSON) and the lane,
//! risk, pricing, permission, and verify-gate policies (YAML). [`CoreConfig`]
//! loads and cross-validates all of them, producing hard
//! [`ConfigError::ValidationError`]s and advisory [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use trc_core::{ModelTier, VerifyMode};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// A file could not be parsed.
    #[error("failed to parse {path}: {reason}")]
    ParseError {
        /// File that failed.
        path: String,
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Cross-validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A model has pricing but nothing routes to it.
    UnroutedModel {
        /// The model name.
        model: String,
    },
    /// A model has no fallback chain.
    NoFallbackChain {
        /// The model name.
        model: String,
    },
    /// A permission list is empty, so the default class applies everywhere.
    EmptyPermissionList {
        /// Which list (`allow`, `ask`, `deny`).
        list: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::UnroutedModel { model } => {
                write!(f, "model '{model}' is priced but never routed to")
            }
            ConfigWarning::NoFallbackChain { model } => {
                write!(f, "model '{model}' has no fallback chain")
            }
            ConfigWarning::EmptyPermissionList { list } => {
                write!(f, "permission list '{list}' is empty")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Model stack
// ---------------------------------------------------------------------------

/// Route for one task type: the model to use and the token base for the
/// estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskTypeRoute {
    /// Logical model name.
    pub model: String,
    /// Base token estimate before lane and risk factors.
    pub base_tokens: u64,
}

/// The model stack: routing table, fallback chains, and tier assignments.
///
/// Loaded from `model-stack.v2.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelStack {
    /// Model used when no route matches.
    pub default_model: String,
    /// Task type → route.
    pub task_type_map: BTreeMap<String, TaskTypeRoute>,
    /// Logical model → ordered fallback models.
    #[serde(default)]
    pub fallback_chains: BTreeMap<String, Vec<String>>,
    /// Logical model → pricing tier.
    pub tiers: BTreeMap<String, ModelTier>,
    /// Logical model → provider name (`openai`, `anthropic`, `google`,
    /// `mock`).
    pub providers: BTreeMap<String, String>,
}

impl ModelStack {
    /// The tier of a model, defaulting to `standard` for unknown models.
    pub fn tier_of(&self, model: &str) -> ModelTier {
        self.tiers.get(model).copied().unwrap_or(ModelTier::Standard)
    }

    /// The fallback chain for a model, without the model itself.
    pub fn chain_for(&self, model: &str) -> Vec<String> {
        self.fallback_chains.get(model).cloned().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Lane policy
// ---------------------------------------------------------------------------

/// One execution lane: speed vs. balanced vs. quality vs. cost-saver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Lane {
    /// Task-type → model overrides taking precedence over the stack map.
    #[serde(default)]
    pub model_overrides: BTreeMap<String, String>,
    /// Whether this lane prefers cheaper models when risk allows.
    #[serde(default)]
    pub downgrade_bias: bool,
    /// Verify strictness floor for this lane.
    #[serde(default)]
    pub verify_mode: VerifyMode,
    /// Multiplier applied to the task-type token base.
    pub token_factor: f64,
    /// Context budget multiplier.
    pub context_factor: f64,
    /// Maximum fix-loop iterations.
    pub fix_loop_iterations: u32,
}

/// All configured lanes. Loaded from `lane-policy.v1.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LanePolicy {
    /// Lane used when the caller names none.
    pub default_lane: String,
    /// Lane name → lane.
    pub lanes: BTreeMap<String, Lane>,
}

impl LanePolicy {
    /// Look up a lane, falling back to the default lane.
    pub fn lane<'a>(&'a self, name: Option<&'a str>) -> Option<(&'a str, &'a Lane)> {
        let name = name.unwrap_or(&self.default_lane);
        self.lanes.get(name).map(|l| (name, l))
    }
}

// ---------------------------------------------------------------------------
// Risk policy
// ---------------------------------------------------------------------------

/// Rules for one risk level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RiskRules {
    /// Whether the router may downgrade the selected model.
    pub downgrade_allowed: bool,
    /// Cheapest tier a downgrade may reach.
    pub min_allowed_tier: ModelTier,
    /// Verify strictness floor for this risk level.
    pub verify_strictness: VerifyMode,
    /// Multiplier applied to the token estimate.
    pub token_factor: f64,
    /// Whether starting a task at this level requires explicit confirmation.
    pub require_confirmation: bool,
}

/// Risk policy. Loaded from `risk-policy.v1.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RiskPolicy {
    /// Risk level name (`low`, `standard`, `high`) → rules.
    pub risk_levels: BTreeMap<String, RiskRules>,
    /// Task types that always require high-risk confirmation.
    #[serde(default)]
    pub high_risk_task_types: Vec<String>,
    /// Scope path patterns that trigger high-risk confirmation.
    #[serde(default)]
    pub high_risk_path_patterns: Vec<String>,
}

impl RiskPolicy {
    /// Rules for a risk level name.
    pub fn rules(&self, risk: &str) -> Option<&RiskRules> {
        self.risk_levels.get(risk)
    }
}

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Per-1k-token rates for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelRate {
    /// USD per 1k input tokens.
    pub input_per_1k: f64,
    /// USD per 1k output tokens.
    pub output_per_1k: f64,
}

/// Subscription plan pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanPricing {
    /// Monthly subscription price.
    pub monthly_price_usd: f64,
    /// Invoice floor.
    pub minimum_monthly_charge_usd: f64,
    /// Tier name → pay-as-you-go markup fraction.
    pub payg_markup: BTreeMap<String, f64>,
}

/// Pricing tables. Loaded from `pricing.v1.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PricingConfig {
    /// Model → per-1k rates.
    pub model_pricing_usd_per_1k: BTreeMap<String, ModelRate>,
    /// Plan id → plan pricing.
    pub plans: BTreeMap<String, PlanPricing>,
}

impl PricingConfig {
    /// The rate for a model, if priced.
    pub fn rate(&self, model: &str) -> Option<ModelRate> {
        self.model_pricing_usd_per_1k.get(model).copied()
    }

    /// The markup for a plan and billing tier; 0 when not configured.
    pub fn markup(&self, plan_id: &str, tier: ModelTier) -> f64 {
        self.plans
            .get(plan_id)
            .and_then(|p| p.payg_markup.get(tier.billing_tier().as_str()))
            .copied()
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

/// Command permission glob lists. Loaded from `permissions.defaults.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PermissionConfig {
    /// Commands that run without confirmation.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Commands that require local user confirmation.
    #[serde(default)]
    pub ask: Vec<String>,
    /// Commands that never run.
    #[serde(default)]
    pub deny: Vec<String>,
}

// ---------------------------------------------------------------------------
// Verify gates
// ---------------------------------------------------------------------------

/// The gate list for one verify mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GateMode {
    /// Gate names in execution order.
    pub gates: Vec<String>,
}

/// Verify gate commands and the mode → gate mapping. Loaded from
/// `verify.gates.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VerifyGates {
    /// Gate name → shell command.
    pub commands: BTreeMap<String, String>,
    /// Verify mode name → gates.
    pub modes: BTreeMap<String, GateMode>,
}

impl VerifyGates {
    /// Ordered `(gate, command)` pairs for a verify mode.
    pub fn gates_for(&self, mode: VerifyMode) -> Vec<(String, String)> {
        let Some(gate_mode) = self.modes.get(mode.as_str()) else {
            return Vec::new();
        };
        gate_mode
            .gates
            .iter()
            .filter_map(|g| self.commands.get(g).map(|c| (g.clone(), c.clone())))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// CoreConfig
// ---------------------------------------------------------------------------

/// File names expected under the config root.
pub const MODEL_STACK_FILE: &str = "model-stack.v2.json";
/// Lane policy file name.
pub const LANE_POLICY_FILE: &str = "lane-policy.v1.yaml";
/// Risk policy file name.
pub const RISK_POLICY_FILE: &str = "risk-policy.v1.yaml";
/// Pricing file name.
pub const PRICING_FILE: &str = "pricing.v1.yaml";
/// Permission defaults file name.
pub const PERMISSIONS_FILE: &str = "permissions.defaults.yaml";
/// Verify gates file name.
pub const VERIFY_GATES_FILE: &str = "verify.gates.yaml";

/// Everything the control plane needs to route, price, permit, and verify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CoreConfig {
    /// The model stack.
    pub model_stack: ModelStack,
    /// Lane policy.
    pub lane_policy: LanePolicy,
    /// Risk policy.
    pub risk_policy: RiskPolicy,
    /// Pricing tables.
    pub pricing: PricingConfig,
    /// Command permission defaults.
    pub permissions: PermissionConfig,
    /// Verify gates.
    pub verify_gates: VerifyGates,
}

impl CoreConfig {
    /// Load and cross-validate all six documents from `root`.
    ///
    /// Missing files fall back to the built-in defaults; parse failures are
    /// hard errors.
    pub fn load(root: &Path) -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        let defaults = Self::default();
        let config = Self {
            model_stack: load_json(root, MODEL_STACK_FILE, defaults.model_stack)?,
            lane_policy: load_yaml(root, LANE_POLICY_FILE, defaults.lane_policy)?,
            risk_policy: load_yaml(root, RISK_POLICY_FILE, defaults.risk_policy)?,
            pricing: load_yaml(root, PRICING_FILE, defaults.pricing)?,
            permissions: load_yaml(root, PERMISSIONS_FILE, defaults.permissions)?,
            verify_gates: load_yaml(root, VERIFY_GATES_FILE, defaults.verify_gates)?,
        };
        let warnings = config.validate()?;
        Ok((config, warnings))
    }

    /// Cross-validate the loaded documents, returning advisory warnings or a
    /// [`ConfigError::ValidationError`] listing every hard problem found.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        let mut reasons = Vec::new();
        let mut warnings = Vec::new();
        let stack = &self.model_stack;

        let require_known = |model: &str, context: &str, reasons: &mut Vec<String>| {
            if !stack.tiers.contains_key(model) {
                reasons.push(format!("{context}: model '{model}' has no tier"));
            }
            if !self.pricing.model_pricing_usd_per_1k.contains_key(model) {
                reasons.push(format!("{context}: model '{model}' has no pricing"));
            }
            if !stack.providers.contains_key(model) {
                reasons.push(format!("{context}: model '{model}' has no provider"));
            }
        };

        require_known(&stack.default_model, "default_model", &mut reasons);
        for (task_type, route) in &stack.task_type_map {
            require_known(&route.model, &format!("task_type_map[{task_type}]"), &mut reasons);
            if route.base_tokens == 0 {
                reasons.push(format!(
                    "task_type_map[{task_type}]: base_tokens must be positive"
                ));
            }
        }
        for (model, chain) in &stack.fallback_chains {
            for fallback in chain {
                require_known(fallback, &format!("fallback_chains[{model}]"), &mut reasons);
            }
        }

        if !self.lane_policy.lanes.contains_key(&self.lane_policy.default_lane) {
            reasons.push(format!(
                "default_lane '{}' is not a configured lane",
                self.lane_policy.default_lane
            ));
        }
        for (lane_name, lane) in &self.lane_policy.lanes {
            for (task_type, model) in &lane.model_overrides {
                require_known(
                    model,
                    &format!("lanes[{lane_name}].model_overrides[{task_type}]"),
                    &mut reasons,
                );
            }
            if lane.token_factor <= 0.0 || lane.context_factor <= 0.0 {
                reasons.push(format!("lanes[{lane_name}]: factors must be positive"));
            }
        }

        for level in ["low", "standard", "high"] {
            if !self.risk_policy.risk_levels.contains_key(level) {
                reasons.push(format!("risk_levels is missing '{level}'"));
            }
        }

        for (mode_name, gate_mode) in &self.verify_gates.modes {
            for gate in &gate_mode.gates {
                if !self.verify_gates.commands.contains_key(gate) {
                    reasons.push(format!("verify mode '{mode_name}': unknown gate '{gate}'"));
                }
            }
        }

        if !reasons.is_empty() {
            return Err(ConfigError::ValidationError { reasons });
        }

        let routed: std::collections::BTreeSet<&String> = stack
            .task_type_map
            .values()
            .map(|r| &r.model)
            .chain(stack.fallback_chains.values().flatten())
            .chain(std::iter::once(&stack.default_model))
            .collect();
        for model in self.pricing.model_pricing_usd_per_1k.keys() {
            if !routed.contains(model) {
                warnings.push(ConfigWarning::UnroutedModel {
                    model: model.clone(),
                });
            }
        }
        if stack.chain_for(&stack.default_model).is_empty() {
            warnings.push(ConfigWarning::NoFallbackChain {
                model: stack.default_model.clone(),
            });
        }
        if self.permissions.deny.is_empty() {
            warnings.push(ConfigWarning::EmptyPermissionList {
                list: "deny".into(),
            });
        }

        Ok(warnings)
    }
}

fn load_json<T: serde::de::DeserializeOwned>(
    root: &Path,
    file: &str,
    default: T,
) -> Result<T, ConfigError> {
    let path = root.join(file);
    if !path.exists() {
        return Ok(default);
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn load_yaml<T: serde::de::DeserializeOwned>(
    root: &Path,
    file: &str,
    default: T,
) -> Result<T, ConfigError> {
    let path = root.join(file);
    if !path.exists() {
        return Ok(default);
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_yaml::from_str(&raw).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Built-in defaults
// ---------------------------------------------------------------------------

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            model_stack: default_model_stack(),
            lane_policy: default_lane_policy(),
            risk_policy: default_risk_policy(),
            pricing: default_pricing(),
            permissions: default_permissions(),
            verify_gates: default_verify_gates(),
        }
    }
}

fn default_model_stack() -> ModelStack {
    let mut task_type_map = BTreeMap::new();
    for (task_type, model, base) in [
        ("feature", "claude-sonnet-4", 6000),
        ("bugfix", "gpt-4.1", 4000),
        ("refactor", "claude-sonnet-4", 5000),
        ("test", "gpt-4.1-mini", 3000),
        ("docs", "gpt-4.1-mini", 2000),
        ("chat", "gpt-4.1", 1500),
    ] {
        task_type_map.insert(
            task_type.to_string(),
            TaskTypeRoute {
                model: model.to_string(),
                base_tokens: base,
            },
        );
    }

    let mut fallback_chains = BTreeMap::new();
    fallback_chains.insert(
        "claude-sonnet-4".to_string(),
        vec!["gpt-4.1".to_string(), "gemini-2.5-pro".to_string()],
    );
    fallback_chains.insert(
        "gpt-4.1".to_string(),
        vec!["claude-sonnet-4".to_string(), "gpt-4.1-mini".to_string()],
    );
    fallback_chains.insert("gpt-4.1-mini".to_string(), vec!["gemini-2.5-flash".to_string()]);

    let mut tiers = BTreeMap::new();
    tiers.insert("claude-sonnet-4".to_string(), ModelTier::Premium);
    tiers.insert("claude-opus-4".to_string(), ModelTier::PremiumReasoning);
    tiers.insert("gpt-4.1".to_string(), ModelTier::Premium);
    tiers.insert("gpt-4.1-mini".to_string(), ModelTier::Economy);
    tiers.insert("gemini-2.5-pro".to_string(), ModelTier::Premium);
    tiers.insert("gemini-2.5-flash".to_string(), ModelTier::Economy);

    let mut providers = BTreeMap::new();
    providers.insert("claude-sonnet-4".to_string(), "anthropic".to_string());
    providers.insert("claude-opus-4".to_string(), "anthropic".to_string());
    providers.insert("gpt-4.1".to_string(), "openai".to_string());
    providers.insert("gpt-4.1-mini".to_string(), "openai".to_string());
    providers.insert("gemini-2.5-pro".to_string(), "google".to_string());
    providers.insert("gemini-2.5-flash".to_string(), "google".to_string());

    ModelStack {
        default_model: "gpt-4.1".to_string(),
        task_type_map,
        fallback_chains,
        tiers,
        providers,
    }
}

fn default_lane_policy() -> LanePolicy {
    let mut lanes = BTreeMap::new();
    lanes.insert(
        "speed".to_string(),
        Lane {
            model_overrides: BTreeMap::new(),
            downgrade_bias: true,
            verify_mode: VerifyMode::Targeted,
            token_factor: 0.8,
            context_factor: 0.6,
            fix_loop_iterations: 1,
        },
    );
    lanes.insert(
        "balanced".to_string(),
        Lane {
            model_overrides: BTreeMap::new(),
            downgrade_bias: false,
            verify_mode: VerifyMode::Standard,
            token_factor: 1.0,
            context_factor: 1.0,
            fix_loop_iterations: 2,
        },
    );
    lanes.insert(
        "quality".to_string(),
        Lane {
            model_overrides: BTreeMap::new(),
            downgrade_bias: false,
            verify_mode: VerifyMode::Strict,
            token_factor: 1.4,
            context_factor: 1.5,
            fix_loop_iterations: 3,
        },
    );
    lanes.insert(
        "cost_saver".to_string(),
        Lane {
            model_overrides: BTreeMap::new(),
            downgrade_bias: true,
            verify_mode: VerifyMode::Standard,
            token_factor: 0.7,
            context_factor: 0.7,
            fix_loop_iterations: 1,
        },
    );
    LanePolicy {
        default_lane: "balanced".to_string(),
        lanes,
    }
}

fn default_risk_policy() -> RiskPolicy {
    let mut risk_levels = BTreeMap::new();
    risk_levels.insert(
        "low".to_string(),
        RiskRules {
            downgrade_allowed: true,
            min_allowed_tier: ModelTier::Economy,
            verify_strictness: VerifyMode::Targeted,
            token_factor: 0.9,
            require_confirmation: false,
        },
    );
    risk_levels.insert(
        "standard".to_string(),
        RiskRules {
            downgrade_allowed: true,
            min_allowed_tier: ModelTier::Standard,
            verify_strictness: VerifyMode::Standard,
            token_factor: 1.0,
            require_confirmation: false,
        },
    );
    risk_levels.insert(
        "high".to_string(),
        RiskRules {
            downgrade_allowed: false,
            min_allowed_tier: ModelTier::Premium,
            verify_strictness: VerifyMode::Strict,
            token_factor: 1.3,
            require_confirmation: true,
        },
    );
    RiskPolicy {
        risk_levels,
        high_risk_task_types: vec!["migration".to_string(), "security".to_string()],
        high_risk_path_patterns: vec![
            "**/migrations/**".to_string(),
            "**/auth/**".to_string(),
            "**/*secret*".to_string(),
        ],
    }
}

fn default_pricing() -> PricingConfig {
    let mut model_pricing = BTreeMap::new();
    for (model, input, output) in [
        ("claude-sonnet-4", 0.003, 0.015),
        ("claude-opus-4", 0.015, 0.075),
        ("gpt-4.1", 0.002, 0.008),
        ("gpt-4.1-mini", 0.0004, 0.0016),
        ("gemini-2.5-pro", 0.00125, 0.01),
        ("gemini-2.5-flash", 0.0003, 0.0025),
    ] {
        model_pricing.insert(
            model.to_string(),
            ModelRate {
                input_per_1k: input,
                output_per_1k: output,
            },
        );
    }

    let mut plans = BTreeMap::new();
    let mut payg_markup = BTreeMap::new();
    payg_markup.insert("economy".to_string(), 0.2);
    payg_markup.insert("standard".to_string(), 0.25);
    payg_markup.insert("premium".to_string(), 0.3);
    plans.insert(
        "dev".to_string(),
        PlanPricing {
            monthly_price_usd: 20.0,
            minimum_monthly_charge_usd: 5.0,
            payg_markup,
        },
    );

    PricingConfig {
        model_pricing_usd_per_1k: model_pricing,
        plans,
    }
}

fn default_permissions() -> PermissionConfig {
    PermissionConfig {
        allow: vec![
            "git status*".to_string(),
            "git diff*".to_string(),
            "git log*".to_string(),
            "git rev-parse*".to_string(),
            "git remote get-url*".to_string(),
            "ls*".to_string(),
            "cat *".to_string(),
            "cargo check*".to_string(),
            "cargo test*".to_string(),
            "npm test*".to_string(),
            "pytest*".to_string(),
        ],
        ask: vec![
            "git push*".to_string(),
            "git commit*".to_string(),
            "npm install*".to_string(),
            "cargo install*".to_string(),
        ],
        deny: vec![
            "rm -rf*".to_string(),
            "sudo *".to_string(),
            "git push --force*".to_string(),
            "mkfs*".to_string(),
        ],
    }
}

fn default_verify_gates() -> VerifyGates {
    let mut commands = BTreeMap::new();
    commands.insert("typecheck".to_string(), "cargo check".to_string());
    commands.insert("unit".to_string(), "cargo test".to_string());
    commands.insert("lint".to_string(), "cargo clippy -- -D warnings".to_string());
    commands.insert("format".to_string(), "cargo fmt --check".to_string());

    let mut modes = BTreeMap::new();
    modes.insert(
        "targeted".to_string(),
        GateMode {
            gates: vec!["typecheck".to_string()],
        },
    );
    modes.insert(
        "standard".to_string(),
        GateMode {
            gates: vec!["typecheck".to_string(), "unit".to_string()],
        },
    );
    modes.insert(
        "strict".to_string(),
        GateMode {
            gates: vec![
                "typecheck".to_string(),
                "unit".to_string(),
                "lint".to_string(),
                "format".to_string(),
            ],
        },
    );

    VerifyGates { commands, modes }
}
