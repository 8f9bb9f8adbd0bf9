//! trc-policy
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Command permission classification.
//!
//! Every command that travels to a runner is classified `allow`, `ask`, or
//! `deny` against glob lists. Rule order: `deny` wins, then `ask`, then
//! `allow`; anything unmatched defaults to `ask`. Classification is pure and
//! deterministic — the same command and policy always produce the same class.

use globset::{Glob, GlobSet, GlobSetBuilder};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use trc_config::PermissionConfig;

/// Permission class of a command, ordered least to most restrictive.
///
/// The derived `Ord` gives `Allow < Ask < Deny`, so the permission floor is
/// simply [`Ord::max`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum CommandClass {
    /// Runs without confirmation.
    Allow,
    /// Requires local user confirmation.
    Ask,
    /// Never runs.
    Deny,
}

impl CommandClass {
    /// Stable lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Ask => "ask",
            Self::Deny => "deny",
        }
    }
}

impl std::fmt::Display for CommandClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from compiling a permission policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// A glob pattern failed to compile.
    #[error("invalid permission glob '{pattern}': {reason}")]
    InvalidGlob {
        /// The offending pattern.
        pattern: String,
        /// Compiler detail.
        reason: String,
    },
}

/// Compiled permission rules.
///
/// `*` spans any characters of the command line, including spaces and path
/// separators, so `git push*` matches `git push -u origin main`.
#[derive(Debug, Clone)]
pub struct PermissionRules {
    deny: Option<GlobSet>,
    ask: Option<GlobSet>,
    allow: Option<GlobSet>,
}

impl PermissionRules {
    /// Compile the three glob lists of a [`PermissionConfig`].
    pub fn compile(config: &PermissionConfig) -> Result<Self, PolicyError> {
        Ok(Self {
            deny: build_set(&config.deny)?,
            ask: build_set(&config.ask)?,
            allow: build_set(&config.allow)?,
        })
    }

    /// Classify a command line. `deny` wins over `ask` wins over `allow`;
    /// unmatched commands are `ask`.
    pub fn classify(&self, command: &str) -> CommandClass {
        if matches(&self.deny, command) {
            return CommandClass::Deny;
        }
        if matches(&self.ask, command) {
            return CommandClass::Ask;
        }
        if matches(&self.allow, command) {
            return CommandClass::Allow;
        }
        CommandClass::Ask
    }
}

/// The permission floor: the most restrictive of the server's class and the
/// runner's local class. Never weaker than either side.
pub fn effective_class(server: CommandClass, local: CommandClass) -> CommandClass {
    server.max(local)
}

fn build_set(patterns: &[String]) -> Result<Option<GlobSet>, PolicyError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| PolicyError::InvalidGlob {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }
    let set = builder.build().map_err(|e| PolicyError::InvalidGlob {
        pattern: "<set>".into(),
        reason: e.to_string(),
    })?;
    Ok(Some(set))
}

fn matches(set: &Option<GlobSet>, command: &str) -> bool {
    set.as_ref().is_some_and(|s| s.is_match(command))
}
