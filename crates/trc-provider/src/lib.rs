#![doc = include_str!("../README.md")]
//! trc-provider
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Circuit breaker per provider.
pub mod breaker;
/// Token-bucket rate limiter.
pub mod bucket;
/// Provider factory and fallback chains.
pub mod factory;
/// HTTP clients for OpenAI, Anthropic, and Google.
pub mod http;
/// Deterministic mock provider for tests.
pub mod mock;
/// Bounded retry with exponential backoff and jitter.
pub mod retry;
/// The composed bucket → breaker → retry wrapper.
pub mod wrap;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use bucket::TokenBucket;
pub use factory::{ProviderFactory, ProviderSettings, ResolvedProvider};
pub use mock::MockProvider;
pub use retry::RetryConfig;
pub use wrap::ResilientProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Requests and completions
// ---------------------------------------------------------------------------

/// One chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user`, or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// A `user` message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    /// A `system` message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }
}

/// A chat request against a concrete model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Concrete model name.
    pub model: String,
    /// Conversation history, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Output token cap.
    pub max_tokens: Option<u32>,
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens consumed.
    pub tokens_in: u64,
    /// Output tokens produced.
    pub tokens_out: u64,
}

/// A completed chat call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    /// Model that produced the text.
    pub model: String,
    /// Completion text.
    pub text: String,
    /// Provider-reported usage, when available.
    pub usage: Option<TokenUsage>,
}

/// A generated patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchResult {
    /// Unified diff text.
    pub patch_text: String,
    /// Files the patch touches.
    pub changed_files: Vec<String>,
    /// Provider-reported usage, when available.
    pub usage: Option<TokenUsage>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The closed error set of the provider layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The provider API failed. Retryable for 5xx and transport faults.
    #[error("provider error (retryable={retryable}): {message}")]
    Api {
        /// Detail.
        message: String,
        /// Whether the retryer may try again.
        retryable: bool,
    },

    /// HTTP 429. Never retried internally; the factory may fall back instead.
    #[error("rate limited (retry after {retry_after_ms:?} ms)")]
    RateLimit {
        /// Server-suggested wait, when given.
        retry_after_ms: Option<u64>,
    },

    /// Credentials rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The model does not exist on this provider.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The circuit breaker is open for this provider.
    #[error("circuit open for provider '{0}'")]
    CircuitOpen(String),
}

impl ProviderError {
    /// Whether the internal retryer may try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Api { retryable: true, .. })
    }

    /// Whether the factory should move to the next model in the chain.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Auth(_) | Self::ModelNotFound(_) | Self::CircuitOpen(_)
        ) || matches!(self, Self::Api { retryable: true, .. })
    }
}

// ---------------------------------------------------------------------------
// The capability
// ---------------------------------------------------------------------------

/// The uniform capability every concrete provider implements.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name (`openai`, `anthropic`, `google`, `mock`).
    fn name(&self) -> &str;

    /// One chat completion.
    async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion, ProviderError>;

    /// Generate a unified-diff patch for a task.
    async fn generate_patch(
        &self,
        model: &str,
        task_id: &str,
        instructions: Option<&str>,
        context: Option<&str>,
    ) -> Result<PatchResult, ProviderError>;

    /// Cheap reachability probe.
    async fn health_check(&self) -> Result<(), ProviderError>;
}

/// Extract the touched files from a unified diff (`+++ b/<path>` lines).
pub fn changed_files_of(patch: &str) -> Vec<String> {
    let mut files = Vec::new();
    for line in patch.lines() {
        if let Some(path) = line.strip_prefix("+++ b/") {
            let path = path.trim().to_string();
            if !path.is_empty() && !files.contains(&path) {
                files.push(path);
            }
        }
    }
    files
}
