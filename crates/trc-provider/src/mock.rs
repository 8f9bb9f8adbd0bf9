//! Deterministic mock provider.
//!
//! Selected by `TRCODER_USE_MOCK_PROVIDER=1`. Same inputs always produce the
//! same completion, patch, and usage, so end-to-end tests can assert on
//! ledger numbers.

use crate::{
    changed_files_of, ChatCompletion, ChatRequest, PatchResult, Provider, ProviderError,
    TokenUsage,
};
use async_trait::async_trait;

/// Environment variable that switches the factory onto the mock provider.
pub const MOCK_SWITCH_ENV: &str = "TRCODER_USE_MOCK_PROVIDER";

/// The deterministic mock.
#[derive(Debug, Clone, Default)]
pub struct MockProvider;

impl MockProvider {
    /// Create the mock.
    pub fn new() -> Self {
        Self
    }

    /// Whether the environment selects the mock provider.
    pub fn enabled_by_env() -> bool {
        std::env::var(MOCK_SWITCH_ENV).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
    }

    fn estimate_tokens(text: &str) -> u64 {
        // Four characters per token, floor one.
        (text.chars().count() as u64 / 4).max(1)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion, ProviderError> {
        let prompt: String = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let text = format!(
            "[mock:{model}] acknowledged {n} message(s), {chars} chars of prompt",
            model = request.model,
            n = request.messages.len(),
            chars = prompt.chars().count(),
        );
        let usage = TokenUsage {
            tokens_in: Self::estimate_tokens(&prompt),
            tokens_out: Self::estimate_tokens(&text),
        };
        Ok(ChatCompletion {
            model: request.model,
            text,
            usage: Some(usage),
        })
    }

    async fn generate_patch(
        &self,
        model: &str,
        task_id: &str,
        instructions: Option<&str>,
        context: Option<&str>,
    ) -> Result<PatchResult, ProviderError> {
        let note = instructions.unwrap_or("no instructions");
        let patch_text = format!(
            "--- a/TASKS.md\n\
             +++ b/TASKS.md\n\
             @@ -1,1 +1,2 @@\n \
             # Tasks\n\
             +- [{task_id}] {note}\n"
        );
        let prompt_len = note.len() + context.map_or(0, str::len);
        let usage = TokenUsage {
            tokens_in: Self::estimate_tokens(&"x".repeat(prompt_len.max(4))),
            tokens_out: Self::estimate_tokens(&patch_text),
        };
        let _ = model;
        Ok(PatchResult {
            changed_files: changed_files_of(&patch_text),
            patch_text,
            usage: Some(usage),
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
