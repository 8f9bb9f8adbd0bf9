//! Provider factory: maps logical models to resilient providers and walks
//! fallback chains on terminal failures.

use crate::http::{AnthropicProvider, GoogleProvider, OpenAiProvider};
use crate::{
    BreakerConfig, ChatCompletion, ChatRequest, CircuitBreaker, MockProvider, Provider,
    ProviderError, ResilientProvider, RetryConfig, TokenBucket,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use trc_config::ModelStack;

/// Per-provider tuning shared by every client of that provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderSettings {
    /// Requests per minute for the token bucket.
    pub rpm: u32,
    /// Retry tuning.
    pub retry: RetryConfig,
    /// Breaker tuning.
    pub breaker: BreakerConfig,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            rpm: 60,
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

/// A resolved `(provider, selected_model, used_fallback)` triple.
#[derive(Clone)]
pub struct ResolvedProvider {
    /// The provider to call.
    pub provider: Arc<dyn Provider>,
    /// The model actually selected (may differ from the requested one).
    pub selected_model: String,
    /// Whether the chain advanced past the requested model.
    pub used_fallback: bool,
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("provider", &self.provider.name())
            .field("selected_model", &self.selected_model)
            .field("used_fallback", &self.used_fallback)
            .finish()
    }
}

/// Owns one resilient client per provider name and the model → provider map.
pub struct ProviderFactory {
    stack: ModelStack,
    clients: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderFactory {
    /// Build clients from environment credentials.
    ///
    /// With `TRCODER_USE_MOCK_PROVIDER=1` every model routes to the
    /// deterministic mock regardless of credentials.
    pub fn from_env(stack: ModelStack, settings: ProviderSettings) -> Self {
        let mut clients: BTreeMap<String, Arc<dyn Provider>> = BTreeMap::new();

        if MockProvider::enabled_by_env() {
            info!("mock provider enabled; all models route to mock");
            for provider_name in stack.providers.values() {
                clients.insert(provider_name.clone(), wrap("mock", MockProvider::new(), settings));
            }
            clients.insert("mock".into(), wrap("mock", MockProvider::new(), settings));
            return Self { stack, clients };
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            clients.insert("openai".into(), wrap("openai", OpenAiProvider::new(key), settings));
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            clients.insert(
                "anthropic".into(),
                wrap("anthropic", AnthropicProvider::new(key), settings),
            );
        }
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            clients.insert("google".into(), wrap("google", GoogleProvider::new(key), settings));
        }

        if clients.is_empty() {
            warn!("no provider credentials found; falling back to the mock provider");
            clients.insert("mock".into(), wrap("mock", MockProvider::new(), settings));
        }

        Self { stack, clients }
    }

    /// Build a factory over explicit clients. Used by tests.
    pub fn with_clients(
        stack: ModelStack,
        clients: BTreeMap<String, Arc<dyn Provider>>,
    ) -> Self {
        Self { stack, clients }
    }

    /// The candidate models for a request: the model itself, then its chain,
    /// deduplicated with self-entries removed from the tail.
    pub fn candidates(&self, model: &str) -> Vec<String> {
        let mut out = vec![model.to_string()];
        for next in self.stack.chain_for(model) {
            if !out.contains(&next) {
                out.push(next);
            }
        }
        out
    }

    fn client_for_model(&self, model: &str) -> Option<Arc<dyn Provider>> {
        let provider_name = self.stack.providers.get(model)?;
        self.clients
            .get(provider_name)
            .or_else(|| self.clients.get("mock"))
            .cloned()
    }

    /// Resolve a live provider for `model`, walking the fallback chain on
    /// terminal failures (auth, model-not-found, circuit-open, exhausted
    /// retries).
    pub async fn resolve(&self, model: &str) -> Result<ResolvedProvider, ProviderError> {
        let mut last_error = ProviderError::ModelNotFound(model.to_string());
        for (index, candidate) in self.candidates(model).into_iter().enumerate() {
            let Some(provider) = self.client_for_model(&candidate) else {
                last_error = ProviderError::ModelNotFound(candidate);
                continue;
            };
            match provider.health_check().await {
                Ok(()) => {
                    return Ok(ResolvedProvider {
                        provider,
                        selected_model: candidate,
                        used_fallback: index > 0,
                    });
                }
                Err(err) if err.is_terminal() => {
                    warn!(model = %candidate, error = %err, "provider unavailable; trying fallback");
                    last_error = err;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_error)
    }

    /// One chat call with fallback across the model chain.
    pub async fn chat_with_fallback(
        &self,
        request: ChatRequest,
    ) -> Result<(ChatCompletion, ResolvedProvider), ProviderError> {
        let mut last_error = ProviderError::ModelNotFound(request.model.clone());
        for (index, candidate) in self.candidates(&request.model).into_iter().enumerate() {
            let Some(provider) = self.client_for_model(&candidate) else {
                last_error = ProviderError::ModelNotFound(candidate);
                continue;
            };
            let mut attempt = request.clone();
            attempt.model = candidate.clone();
            match provider.chat(attempt).await {
                Ok(completion) => {
                    return Ok((
                        completion,
                        ResolvedProvider {
                            provider,
                            selected_model: candidate,
                            used_fallback: index > 0,
                        },
                    ));
                }
                Err(err) if err.is_terminal() || matches!(err, ProviderError::RateLimit { .. }) => {
                    warn!(model = %candidate, error = %err, "chat failed; trying fallback");
                    last_error = err;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_error)
    }
}

fn wrap(
    name: &str,
    provider: impl Provider + 'static,
    settings: ProviderSettings,
) -> Arc<dyn Provider> {
    Arc::new(ResilientProvider::new(
        Arc::new(provider),
        Arc::new(TokenBucket::per_minute(settings.rpm)),
        Arc::new(CircuitBreaker::new(name, settings.breaker)),
        settings.retry,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use trc_config::CoreConfig;

    struct DeadProvider;

    #[async_trait]
    impl Provider for DeadProvider {
        fn name(&self) -> &str {
            "dead"
        }
        async fn chat(&self, _request: ChatRequest) -> Result<ChatCompletion, ProviderError> {
            Err(ProviderError::Auth("no key".into()))
        }
        async fn generate_patch(
            &self,
            _model: &str,
            _task_id: &str,
            _instructions: Option<&str>,
            _context: Option<&str>,
        ) -> Result<crate::PatchResult, ProviderError> {
            Err(ProviderError::Auth("no key".into()))
        }
        async fn health_check(&self) -> Result<(), ProviderError> {
            Err(ProviderError::Auth("no key".into()))
        }
    }

    fn stack() -> ModelStack {
        CoreConfig::default().model_stack
    }

    #[test]
    fn candidates_dedupe_and_keep_head() {
        let factory = ProviderFactory::with_clients(stack(), BTreeMap::new());
        let candidates = factory.candidates("gpt-4.1");
        assert_eq!(candidates[0], "gpt-4.1");
        assert!(candidates.contains(&"claude-sonnet-4".to_string()));
        assert_eq!(
            candidates.iter().filter(|m| *m == "gpt-4.1").count(),
            1,
            "self entries must be removed from the tail"
        );
    }

    #[tokio::test]
    async fn resolve_falls_back_past_dead_provider() {
        let mut clients: BTreeMap<String, Arc<dyn Provider>> = BTreeMap::new();
        clients.insert("openai".into(), Arc::new(DeadProvider));
        clients.insert("anthropic".into(), Arc::new(MockProvider::new()));

        let factory = ProviderFactory::with_clients(stack(), clients);
        // gpt-4.1 (openai, dead) falls back to claude-sonnet-4 (anthropic).
        let resolved = factory.resolve("gpt-4.1").await.unwrap();
        assert!(resolved.used_fallback);
        assert_eq!(resolved.selected_model, "claude-sonnet-4");
    }

    #[tokio::test]
    async fn resolve_fails_when_chain_is_exhausted() {
        let mut clients: BTreeMap<String, Arc<dyn Provider>> = BTreeMap::new();
        for name in ["openai", "anthropic", "google"] {
            clients.insert(name.into(), Arc::new(DeadProvider));
        }
        let factory = ProviderFactory::with_clients(stack(), clients);
        let err = factory.resolve("gpt-4.1").await.unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));
    }

    #[tokio::test]
    async fn chat_with_fallback_reports_selected_model() {
        let mut clients: BTreeMap<String, Arc<dyn Provider>> = BTreeMap::new();
        clients.insert("openai".into(), Arc::new(MockProvider::new()));
        let factory = ProviderFactory::with_clients(stack(), clients);

        let (completion, resolved) = factory
            .chat_with_fallback(ChatRequest {
                model: "gpt-4.1".into(),
                messages: vec![crate::ChatMessage::user("hi")],
                max_tokens: None,
            })
            .await
            .unwrap();
        assert!(!resolved.used_fallback);
        assert_eq!(resolved.selected_model, "gpt-4.1");
        assert!(completion.text.contains("mock"));
    }
}
