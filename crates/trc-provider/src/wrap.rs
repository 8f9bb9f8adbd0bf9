//! The composed resilience wrapper: token bucket, then circuit breaker, then
//! retry, in that fixed order around an inner [`Provider`].

use crate::{
    breaker::CircuitBreaker, bucket::TokenBucket, retry::RetryConfig, ChatCompletion,
    ChatRequest, PatchResult, Provider, ProviderError,
};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::debug;

/// A [`Provider`] behind the bucket → breaker → retry stack.
pub struct ResilientProvider {
    inner: Arc<dyn Provider>,
    bucket: Arc<TokenBucket>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
}

impl ResilientProvider {
    /// Wrap `inner` with the given mechanisms.
    pub fn new(
        inner: Arc<dyn Provider>,
        bucket: Arc<TokenBucket>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            inner,
            bucket,
            breaker,
            retry,
        }
    }

    async fn execute<'a, T>(
        &'a self,
        op: impl Fn() -> BoxFuture<'a, Result<T, ProviderError>> + Send + Sync,
    ) -> Result<T, ProviderError> {
        self.bucket.acquire().await;
        self.breaker.check()?;

        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Err(err) => {
                    // Rate limits flow up untouched so the factory can fall
                    // back; API failures feed the breaker.
                    if matches!(err, ProviderError::Api { .. }) {
                        self.breaker.record_failure();
                    }
                    if err.is_retryable() && self.retry.allows_retry(attempt) {
                        let delay = self.retry.delay_for(attempt);
                        debug!(
                            provider = self.inner.name(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "retrying provider call"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[async_trait]
impl Provider for ResilientProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion, ProviderError> {
        self.execute(|| self.inner.chat(request.clone())).await
    }

    async fn generate_patch(
        &self,
        model: &str,
        task_id: &str,
        instructions: Option<&str>,
        context: Option<&str>,
    ) -> Result<PatchResult, ProviderError> {
        self.execute(|| self.inner.generate_patch(model, task_id, instructions, context))
            .await
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.execute(|| self.inner.health_check()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails `fail_first` times with the given error, then succeeds.
    struct FlakyProvider {
        calls: AtomicU32,
        fail_first: u32,
        error: ProviderError,
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(self.error.clone());
            }
            Ok(ChatCompletion {
                model: request.model,
                text: "ok".into(),
                usage: None,
            })
        }

        async fn generate_patch(
            &self,
            _model: &str,
            _task_id: &str,
            _instructions: Option<&str>,
            _context: Option<&str>,
        ) -> Result<PatchResult, ProviderError> {
            Err(ProviderError::ModelNotFound("flaky".into()))
        }

        async fn health_check(&self) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn wrapped(fail_first: u32, error: ProviderError, retry: RetryConfig) -> ResilientProvider {
        ResilientProvider::new(
            Arc::new(FlakyProvider {
                calls: AtomicU32::new(0),
                fail_first,
                error,
            }),
            Arc::new(TokenBucket::per_minute(6000)),
            Arc::new(CircuitBreaker::new("flaky", BreakerConfig::default())),
            retry,
        )
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "m".into(),
            messages: vec![],
            max_tokens: None,
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter_factor: 0.0,
        }
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let provider = wrapped(
            2,
            ProviderError::Api {
                message: "503".into(),
                retryable: true,
            },
            fast_retry(),
        );
        let completion = provider.chat(request()).await.unwrap();
        assert_eq!(completion.text, "ok");
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_error() {
        let provider = wrapped(
            10,
            ProviderError::Api {
                message: "503".into(),
                retryable: true,
            },
            fast_retry(),
        );
        let err = provider.chat(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { retryable: true, .. }));
    }

    #[tokio::test]
    async fn rate_limit_is_not_retried() {
        let provider = wrapped(
            1,
            ProviderError::RateLimit {
                retry_after_ms: Some(250),
            },
            fast_retry(),
        );
        let err = provider.chat(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimit { .. }));
    }

    #[tokio::test]
    async fn non_retryable_api_error_fails_once() {
        let provider = wrapped(
            5,
            ProviderError::Api {
                message: "400".into(),
                retryable: false,
            },
            fast_retry(),
        );
        let err = provider.chat(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { retryable: false, .. }));
    }

    #[tokio::test]
    async fn open_breaker_fails_fast() {
        let breaker = Arc::new(CircuitBreaker::new(
            "flaky",
            BreakerConfig {
                failure_threshold: 1,
                recovery_after: Duration::from_secs(60),
                half_open_probes: 1,
            },
        ));
        let provider = ResilientProvider::new(
            Arc::new(FlakyProvider {
                calls: AtomicU32::new(0),
                fail_first: 100,
                error: ProviderError::Api {
                    message: "500".into(),
                    retryable: false,
                },
            }),
            Arc::new(TokenBucket::per_minute(6000)),
            breaker,
            fast_retry(),
        );

        let _ = provider.chat(request()).await;
        let err = provider.chat(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::CircuitOpen(_)));
    }
}
