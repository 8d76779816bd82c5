//! `ReliableProvider` — retry-on-transient + ordered-fallback wrapper around
//! any `LLMProvider`.
//!
//! Retries are only spent on [`LlmError::Transient`] failures; a
//! [`LlmError::Fatal`] (bad API key, malformed request) skips straight to the
//! next provider in the chain instead of burning the retry budget on an
//! error retrying can't fix.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::ai::provider::{LLMProvider, LlmError, Result};
use crate::ai::types::{CompletionRequest, CompletionResponse};

pub struct ReliableProvider {
    primary: Arc<dyn LLMProvider>,
    fallbacks: Vec<Arc<dyn LLMProvider>>,
    max_retries: u32,
    base_delay: Duration,
}

impl ReliableProvider {
    pub fn new(primary: Arc<dyn LLMProvider>) -> Self {
        Self {
            primary,
            fallbacks: vec![],
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    pub fn with_fallback(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.fallbacks.push(provider);
        self
    }

    /// Runs `provider`, retrying on `Transient` errors up to `max_retries`
    /// times with exponential backoff. A `Fatal` error returns immediately.
    async fn run_with_retry(
        &self,
        provider: &Arc<dyn LLMProvider>,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse> {
        let mut last_err: Option<LlmError> = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }
            match provider.complete(request.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(e @ LlmError::Fatal(_)) => return Err(e),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| LlmError::Transient("no attempts made".into())))
    }
}

#[async_trait]
impl LLMProvider for ReliableProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let mut last_err = match self.run_with_retry(&self.primary, &request).await {
            Ok(resp) => return Ok(resp),
            Err(e) => e,
        };

        for fallback in &self.fallbacks {
            match self.run_with_retry(fallback, &request).await {
                Ok(resp) => return Ok(resp),
                Err(e) => last_err = e,
            }
        }

        Err(LlmError::Fatal(format!("all providers failed: {last_err}")))
    }

    fn context_limit(&self) -> usize {
        self.fallbacks
            .iter()
            .map(|f| f.context_limit())
            .fold(self.primary.context_limit(), |min, limit| min.min(limit))
    }

    fn supports_tools(&self) -> bool {
        self.primary.supports_tools() && self.fallbacks.iter().all(|f| f.supports_tools())
    }

    fn provider_name(&self) -> &str {
        self.primary.provider_name()
    }

    async fn warmup(&self) -> Result<()> {
        if let Err(e) = self.primary.warmup().await {
            tracing::warn!(
                "ReliableProvider warmup failed for {}: {e}",
                self.primary.provider_name()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct AlwaysFailProvider {
        name: &'static str,
        fatal: bool,
        call_count: Arc<AtomicU32>,
    }

    impl AlwaysFailProvider {
        fn new(name: &'static str) -> (Self, Arc<AtomicU32>) {
            let count = Arc::new(AtomicU32::new(0));
            (
                Self {
                    name,
                    fatal: false,
                    call_count: count.clone(),
                },
                count,
            )
        }

        fn fatal(name: &'static str) -> (Self, Arc<AtomicU32>) {
            let count = Arc::new(AtomicU32::new(0));
            (
                Self {
                    name,
                    fatal: true,
                    call_count: count.clone(),
                },
                count,
            )
        }
    }

    #[async_trait]
    impl LLMProvider for AlwaysFailProvider {
        async fn complete(&self, _: CompletionRequest) -> Result<CompletionResponse> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if self.fatal {
                Err(LlmError::Fatal(format!("{} failed", self.name)))
            } else {
                Err(LlmError::Transient(format!("{} failed", self.name)))
            }
        }
        fn context_limit(&self) -> usize {
            4096
        }
        fn supports_tools(&self) -> bool {
            false
        }
        fn provider_name(&self) -> &str {
            self.name
        }
    }

    struct AlwaysOkProvider;

    #[async_trait]
    impl LLMProvider for AlwaysOkProvider {
        async fn complete(&self, _: CompletionRequest) -> Result<CompletionResponse> {
            Ok(CompletionResponse {
                content: "ok".to_string(),
                model: "test".to_string(),
                usage: None,
                finish_reason: None,
            })
        }
        fn context_limit(&self) -> usize {
            4096
        }
        fn supports_tools(&self) -> bool {
            false
        }
        fn provider_name(&self) -> &str {
            "always-ok"
        }
    }

    fn dummy_request() -> CompletionRequest {
        CompletionRequest::new("test-model", vec![])
    }

    #[tokio::test]
    async fn retries_on_transient_primary_failure() {
        let (fail_provider, count) = AlwaysFailProvider::new("primary");
        let reliable =
            ReliableProvider::new(Arc::new(fail_provider)).with_retries(2, Duration::from_millis(1));

        let result = reliable.complete(dummy_request()).await;
        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_error_skips_retries() {
        let (fail_provider, count) = AlwaysFailProvider::fatal("primary");
        let reliable =
            ReliableProvider::new(Arc::new(fail_provider)).with_retries(5, Duration::from_millis(1));

        let _ = reliable.complete(dummy_request()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1, "fatal error must not retry");
    }

    #[tokio::test]
    async fn fallback_chain_activated() {
        let (fail_primary, _) = AlwaysFailProvider::new("primary");
        let reliable = ReliableProvider::new(Arc::new(fail_primary))
            .with_retries(0, Duration::from_millis(1))
            .with_fallback(Arc::new(AlwaysOkProvider));

        let result = reliable.complete(dummy_request()).await;
        assert!(result.is_ok());
        assert_eq!(result.unwrap().content, "ok");
    }

    #[tokio::test]
    async fn fatal_still_falls_through_to_fallback() {
        let (fail_primary, count) = AlwaysFailProvider::fatal("primary");
        let reliable = ReliableProvider::new(Arc::new(fail_primary))
            .with_retries(3, Duration::from_millis(1))
            .with_fallback(Arc::new(AlwaysOkProvider));

        let result = reliable.complete(dummy_request()).await;
        assert!(result.is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn max_retries_respected() {
        let (fail_provider, count) = AlwaysFailProvider::new("primary");
        let reliable =
            ReliableProvider::new(Arc::new(fail_provider)).with_retries(1, Duration::from_millis(1));

        let _ = reliable.complete(dummy_request()).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn warmup_failure_does_not_propagate() {
        let (fail_provider, _) = AlwaysFailProvider::new("warmup-fail");
        let reliable =
            ReliableProvider::new(Arc::new(fail_provider)).with_retries(0, Duration::from_millis(1));

        assert!(reliable.warmup().await.is_ok());
    }
}
