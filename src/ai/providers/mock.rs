//! Deterministic provider for tests and for `provider.default_id = "mock"`,
//! letting the rest of the pipeline run end to end without a network call.

use async_trait::async_trait;

use crate::ai::provider::{LLMProvider, Result};
use crate::ai::types::{CompletionRequest, CompletionResponse};

pub struct MockProvider {
    response: String,
}

impl MockProvider {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("{}")
    }
}

#[async_trait]
impl LLMProvider for MockProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        Ok(CompletionResponse {
            content: self.response.clone(),
            model: request.model,
            usage: None,
            finish_reason: Some("stop".to_string()),
        })
    }

    fn context_limit(&self) -> usize {
        128_000
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_configured_response() {
        let provider = MockProvider::new(r#"{"action":"noop"}"#);
        let resp = provider
            .complete(CompletionRequest::new("mock", vec![]))
            .await
            .unwrap();
        assert_eq!(resp.content, r#"{"action":"noop"}"#);
    }
}
