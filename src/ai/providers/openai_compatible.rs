//! Generic client for any OpenAI-compatible chat completion API: OpenAI
//! itself, Anthropic's OpenAI-shim endpoint, Gemini, Ollama, or any other
//! gateway that speaks the same wire protocol.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::ai::provider::{LLMProvider, LlmError, Result};
use crate::ai::types::{
    CompletionRequest, CompletionResponse, Message as AppMessage, MessageRole, TokenUsage,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// Legacy parameter used by older models and non-OpenAI providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    /// Used by newer OpenAI models in place of `max_tokens`.
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct ChatCompletionResponse {
    id: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    model: String,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Choice {
    message: ApiMessage,
    finish_reason: Option<String>,
    index: u32,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Configuration for an OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    /// Empty for local providers like Ollama.
    pub api_key: String,
    pub base_url: String,
    pub default_model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub extra_headers: HashMap<String, String>,
}

impl Default for OpenAiCompatibleConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: String::new(),
            default_model: String::new(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: MAX_RETRIES,
            extra_headers: HashMap::new(),
        }
    }
}

impl OpenAiCompatibleConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_model(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            default_model: model.into(),
            ..Default::default()
        }
    }

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers = headers;
        self
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::with_model(api_key, "https://api.openai.com/v1", "gpt-4.1")
    }

    pub fn anthropic(api_key: impl Into<String>) -> Self {
        Self::with_model(api_key, "https://api.anthropic.com/v1", "claude-sonnet-4.5")
            .with_header("anthropic-version", "2023-06-01")
    }

    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self::with_model(
            api_key,
            "https://generativelanguage.googleapis.com/v1beta/openai",
            "gemini-2.5-flash",
        )
    }

    /// Local Ollama instance; no API key required.
    pub fn ollama() -> Self {
        Self::with_model("", "http://localhost:11434/v1", "llama3")
    }
}

/// Client speaking the OpenAI chat-completion wire protocol against
/// whichever `base_url` the configuration points at.
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: OpenAiCompatibleConfig,
    provider_name: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiCompatibleConfig, provider_name: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Fatal(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            config,
            provider_name: provider_name.into(),
        })
    }

    fn convert_message(msg: &AppMessage) -> ApiMessage {
        let role = match msg.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        ApiMessage {
            role: role.to_string(),
            content: msg.content.clone(),
        }
    }

    /// OpenAI's o1/o1-mini reasoning models reject `temperature`, `top_p`,
    /// and any token-limit parameter entirely.
    fn build_request(&self, request: &CompletionRequest) -> ChatCompletionRequest {
        let is_openai = self.provider_name == "openai";
        let is_o1_model = request.model.starts_with("o1-") || request.model.starts_with("o1");

        let temperature = if is_openai && is_o1_model {
            None
        } else {
            request.temperature
        };

        let (max_tokens, max_completion_tokens) = if is_openai && is_o1_model {
            (None, None)
        } else if is_openai {
            (None, request.max_tokens)
        } else {
            (request.max_tokens, None)
        };

        let top_p = if is_openai && is_o1_model {
            None
        } else {
            request.top_p
        };

        ChatCompletionRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(Self::convert_message).collect(),
            temperature,
            max_tokens,
            max_completion_tokens,
            top_p,
        }
    }

    fn get_auth_header(&self) -> Option<String> {
        if self.config.api_key.is_empty() {
            None
        } else {
            Some(format!("Bearer {}", self.config.api_key))
        }
    }

    /// Sends the request, retrying 5xx/429 responses with exponential
    /// backoff. A 4xx other than 429 is fatal and returned immediately.
    async fn execute_with_retry(
        &self,
        request_fn: impl Fn() -> Result<reqwest::RequestBuilder>,
    ) -> Result<Response> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(2_u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
            }

            let builder = request_fn()?;
            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
                        let body = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "unknown error".to_string());
                        return Err(LlmError::Fatal(format!(
                            "request failed with status {status}: {body}"
                        )));
                    }

                    last_error = Some(LlmError::Transient(format!(
                        "request failed with status {status}"
                    )));
                }
                Err(e) => {
                    last_error = Some(LlmError::Transient(format!("http request failed: {e}")));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Transient("request failed".into())))
    }
}

#[async_trait]
impl LLMProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let api_request = self.build_request(&request);

        let mut request_builder = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Content-Type", "application/json");

        if let Some(auth) = self.get_auth_header() {
            request_builder = request_builder.header("Authorization", auth);
        }
        for (key, value) in &self.config.extra_headers {
            request_builder = request_builder.header(key, value);
        }

        let response = self
            .execute_with_retry(|| {
                request_builder
                    .try_clone()
                    .ok_or_else(|| LlmError::Fatal("failed to clone request builder".into()))
                    .map(|b| b.json(&api_request))
            })
            .await?;

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transient(format!("failed to parse api response: {e}")))?;

        let choice = api_response
            .choices
            .first()
            .ok_or_else(|| LlmError::Fatal("no choices in api response".into()))?;

        Ok(CompletionResponse {
            content: choice.message.content.clone(),
            model: api_response.model,
            usage: api_response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason: choice.finish_reason.clone(),
        })
    }

    fn context_limit(&self) -> usize {
        128_000
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &str {
        &self.provider_name
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn config_openai() {
        let config = OpenAiCompatibleConfig::openai("test-key");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.default_model, "gpt-4.1");
    }

    #[test]
    fn config_anthropic() {
        let config = OpenAiCompatibleConfig::anthropic("test-key");
        assert_eq!(
            config.extra_headers.get("anthropic-version"),
            Some(&"2023-06-01".to_string())
        );
    }

    #[test]
    fn config_ollama() {
        let config = OpenAiCompatibleConfig::ollama();
        assert_eq!(config.api_key, "");
        assert!(config.extra_headers.is_empty());
    }

    #[test]
    fn config_builder() {
        let config = OpenAiCompatibleConfig::new("key", "https://api.test.com")
            .default_model("test-model")
            .timeout(Duration::from_secs(60))
            .max_retries(5)
            .with_header("X-Custom-Header", "value");

        assert_eq!(config.default_model, "test-model");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.max_retries, 5);
        assert_eq!(
            config.extra_headers.get("X-Custom-Header"),
            Some(&"value".to_string())
        );
    }

    #[test]
    fn message_conversion() {
        let system_msg = AppMessage::system("You are helpful");
        let api_msg = OpenAiCompatibleProvider::convert_message(&system_msg);
        assert_eq!(api_msg.role, "system");

        let assistant_msg = AppMessage::assistant("Hi there");
        let api_msg = OpenAiCompatibleProvider::convert_message(&assistant_msg);
        assert_eq!(api_msg.role, "assistant");
    }

    #[test]
    fn provider_traits() {
        let config = OpenAiCompatibleConfig::anthropic("test-key");
        let provider = OpenAiCompatibleProvider::new(config, "anthropic").unwrap();

        assert_eq!(provider.provider_name(), "anthropic");
        assert!(provider.supports_tools());
        assert_eq!(provider.context_limit(), 128_000);
    }

    #[test]
    fn build_request_strips_params_for_o1_models() {
        let config = OpenAiCompatibleConfig::openai("test-key");
        let provider = OpenAiCompatibleProvider::new(config, "openai").unwrap();

        let request = CompletionRequest::new("o1-preview", vec![AppMessage::user("hi")])
            .with_temperature(0.7)
            .with_max_tokens(1000);

        let api_request = provider.build_request(&request);
        assert_eq!(api_request.temperature, None);
        assert_eq!(api_request.max_tokens, None);
        assert_eq!(api_request.max_completion_tokens, None);
    }

    #[test]
    fn build_request_keeps_params_for_regular_models() {
        let config = OpenAiCompatibleConfig::gemini("test-key");
        let provider = OpenAiCompatibleProvider::new(config, "gemini").unwrap();

        let request = CompletionRequest::new(
            "gemini-2.5-flash",
            vec![AppMessage::system("sys"), AppMessage::user("hi")],
        )
        .with_temperature(0.7)
        .with_max_tokens(1000);

        let api_request = provider.build_request(&request);
        assert_eq!(api_request.messages.len(), 2);
        assert_eq!(api_request.temperature, Some(0.7));
        assert_eq!(api_request.max_tokens, Some(1000));
    }
}
