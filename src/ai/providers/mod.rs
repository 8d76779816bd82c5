use std::sync::Arc;
use std::time::Duration;

use crate::ai::provider::{LLMProvider, LlmError, Result};
use crate::config::ProviderConfig;

pub mod mock;
pub mod openai_compatible;
pub mod reliable;

pub use mock::MockProvider;
pub use openai_compatible::{OpenAiCompatibleConfig, OpenAiCompatibleProvider};
pub use reliable::ReliableProvider;

/// Builds the `LLMProvider` the rest of the crate talks to, from
/// [`ProviderConfig`]. `"mock"` gets a canned offline provider (used in
/// tests and dry-run-only deployments); anything else is treated as an
/// OpenAI-compatible vendor id.
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create(config: &ProviderConfig, api_key: &str) -> Result<Arc<dyn LLMProvider>> {
        if config.default_id == "mock" {
            return Ok(Arc::new(MockProvider::default()));
        }

        let mut vendor_config = match config.default_id.as_str() {
            "openai" => OpenAiCompatibleConfig::openai(api_key),
            "anthropic" => OpenAiCompatibleConfig::anthropic(api_key),
            "gemini" => OpenAiCompatibleConfig::gemini(api_key),
            "ollama" => OpenAiCompatibleConfig::ollama(),
            other => {
                return Err(LlmError::Fatal(format!("unknown provider id: {other}")));
            }
        };

        if !config.default_model.is_empty() {
            vendor_config = vendor_config.default_model(config.default_model.clone());
        }
        vendor_config = vendor_config
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .max_retries(config.max_retries);

        let provider =
            OpenAiCompatibleProvider::new(vendor_config, config.default_id.clone())?;
        Ok(Arc::new(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_id_builds_mock_provider() {
        let config = ProviderConfig {
            default_id: "mock".to_string(),
            ..Default::default()
        };
        let provider = ProviderFactory::create(&config, "").unwrap();
        assert_eq!(provider.provider_name(), "mock");
    }

    #[test]
    fn unknown_id_is_fatal() {
        let config = ProviderConfig {
            default_id: "not-a-real-vendor".to_string(),
            ..Default::default()
        };
        let result = ProviderFactory::create(&config, "key");
        assert!(matches!(result, Err(LlmError::Fatal(_))));
    }

    #[test]
    fn openai_id_builds_openai_compatible_provider() {
        let config = ProviderConfig {
            default_id: "openai".to_string(),
            default_model: "gpt-4o".to_string(),
            ..Default::default()
        };
        let provider = ProviderFactory::create(&config, "key").unwrap();
        assert_eq!(provider.provider_name(), "openai");
    }
}
