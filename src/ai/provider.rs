//! `LLMProvider`: the single-turn completion trait every stage calls through.

use async_trait::async_trait;

use super::types::{CompletionRequest, CompletionResponse};

/// Error returned by an `LLMProvider`.
///
/// The distinction matters to [`super::providers::reliable::ReliableProvider`]:
/// a `Transient` error (timeout, 5xx, connection reset) is worth retrying on
/// the same provider; a `Fatal` one (401, 400, model not found) is not and
/// should fall through to the next provider in the chain immediately.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("transient provider error: {0}")]
    Transient(String),
    #[error("fatal provider error: {0}")]
    Fatal(String),
}

impl LlmError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

/// Sink for per-call token/cost accounting, threaded through the agent
/// runner so every completion updates the owning incident's running cost.
pub trait CostSink: Send + Sync {
    fn record(&self, tokens_in: u64, tokens_out: u64, usd: f64);
}

/// No-op sink for tests and dry runs.
pub struct NullCostSink;

impl CostSink for NullCostSink {
    fn record(&self, _tokens_in: u64, _tokens_out: u64, _usd: f64) {}
}

/// A single-turn, non-streaming LLM completion provider.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Maximum input+output tokens this provider's model supports.
    fn context_limit(&self) -> usize;

    /// Whether this provider's model can be handed tool-call schemas.
    fn supports_tools(&self) -> bool;

    fn provider_name(&self) -> &str;

    /// Optional cheap connectivity check run once at startup.
    async fn warmup(&self) -> Result<()> {
        Ok(())
    }
}
