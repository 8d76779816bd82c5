//! LLM completion layer: provider trait, retry/fallback wrapper, and the
//! OpenAI-compatible HTTP client used against whatever gateway the operator
//! points at.

pub mod provider;
pub mod providers;
pub mod types;

pub use provider::{CostSink, LLMProvider, LlmError, NullCostSink};
pub use providers::{
    MockProvider, OpenAiCompatibleConfig, OpenAiCompatibleProvider, ProviderFactory,
    ReliableProvider,
};
pub use types::{CompletionRequest, CompletionResponse, Message, MessageRole, TokenUsage};
