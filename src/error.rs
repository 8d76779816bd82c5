//! Crate-wide error taxonomy.
//!
//! Component-internal traits (the LLM client, memory store, channels) keep a
//! lightweight `Result<T, String>` style. [`SentinelError`] is the typed
//! error surfaced at the pipeline/runner/HTTP boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("bad input: {0}")]
    BadInput(String),

    #[error("bad tool args: {0}")]
    BadArgs(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool execution failed: {0}")]
    ToolExecError(String),

    #[error("approval denied")]
    Denied,

    #[error("approval auto-rejected: {0}")]
    AutoRejected(String),

    #[error("stage budget exceeded")]
    BudgetExceeded,

    #[error("incident deadline reached")]
    Deadline,

    #[error("llm unavailable: {0}")]
    LlmUnavailable(String),

    #[error("memory unavailable: {0}")]
    MemoryUnavailable(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl SentinelError {
    /// HTTP status code for errors surfaced directly at the webhook boundary.
    /// Every other variant is reported through stage output / metrics, not a
    /// response body, so this only meaningfully distinguishes `BadInput`.
    pub fn http_status(&self) -> u16 {
        match self {
            SentinelError::BadInput(_) => 400,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, SentinelError>;
