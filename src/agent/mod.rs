//! Per-stage LLM reasoning loop and tool-call parsing.

pub mod runner;
pub mod tool_parser;

pub use runner::{AgentRunner, StageRole};
pub use tool_parser::{ParsedToolCall, parse_tool_calls};
