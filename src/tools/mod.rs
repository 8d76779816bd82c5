//! Tool Registry: typed capabilities the agent invokes during a stage.

pub mod builtin;
pub mod registry;
pub mod risk;
pub mod traits;

pub use builtin::{
    ClearScratchLogsTool, RestartHypervisorGuestTool, RunDatabaseMaintenanceTool,
    SendChatMessageTool, ServiceStatusTool,
};
pub use registry::ToolRegistry;
pub use risk::RiskTag;
pub use traits::{ExecContext, KeyedMutex, Tool, ToolParam, ToolResult, ToolSchema};
