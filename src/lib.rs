//! Autonomous incident-response service for a homelab.
//!
//! Alerts arrive over the [`gateway`]'s webhook, are deduplicated and
//! queued by the [`pipeline`], driven through a Monitor → Analyst → Healer
//! → Communicator [`agent`] pipeline, gated behind human [`approval`] for
//! sensitive actions, and remembered in [`memory`] once resolved.
//! [`scheduler`] drives periodic self-checks and reports; [`orchestrator`]
//! wires everything together at startup.

pub mod agent;
pub mod ai;
pub mod approval;
pub mod audit;
pub mod channels;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod memory;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod scheduler;
pub mod tools;

/// Convenience re-exports for the most commonly used traits and types.
pub mod prelude {
    pub use crate::ai::provider::LLMProvider;
    pub use crate::approval::{ApprovalGate, GateDecision, HumanDecision};
    pub use crate::config::schema::AppConfig;
    pub use crate::domain::alert::Alert;
    pub use crate::domain::incident::{Incident, IncidentStatus, Outcome};
    pub use crate::error::SentinelError;
    pub use crate::memory::VectorMemory;
    pub use crate::pipeline::IncidentPipeline;
    pub use crate::scheduler::{JobPayload, Schedule, Scheduler};
    pub use crate::tools::{Tool, ToolRegistry, ToolResult};
}
