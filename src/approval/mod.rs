//! The Approval Gate: classification of critical-target tool calls and the
//! human-in-the-loop decision flow around them.

pub mod gate;
pub mod types;

pub use gate::{ApprovalGate, HumanDecision, redact_args};
pub use types::GateDecision;
