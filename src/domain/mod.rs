//! Core data model shared by every component: the inbound `Alert`, the
//! `Incident` lifecycle record and its sub-documents, the approval
//! request/audit pair, and the vector-indexed `MemoryRecord`.

pub mod alert;
pub mod approval;
pub mod incident;
pub mod memory;

pub use alert::{Alert, AlertStatus};
pub use approval::{ApprovalDecision, ApprovalRequest, ApprovalSeverity, AuditEntry};
pub use incident::{
    Incident, IncidentStatus, LlmCost, Outcome, StageError, StageName, StageOutput, ToolInvocation,
    ToolOutcome,
};
pub use memory::{MemoryPayload, MemoryRecord, MemoryStats};
