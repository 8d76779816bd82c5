//! Append-only audit trail for tool invocations and approval decisions.

pub mod log;

pub use log::AuditLogWriter;
