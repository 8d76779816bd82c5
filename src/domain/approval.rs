//! Approval request / audit-entry types shared by the gate and the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalDecision {
    Pending,
    Approved,
    Rejected,
    AutoApproved,
    AutoRejected,
    Errored,
}

impl ApprovalDecision {
    /// §3 invariant: a critical-target invocation requires one of these.
    pub fn satisfies_approval_invariant(self) -> bool {
        matches!(
            self,
            ApprovalDecision::Approved | ApprovalDecision::AutoApproved
        )
    }
}

/// Out-of-band human decision gating a critical mutation. `id` is the
/// correlation token the human returns via the approval channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub incident_id: Uuid,
    pub tool: String,
    pub args: Value,
    pub severity: ApprovalSeverity,
    pub requested_at: DateTime<Utc>,
    pub timeout_at: DateTime<Utc>,
    pub decision: ApprovalDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decider_ref: Option<String>,
}

/// Append-only record written before every `ToolRegistry::invoke` returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub ts: DateTime<Utc>,
    pub incident_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<Uuid>,
    pub tool: String,
    /// Args with values matching configured secret keys elided.
    pub args: Value,
    pub outcome: String,
    pub approver: String,
}
