//! Types local to the Approval Gate beyond the shared domain types.

use serde::{Deserialize, Serialize};

/// Outcome of `ApprovalGate::authorize`, folded into the caller's
/// `ToolOutcome` by `ToolRegistry::invoke`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateDecision {
    /// `ctx.dryRun` was set; handler must run in dry-run mode.
    AutoApprovedDryRun,
    /// Target was not critical.
    AutoApprovedNonCritical,
    /// A human approved within the timeout.
    Approved,
    /// A human rejected.
    Rejected,
    /// Timeout, cancellation, or channel-post error — treated identically by
    /// the caller, but recorded distinctly in the audit entry's `approver`.
    AutoRejectedTimeout,
    AutoRejectedCancelled,
    AutoRejectedError,
}

impl GateDecision {
    pub fn allows_execution(self) -> bool {
        matches!(
            self,
            GateDecision::AutoApprovedDryRun
                | GateDecision::AutoApprovedNonCritical
                | GateDecision::Approved
        )
    }

    pub fn is_dry_run(self) -> bool {
        matches!(self, GateDecision::AutoApprovedDryRun)
    }

    /// String recorded as `AuditEntry.approver`.
    pub fn approver_label(self, human: Option<&str>) -> String {
        match self {
            GateDecision::AutoApprovedDryRun => "auto(dryrun)".to_string(),
            GateDecision::AutoApprovedNonCritical => "auto(noncritical)".to_string(),
            GateDecision::Approved | GateDecision::Rejected => {
                human.unwrap_or("human").to_string()
            }
            GateDecision::AutoRejectedTimeout => "auto(timeout)".to_string(),
            GateDecision::AutoRejectedCancelled => "auto(cancelled)".to_string(),
            GateDecision::AutoRejectedError => "auto(error)".to_string(),
        }
    }
}
