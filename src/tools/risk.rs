//! Per-tool risk classification.
//!
//! Each tool declares its risk tag once, at registration, rather than the
//! registry classifying a command string at call time. Combined with the
//! critical-target table, this is what decides whether an invocation needs
//! approval.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTag {
    /// Pure read; never needs approval.
    Read,
    /// Mutates state but never touches a critical target.
    MutateNoncritical,
    /// Mutates state; the Approval Gate resolves criticality at invocation
    /// time from the runtime args (e.g. target id) against the configured
    /// critical-target table.
    MutateCriticalCandidate,
}

impl RiskTag {
    pub fn requires_gate_check(self) -> bool {
        matches!(self, RiskTag::MutateCriticalCandidate)
    }
}
