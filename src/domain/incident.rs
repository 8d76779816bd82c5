//! The incident lifecycle record and its sub-documents.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::alert::Alert;

/// Ring buffer capacity for merged duplicate alerts (§3 invariant).
pub const ALERT_RING_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Accepted,
    Diagnosing,
    Remediating,
    Notifying,
    Resolved,
    Escalated,
    Failed,
}

impl IncidentStatus {
    /// Terminal statuses set `closedAt` and never revert (§3 invariant).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            IncidentStatus::Resolved | IncidentStatus::Escalated | IncidentStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Resolved,
    Escalated,
    Failed,
    Noop,
}

/// The stable stage names, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Monitor,
    Analyst,
    Healer,
    Communicator,
}

impl StageName {
    pub fn as_str(self) -> &'static str {
        match self {
            StageName::Monitor => "monitor",
            StageName::Analyst => "analyst",
            StageName::Healer => "healer",
            StageName::Communicator => "communicator",
        }
    }
}

/// A stage-local error, captured into `StageOutput.errors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageError {
    pub kind: String,
    pub message: String,
}

/// Immutable once the owning stage completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutput {
    pub stage: StageName,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub verdict: String,
    pub tool_call_count: u32,
    #[serde(default)]
    pub errors: Vec<StageError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Ok,
    Error,
    Denied,
    Dryrun,
}

/// Appended to `Incident.toolsUsed` in completion order; never mutated
/// afterward (§5 ordering guarantee).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub args: Value,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: ToolOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<Uuid>,
}

/// Running token/dollar cost accumulator, written to by the LLM client's
/// cost sink.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LlmCost {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub usd: f64,
}

impl LlmCost {
    pub fn add(&mut self, tokens_in: u64, tokens_out: u64, usd: f64) {
        self.tokens_in += tokens_in;
        self.tokens_out += tokens_out;
        self.usd += usd;
    }
}

/// The core entity, owned by the Incident Pipeline for its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub fingerprint: String,
    pub received_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    pub status: IncidentStatus,
    pub severity: String,
    pub alert: Alert,
    /// Duplicate alerts merged onto this incident, most recent last.
    #[serde(default)]
    pub alert_ring: VecDeque<Alert>,
    pub stage_outputs: Vec<StageOutput>,
    pub tools_used: Vec<ToolInvocation>,
    pub llm_cost: LlmCost,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub summary: String,
}

impl Incident {
    pub fn new(alert: Alert) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            fingerprint: alert.fingerprint.clone(),
            received_at: now,
            closed_at: None,
            status: IncidentStatus::Accepted,
            severity: alert.severity.clone(),
            alert,
            alert_ring: VecDeque::new(),
            stage_outputs: Vec::new(),
            tools_used: Vec::new(),
            llm_cost: LlmCost::default(),
            outcome: None,
            summary: String::new(),
        }
    }

    /// Merge a duplicate-fingerprint alert into this incident's ring buffer.
    pub fn merge_duplicate(&mut self, alert: Alert) {
        self.alert_ring.push_back(alert);
        while self.alert_ring.len() > ALERT_RING_CAPACITY {
            self.alert_ring.pop_front();
        }
    }

    /// Total alerts observed for this incident (primary + merged duplicates).
    pub fn alert_count(&self) -> usize {
        1 + self.alert_ring.len()
    }

    pub fn push_stage_output(&mut self, output: StageOutput) {
        self.stage_outputs.push(output);
    }

    pub fn push_tool_invocation(&mut self, invocation: ToolInvocation) {
        self.tools_used.push(invocation);
    }

    /// Transition to a terminal status, setting `closedAt` and `outcome`
    /// together (§3 invariant: `closedAt` set iff status is terminal).
    pub fn finish(&mut self, status: IncidentStatus, outcome: Outcome, summary: impl Into<String>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.outcome = Some(outcome);
        self.summary = summary.into();
        self.closed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alert::AlertStatus;

    fn sample_alert() -> Alert {
        Alert {
            fingerprint: "abc".into(),
            status: AlertStatus::Firing,
            severity: "warning".into(),
            labels: Default::default(),
            annotations: Default::default(),
            starts_at: Utc::now(),
            ends_at: None,
            generator_url: None,
        }
    }

    #[test]
    fn merge_duplicate_caps_ring_at_ten() {
        let mut incident = Incident::new(sample_alert());
        for _ in 0..15 {
            incident.merge_duplicate(sample_alert());
        }
        assert_eq!(incident.alert_ring.len(), ALERT_RING_CAPACITY);
    }

    #[test]
    fn finish_sets_closed_at_and_outcome() {
        let mut incident = Incident::new(sample_alert());
        assert!(incident.closed_at.is_none());
        incident.finish(IncidentStatus::Resolved, Outcome::Resolved, "done");
        assert!(incident.closed_at.is_some());
        assert_eq!(incident.outcome, Some(Outcome::Resolved));
        assert_eq!(incident.status, IncidentStatus::Resolved);
    }

    #[test]
    fn alert_count_includes_primary() {
        let mut incident = Incident::new(sample_alert());
        assert_eq!(incident.alert_count(), 1);
        incident.merge_duplicate(sample_alert());
        assert_eq!(incident.alert_count(), 2);
    }
}
