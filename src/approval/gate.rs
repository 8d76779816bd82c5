//! The Approval Gate.
//!
//! Owns the `id -> oneshot::Sender` waiter map behind a `tokio::sync::Mutex`:
//! a tool invocation that needs approval registers a sender, blocks on the
//! matching receiver, and a decision arriving on the approval channel looks
//! up the same id to wake it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};
use uuid::Uuid;

use crate::channels::manager::ChannelManager;
use crate::config::schema::{ApprovalConfig, CriticalTargetsConfig};
use crate::domain::approval::{ApprovalDecision, ApprovalRequest, ApprovalSeverity};

use super::types::GateDecision;

/// Decision posted back over the approval channel (`APPROVE <id>` /
/// `REJECT <id>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HumanDecision {
    Approve,
    Reject,
}

/// Keys whose values are elided before an entry reaches the audit log or the
/// outgoing approval message.
const SECRET_KEY_MARKERS: &[&str] = &["token", "secret", "password", "key", "credential"];

/// Redact any object value whose key matches a secret marker.
pub fn redact_args(args: &Value) -> Value {
    match args {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                let lower = k.to_lowercase();
                if SECRET_KEY_MARKERS.iter().any(|m| lower.contains(m)) {
                    out.insert(k.clone(), Value::String("***redacted***".to_string()));
                } else {
                    out.insert(k.clone(), redact_args(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_args).collect()),
        other => other.clone(),
    }
}

/// Hard cap on the approval timeout: 24 hours, regardless of config.
const MAX_TIMEOUT_SECS: u64 = 86_400;

pub struct ApprovalGate {
    waiters: Mutex<HashMap<Uuid, oneshot::Sender<HumanDecision>>>,
    critical_targets: CriticalTargetsConfig,
    default_timeout: Duration,
    global_dry_run: bool,
    channel: Arc<ChannelManager>,
    approval_channel_name: String,
}

impl ApprovalGate {
    pub fn new(
        critical_targets: CriticalTargetsConfig,
        approval_config: &ApprovalConfig,
        channel: Arc<ChannelManager>,
        approval_channel_name: impl Into<String>,
    ) -> Self {
        let timeout_secs = approval_config.timeout_seconds.clamp(1, MAX_TIMEOUT_SECS);
        Self {
            waiters: Mutex::new(HashMap::new()),
            critical_targets,
            default_timeout: Duration::from_secs(timeout_secs),
            global_dry_run: approval_config.dry_run,
            channel,
            approval_channel_name: approval_channel_name.into(),
        }
    }

    pub fn is_critical(&self, tool_family: &str, target_id: &str) -> bool {
        self.critical_targets.is_critical(tool_family, target_id)
    }

    /// Decide whether a `mutate_critical_candidate` invocation may proceed.
    ///
    /// Walks dry-run short-circuit, critical-target classification, and
    /// human-decision correlation in order. Returns the decision plus the
    /// `ApprovalRequest` record when one was created.
    pub async fn authorize(
        &self,
        incident_id: Uuid,
        tool: &str,
        target: Option<(String, String)>,
        args: &Value,
        severity: ApprovalSeverity,
        dry_run_override: bool,
    ) -> (GateDecision, Option<ApprovalRequest>) {
        // Step 1: dry-run short-circuit.
        if self.global_dry_run || dry_run_override {
            crate::metrics::record_approval_decision("auto_approved_dry_run");
            return (GateDecision::AutoApprovedDryRun, None);
        }

        // Step 2: non-critical target.
        let critical = target
            .as_ref()
            .is_some_and(|(family, id)| self.is_critical(family, id));
        if !critical {
            crate::metrics::record_approval_decision("auto_approved_noncritical");
            return (GateDecision::AutoApprovedNonCritical, None);
        }

        // Step 3: issue an ApprovalRequest and post to the channel.
        let id = Uuid::new_v4();
        let now = Utc::now();
        let timeout_at = now + chrono::Duration::seconds(self.default_timeout.as_secs() as i64);
        let mut request = ApprovalRequest {
            id,
            incident_id,
            tool: tool.to_string(),
            args: redact_args(args),
            severity,
            requested_at: now,
            timeout_at,
            decision: ApprovalDecision::Pending,
            decided_at: None,
            decider_ref: None,
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut waiters = self.waiters.lock().await;
            waiters.insert(id, tx);
        }

        let body = format_approval_message(&request);
        if let Err(e) = self
            .channel
            .send(&self.approval_channel_name, &body, None)
            .await
        {
            tracing::warn!(error = %e, approval_id = %id, "approval gate: failed to post request");
            self.waiters.lock().await.remove(&id);
            request.decision = ApprovalDecision::Errored;
            request.decided_at = Some(Utc::now());
            crate::metrics::record_approval_decision("auto_rejected_error");
            return (GateDecision::AutoRejectedError, Some(request));
        }

        // Step 4: wait for approval, rejection, or timeout.
        let outcome = tokio::time::timeout(self.default_timeout, rx).await;
        self.waiters.lock().await.remove(&id);

        let (gate_decision, decision, decider_ref) = match outcome {
            Ok(Ok(HumanDecision::Approve)) => (
                GateDecision::Approved,
                ApprovalDecision::Approved,
                Some("human".to_string()),
            ),
            Ok(Ok(HumanDecision::Reject)) => (
                GateDecision::Rejected,
                ApprovalDecision::Rejected,
                Some("human".to_string()),
            ),
            // Sender dropped without a decision — treat like a channel error.
            Ok(Err(_)) => (GateDecision::AutoRejectedError, ApprovalDecision::Errored, None),
            // Step 5: timeout.
            Err(_) => (
                GateDecision::AutoRejectedTimeout,
                ApprovalDecision::AutoRejected,
                None,
            ),
        };

        request.decision = decision;
        request.decided_at = Some(Utc::now());
        request.decider_ref = decider_ref;
        crate::metrics::record_approval_decision(&format!("{gate_decision:?}").to_lowercase());
        (gate_decision, Some(request))
    }

    /// Deliver a human decision for a pending request. Returns `true` if a
    /// waiter was found (a second decision for an already-decided or unknown
    /// id is ignored).
    pub async fn resolve(&self, id: Uuid, decision: HumanDecision) -> bool {
        let tx = self.waiters.lock().await.remove(&id);
        match tx {
            Some(tx) => tx.send(decision).is_ok(),
            None => false,
        }
    }
}

fn format_approval_message(req: &ApprovalRequest) -> String {
    let badge = match req.severity {
        ApprovalSeverity::Critical => "[CRITICAL] ",
        ApprovalSeverity::Warning => "[WARNING] ",
        ApprovalSeverity::Info => "",
    };
    format!(
        "{badge}Approval required for `{}`\nid: {}\nargs: {}\nseverity: {:?}\ntimeout: {}\n\nReply `APPROVE {}` or `REJECT {}`.",
        req.tool,
        req.id,
        req.args,
        req.severity,
        req.timeout_at.to_rfc3339(),
        req.id,
        req.id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn critical_targets() -> CriticalTargetsConfig {
        CriticalTargetsConfig {
            hypervisor_lxc_ids: vec!["100".to_string()],
            database_names: vec!["production".to_string()],
            container_names: vec![],
        }
    }

    fn gate_with_timeout(secs: u64, dry_run: bool) -> ApprovalGate {
        let config = ApprovalConfig {
            timeout_seconds: secs,
            dry_run,
        };
        ApprovalGate::new(
            critical_targets(),
            &config,
            Arc::new(ChannelManager::new()),
            "approvals",
        )
    }

    #[test]
    fn redact_args_elides_secret_like_keys() {
        let args = json!({"api_token": "shh", "target_id": "100", "nested": {"password": "p"}});
        let redacted = redact_args(&args);
        assert_eq!(redacted["api_token"], "***redacted***");
        assert_eq!(redacted["target_id"], "100");
        assert_eq!(redacted["nested"]["password"], "***redacted***");
    }

    #[tokio::test]
    async fn global_dry_run_short_circuits() {
        let gate = gate_with_timeout(5, true);
        let (decision, request) = gate
            .authorize(
                Uuid::new_v4(),
                "restart_container",
                Some(("containers".to_string(), "web".to_string())),
                &json!({}),
                ApprovalSeverity::Warning,
                false,
            )
            .await;
        assert_eq!(decision, GateDecision::AutoApprovedDryRun);
        assert!(request.is_none());
    }

    #[tokio::test]
    async fn noncritical_target_auto_approves() {
        let gate = gate_with_timeout(5, false);
        let (decision, request) = gate
            .authorize(
                Uuid::new_v4(),
                "restart_container",
                Some(("containers".to_string(), "not-critical".to_string())),
                &json!({}),
                ApprovalSeverity::Warning,
                false,
            )
            .await;
        assert_eq!(decision, GateDecision::AutoApprovedNonCritical);
        assert!(request.is_none());
    }

    #[tokio::test]
    async fn critical_target_times_out_by_default() {
        let gate = Arc::new(gate_with_timeout(1, false));
        let (decision, request) = gate
            .authorize(
                Uuid::new_v4(),
                "mutate_db",
                Some(("databases".to_string(), "production".to_string())),
                &json!({}),
                ApprovalSeverity::Critical,
                false,
            )
            .await;
        assert_eq!(decision, GateDecision::AutoRejectedTimeout);
        let request = request.expect("request recorded even on timeout");
        assert_eq!(request.decision, ApprovalDecision::AutoRejected);
    }

    #[tokio::test]
    async fn resolve_unknown_id_returns_false() {
        let gate = gate_with_timeout(5, false);
        assert!(!gate.resolve(Uuid::new_v4(), HumanDecision::Approve).await);
    }

    #[tokio::test]
    async fn channel_send_failure_auto_rejects_as_errored() {
        // No channel named "approvals" is registered, so posting the prompt
        // fails and the request is recorded as errored rather than pending.
        let gate = gate_with_timeout(5, false);
        let (decision, request) = gate
            .authorize(
                Uuid::new_v4(),
                "mutate_db",
                Some(("databases".to_string(), "production".to_string())),
                &json!({}),
                ApprovalSeverity::Critical,
                false,
            )
            .await;
        assert_eq!(decision, GateDecision::AutoRejectedError);
        assert_eq!(request.unwrap().decision, ApprovalDecision::Errored);
    }

    /// A channel whose `send` captures the outgoing message body, so a test
    /// can pull the approval id back out of `"id: {uuid}"` the way a real
    /// chat relay's operator would read it off the screen.
    struct CapturingChannel {
        captured: tokio::sync::Mutex<Option<String>>,
    }

    #[async_trait::async_trait]
    impl crate::channels::Channel for CapturingChannel {
        fn name(&self) -> &str {
            "approvals"
        }
        async fn send(&self, message: &str, _recipient: Option<&str>) -> Result<(), String> {
            *self.captured.lock().await = Some(message.to_string());
            Ok(())
        }
        async fn listen(&self, _tx: tokio::sync::mpsc::Sender<crate::channels::ChannelMessage>) -> Result<(), String> {
            std::future::pending().await
        }
        async fn health_check(&self) -> bool {
            true
        }
    }

    fn extract_id(message: &str) -> Uuid {
        let line = message.lines().find(|l| l.starts_with("id: ")).expect("message carries an id: line");
        Uuid::parse_str(line.trim_start_matches("id: ")).expect("id: line is a valid uuid")
    }

    #[tokio::test]
    async fn human_approval_is_delivered_before_timeout() {
        let channel = Arc::new(CapturingChannel { captured: tokio::sync::Mutex::new(None) });
        let channel_manager = Arc::new(ChannelManager::new());
        channel_manager.register(channel.clone()).await.unwrap();

        let gate = Arc::new(ApprovalGate::new(
            critical_targets(),
            &ApprovalConfig { timeout_seconds: 5, dry_run: false },
            channel_manager,
            "approvals",
        ));
        let gate_clone = gate.clone();

        let authorize = tokio::spawn(async move {
            gate_clone
                .authorize(
                    Uuid::new_v4(),
                    "mutate_db",
                    Some(("databases".to_string(), "production".to_string())),
                    &json!({}),
                    ApprovalSeverity::Critical,
                    false,
                )
                .await
        });

        // Poll until the prompt has actually been posted, then pull the id
        // out of it exactly as a human reading the chat message would.
        let id = loop {
            if let Some(message) = channel.captured.lock().await.clone() {
                break extract_id(&message);
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        };

        assert!(gate.resolve(id, HumanDecision::Approve).await);

        let (decision, request) = authorize.await.unwrap();
        assert_eq!(decision, GateDecision::Approved);
        assert_eq!(request.unwrap().decision, ApprovalDecision::Approved);
    }
}
