//! The Tool Registry.
//!
//! A `HashMap<String, Arc<dyn Tool>>` behind `invoke()`, which folds schema
//! validation, approval-gate routing, and audit logging into a single call
//! so every call site — the Agent Runner's tool-call loop — gets "every
//! critical-target non-dry-run invocation has a matching approval record"
//! for free.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::approval::{ApprovalGate, redact_args};
use crate::domain::approval::ApprovalSeverity;
use crate::domain::incident::{Incident, ToolInvocation};
use crate::error::{Result, SentinelError};

use super::risk::RiskTag;
use super::traits::{ExecContext, Tool, ToolResult};

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.values().cloned().collect()
    }

    /// Build a new registry containing only the tools `predicate` accepts.
    /// Used to scope a stage's tool allow-list — the `Arc<dyn Tool>`
    /// entries are shared, not cloned.
    pub fn filtered(&self, predicate: impl Fn(&dyn Tool) -> bool) -> ToolRegistry {
        ToolRegistry {
            tools: self
                .tools
                .iter()
                .filter(|(_, tool)| predicate(tool.as_ref()))
                .map(|(name, tool)| (name.clone(), tool.clone()))
                .collect(),
        }
    }

    /// Validate, gate, and execute a single tool call, without recording it
    /// onto an incident. Split out from [`Self::invoke`] so callers that fan
    /// multiple calls out concurrently (the Agent Runner, bounded by its
    /// tool fan-out) can await several of these at once and then push the
    /// resulting `ToolInvocation`s onto the incident sequentially, in
    /// completion order.
    pub async fn invoke_parts(
        &self,
        name: &str,
        args: Value,
        ctx: &ExecContext,
        gate: &ApprovalGate,
    ) -> Result<(ToolResult, ToolInvocation)> {
        let tool = self
            .get(name)
            .ok_or_else(|| SentinelError::UnknownTool(name.to_string()))?;

        let missing = tool.schema().missing_required(&args);
        if !missing.is_empty() {
            return Err(SentinelError::BadArgs(format!(
                "missing required params: {}",
                missing.join(", ")
            )));
        }

        let started_at = Utc::now();
        let risk = tool.risk();

        let (gate_decision, approval_id) = if risk.requires_gate_check() {
            let target = tool.critical_target(&args);
            let (decision, request) = gate
                .authorize(
                    ctx.incident_id,
                    name,
                    target,
                    &args,
                    ApprovalSeverity::Critical,
                    ctx.dry_run,
                )
                .await;
            let id = request.as_ref().map(|r| r.id);
            let decider = request.as_ref().and_then(|r| r.decider_ref.clone());
            ctx.audit.append(crate::domain::approval::AuditEntry {
                ts: Utc::now(),
                incident_id: ctx.incident_id,
                approval_id: id,
                tool: name.to_string(),
                args: redact_args(&args),
                outcome: format!("{decision:?}"),
                approver: decision.approver_label(decider.as_deref()),
            });
            (decision, id)
        } else {
            ctx.audit.append(crate::domain::approval::AuditEntry {
                ts: Utc::now(),
                incident_id: ctx.incident_id,
                approval_id: None,
                tool: name.to_string(),
                args: redact_args(&args),
                outcome: "AutoApprovedNonCritical".to_string(),
                approver: "auto(noncritical)".to_string(),
            });
            (crate::approval::GateDecision::AutoApprovedNonCritical, None)
        };

        let result = if !gate_decision.allows_execution() {
            ToolResult::denied("approval was not granted")
        } else {
            let mut effective_ctx = ctx.clone();
            effective_ctx.dry_run = ctx.dry_run || gate_decision.is_dry_run();
            match tool.execute(args.clone(), &effective_ctx).await {
                Ok(result) => result,
                Err(message) => ToolResult::error(message, "tool_exec_error"),
            }
        };

        crate::metrics::record_tool_invocation(name, result.outcome);

        let invocation = ToolInvocation {
            name: name.to_string(),
            args: redact_args(&args),
            started_at,
            ended_at: Utc::now(),
            outcome: result.outcome,
            error_kind: result.error_kind.clone(),
            approval_id,
        };

        Ok((result, invocation))
    }

    /// Validate, gate, execute, and record a single tool call.
    ///
    /// Appends a `ToolInvocation` to `incident` in every branch (including
    /// unknown-tool and denied outcomes are surfaced as an `Err` before
    /// anything is recorded, since there is nothing yet to attribute the
    /// invocation to).
    pub async fn invoke(
        &self,
        name: &str,
        args: Value,
        ctx: &ExecContext,
        incident: &mut Incident,
        gate: &ApprovalGate,
    ) -> Result<ToolResult> {
        let (result, invocation) = self.invoke_parts(name, args, ctx, gate).await?;
        incident.push_tool_invocation(invocation);
        Ok(result)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
