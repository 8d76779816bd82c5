//! Sample tool handlers spanning all three risk tags.
//!
//! A real deployment registers Proxmox/Docker/Postgres-specific handlers;
//! these cover the shapes the Agent Runner and Incident Pipeline are tested
//! against: a read-only status check, a non-critical mutation, and a
//! critical-candidate mutation that must clear the Approval Gate.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, OnceLock};

use super::risk::RiskTag;
use super::traits::{ExecContext, Tool, ToolParam, ToolResult, ToolSchema};
use crate::channels::manager::ChannelManager;

/// Read-only: reports whether a service unit is active.
pub struct ServiceStatusTool;

#[async_trait]
impl Tool for ServiceStatusTool {
    fn name(&self) -> &str {
        "service_status"
    }

    fn description(&self) -> &str {
        "Report the active/inactive state of a systemd unit by name."
    }

    fn schema(&self) -> &ToolSchema {
        static SCHEMA: OnceLock<ToolSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            ToolSchema::new(vec![ToolParam {
                name: "unit",
                type_name: "string",
                required: true,
                description: "systemd unit name, e.g. nginx.service",
            }])
        })
    }

    fn risk(&self) -> RiskTag {
        RiskTag::Read
    }

    async fn execute(&self, args: Value, _ctx: &ExecContext) -> Result<ToolResult, String> {
        let unit = args
            .get("unit")
            .and_then(Value::as_str)
            .ok_or("missing unit")?;
        Ok(ToolResult::ok(format!("{unit}: active (mock)")))
    }
}

/// Non-critical mutation: clears a log directory that isn't on the critical
/// target list.
pub struct ClearScratchLogsTool;

#[async_trait]
impl Tool for ClearScratchLogsTool {
    fn name(&self) -> &str {
        "clear_scratch_logs"
    }

    fn description(&self) -> &str {
        "Truncate rotated log files under /var/log/scratch for the named service."
    }

    fn schema(&self) -> &ToolSchema {
        static SCHEMA: OnceLock<ToolSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            ToolSchema::new(vec![ToolParam {
                name: "service",
                type_name: "string",
                required: true,
                description: "service whose scratch logs to clear",
            }])
        })
    }

    fn risk(&self) -> RiskTag {
        RiskTag::MutateNoncritical
    }

    async fn execute(&self, args: Value, ctx: &ExecContext) -> Result<ToolResult, String> {
        let service = args
            .get("service")
            .and_then(Value::as_str)
            .ok_or("missing service")?;
        if ctx.dry_run {
            return Ok(ToolResult::dryrun(format!(
                "would clear scratch logs for {service}"
            )));
        }
        Ok(ToolResult::ok(format!("cleared scratch logs for {service}")))
    }
}

/// Critical candidate: restarts an LXC container by id on the hypervisor.
/// Gated whenever the id appears in `CriticalTargetsConfig.hypervisor_lxc_ids`.
pub struct RestartHypervisorGuestTool;

#[async_trait]
impl Tool for RestartHypervisorGuestTool {
    fn name(&self) -> &str {
        "restart_hypervisor_guest"
    }

    fn description(&self) -> &str {
        "Restart an LXC container or VM on the hypervisor by numeric id."
    }

    fn schema(&self) -> &ToolSchema {
        static SCHEMA: OnceLock<ToolSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            ToolSchema::new(vec![ToolParam {
                name: "id",
                type_name: "string",
                required: true,
                description: "numeric LXC/VM id",
            }])
        })
    }

    fn risk(&self) -> RiskTag {
        RiskTag::MutateCriticalCandidate
    }

    fn critical_target(&self, args: &Value) -> Option<(String, String)> {
        args.get("id")
            .and_then(Value::as_str)
            .map(|id| ("hypervisor".to_string(), id.to_string()))
    }

    async fn execute(&self, args: Value, ctx: &ExecContext) -> Result<ToolResult, String> {
        let id = args.get("id").and_then(Value::as_str).ok_or("missing id")?;
        let _guard = ctx.keyed_mutex.lock(id).await;
        if ctx.dry_run {
            return Ok(ToolResult::dryrun(format!("would restart guest {id}")));
        }
        Ok(ToolResult::ok(format!("restarted guest {id}")))
    }
}

/// Critical candidate: runs a named maintenance statement against a database.
pub struct RunDatabaseMaintenanceTool;

#[async_trait]
impl Tool for RunDatabaseMaintenanceTool {
    fn name(&self) -> &str {
        "run_database_maintenance"
    }

    fn description(&self) -> &str {
        "Run a named maintenance operation (vacuum, reindex) against a database."
    }

    fn schema(&self) -> &ToolSchema {
        static SCHEMA: OnceLock<ToolSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            ToolSchema::new(vec![
                ToolParam {
                    name: "database",
                    type_name: "string",
                    required: true,
                    description: "database name",
                },
                ToolParam {
                    name: "operation",
                    type_name: "string",
                    required: true,
                    description: "vacuum | reindex",
                },
            ])
        })
    }

    fn risk(&self) -> RiskTag {
        RiskTag::MutateCriticalCandidate
    }

    fn critical_target(&self, args: &Value) -> Option<(String, String)> {
        args.get("database")
            .and_then(Value::as_str)
            .map(|db| ("database".to_string(), db.to_string()))
    }

    async fn execute(&self, args: Value, ctx: &ExecContext) -> Result<ToolResult, String> {
        let database = args
            .get("database")
            .and_then(Value::as_str)
            .ok_or("missing database")?;
        let operation = args
            .get("operation")
            .and_then(Value::as_str)
            .ok_or("missing operation")?;
        let _guard = ctx.keyed_mutex.lock(database).await;
        if ctx.dry_run {
            return Ok(ToolResult::dryrun(format!(
                "would run {operation} on {database}"
            )));
        }
        Ok(ToolResult::ok(format!("ran {operation} on {database}")))
    }
}

/// The Communicator stage's only capability: post a status message to the
/// configured notification channel. Not gated — a chat message is never a
/// critical-target mutation — the Communicator's allow-list is this one
/// send-chat-message tool, outside the risk-tag/critical-target model.
pub struct SendChatMessageTool {
    channel: Arc<ChannelManager>,
    channel_name: String,
}

impl SendChatMessageTool {
    pub fn new(channel: Arc<ChannelManager>, channel_name: impl Into<String>) -> Self {
        Self {
            channel,
            channel_name: channel_name.into(),
        }
    }
}

#[async_trait]
impl Tool for SendChatMessageTool {
    fn name(&self) -> &str {
        "send_chat_message"
    }

    fn description(&self) -> &str {
        "Send a human-readable status message to the configured notification channel."
    }

    fn schema(&self) -> &ToolSchema {
        static SCHEMA: OnceLock<ToolSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            ToolSchema::new(vec![ToolParam {
                name: "message",
                type_name: "string",
                required: true,
                description: "message body",
            }])
        })
    }

    fn risk(&self) -> RiskTag {
        RiskTag::MutateNoncritical
    }

    async fn execute(&self, args: Value, ctx: &ExecContext) -> Result<ToolResult, String> {
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .ok_or("missing message")?;
        if ctx.dry_run {
            return Ok(ToolResult::dryrun(format!("would send: {message}")));
        }
        self.channel.send(&self.channel_name, message, None).await?;
        Ok(ToolResult::ok("message sent"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLogWriter;
    use crate::tools::traits::KeyedMutex;
    use std::time::Duration;
    use uuid::Uuid;

    fn ctx(dry_run: bool) -> ExecContext {
        ExecContext::new(
            Uuid::new_v4(),
            dry_run,
            Duration::from_secs(30),
            KeyedMutex::new(),
            AuditLogWriter::spawn(None),
        )
    }

    #[tokio::test]
    async fn service_status_reports_unit() {
        let tool = ServiceStatusTool;
        let result = tool
            .execute(serde_json::json!({"unit": "nginx.service"}), &ctx(false))
            .await
            .unwrap();
        assert!(result.text.contains("nginx.service"));
    }

    #[tokio::test]
    async fn clear_scratch_logs_honours_dry_run() {
        let tool = ClearScratchLogsTool;
        let result = tool
            .execute(serde_json::json!({"service": "web"}), &ctx(true))
            .await
            .unwrap();
        assert_eq!(result.outcome, crate::domain::incident::ToolOutcome::Dryrun);
    }

    #[tokio::test]
    async fn restart_hypervisor_guest_reports_critical_target() {
        let tool = RestartHypervisorGuestTool;
        let target = tool.critical_target(&serde_json::json!({"id": "100"}));
        assert_eq!(target, Some(("hypervisor".to_string(), "100".to_string())));
    }

    #[tokio::test]
    async fn run_database_maintenance_reports_critical_target() {
        let tool = RunDatabaseMaintenanceTool;
        let target = tool.critical_target(&serde_json::json!({"database": "production", "operation": "vacuum"}));
        assert_eq!(target, Some(("database".to_string(), "production".to_string())));
    }

    #[tokio::test]
    async fn send_chat_message_honours_dry_run() {
        let manager = Arc::new(crate::channels::manager::ChannelManager::new());
        let tool = SendChatMessageTool::new(manager, "notifications");
        let result = tool
            .execute(serde_json::json!({"message": "incident resolved"}), &ctx(true))
            .await
            .unwrap();
        assert_eq!(result.outcome, crate::domain::incident::ToolOutcome::Dryrun);
    }

    #[tokio::test]
    async fn send_chat_message_errors_when_channel_missing() {
        let manager = Arc::new(crate::channels::manager::ChannelManager::new());
        let tool = SendChatMessageTool::new(manager, "notifications");
        let result = tool
            .execute(serde_json::json!({"message": "incident resolved"}), &ctx(false))
            .await;
        assert!(result.is_err());
    }
}
