//! TOML configuration schema.
//!
//! All fields have `#[serde(default)]` so a partially-filled `config.toml`
//! works correctly. Missing sections fall back to their `Default` impl.
//!
//! Example `~/.sentinel/config.toml`:
//! ```toml
//! [provider]
//! default_id = "openai"
//! default_model = "gpt-4o-mini"
//!
//! [critical_targets]
//! hypervisor_lxc_ids = ["100", "101"]
//! database_names = ["production"]
//!
//! [approval]
//! timeout_seconds = 300
//!
//! [pipeline]
//! deadline_seconds = 360
//! max_concurrent = 4
//! ```

use serde::{Deserialize, Serialize};

// ─── ProviderConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    /// ID of the default LLM provider (e.g. `"openai"`, `"anthropic"`).
    pub default_id: String,
    /// Default model identifier (e.g. `"gpt-4o-mini"`, `"claude-3-haiku"`).
    pub default_model: String,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Maximum retry attempts on transient errors.
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default_id: "openai".to_owned(),
            default_model: "gpt-4o-mini".to_owned(),
            request_timeout_secs: 60,
            max_retries: 3,
        }
    }
}

// ─── CriticalTargetsConfig ────────────────────────────────────────────────────

/// Named targets whose mutation always requires approval, regardless of
/// `RiskTag::MutateCriticalCandidate` classification elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CriticalTargetsConfig {
    pub hypervisor_lxc_ids: Vec<String>,
    pub database_names: Vec<String>,
    pub container_names: Vec<String>,
}

impl CriticalTargetsConfig {
    /// `tool_family` is the handler-defined bucket (`"hypervisor"`,
    /// `"database"`, `"container"`); unrecognised families are never
    /// critical, since a handler that doesn't advertise a known family has
    /// nothing in this table to match against.
    pub fn is_critical(&self, tool_family: &str, target_id: &str) -> bool {
        match tool_family {
            "hypervisor" => self.hypervisor_lxc_ids.iter().any(|id| id == target_id),
            "database" => self.database_names.iter().any(|id| id == target_id),
            "container" => self.container_names.iter().any(|id| id == target_id),
            _ => false,
        }
    }
}

// ─── ApprovalConfig ───────────────────────────────────────────────────────────

fn default_approval_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Seconds to wait for a human decision before auto-rejecting. Clamped
    /// to `[1, 86400]` by `ApprovalGate::new`.
    #[serde(default = "default_approval_timeout")]
    pub timeout_seconds: u64,
    /// When `true`, every tool call short-circuits to `AutoApprovedDryRun`
    /// and no handler performs a real mutation.
    pub dry_run: bool,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_approval_timeout(),
            dry_run: false,
        }
    }
}

// ─── PipelineConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Wall-clock budget for an incident end-to-end.
    pub deadline_seconds: u64,
    /// Bounded worker-pool size (concurrent incidents in flight).
    pub max_concurrent: usize,
    /// Bounded incident intake queue capacity.
    pub queue_size: usize,
    /// Window in which a resolved alert with the same fingerprint is treated
    /// as a duplicate rather than a new incident.
    pub dedup_window_seconds: u64,
    /// Per-stage concurrent tool fan-out cap.
    pub tool_fan_out: usize,
    /// Per-stage tool-call budget before the stage is forced to a verdict.
    pub tool_call_budget: usize,
    /// Wall-clock budget for a single stage.
    pub stage_wall_clock_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            deadline_seconds: 360,
            max_concurrent: 4,
            queue_size: 64,
            dedup_window_seconds: 60,
            tool_fan_out: 4,
            tool_call_budget: 10,
            stage_wall_clock_seconds: 90,
        }
    }
}

// ─── SchedulerConfig ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Heartbeat interval in seconds (default: 30 minutes).
    pub heartbeat_interval_secs: u64,
    /// Whether the heartbeat scheduler is enabled.
    pub heartbeat_enabled: bool,
    /// Interval between synthetic self-check alerts fed into the pipeline.
    pub synthetic_alert_interval_seconds: u64,
    pub daily_report_enabled: bool,
    pub weekly_report_enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30 * 60,
            heartbeat_enabled: true,
            synthetic_alert_interval_seconds: 300,
            daily_report_enabled: true,
            weekly_report_enabled: true,
        }
    }
}

// ─── MemoryConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    /// Whether the memory subsystem is enabled.
    pub enabled: bool,
    /// LRU cache size for embeddings.
    pub embedding_cache_size: usize,
    /// Maximum number of entries returned by `similar()`.
    pub top_k: usize,
    /// Minimum cosine similarity for a match to be returned.
    pub min_score: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            embedding_cache_size: 10_000,
            top_k: 5,
            min_score: 0.55,
        }
    }
}

// ─── WebhookConfig ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct WebhookConfig {
    /// Shared secret compared in constant time against the inbound
    /// `X-Webhook-Secret` header. `None` disables the check (homelab-local
    /// deployments behind a trusted network).
    pub shared_secret: Option<String>,
    /// Outgoing chat webhook URL (Slack-compatible incoming webhook) used to
    /// post approval prompts and notifications. `None` runs with no chat
    /// channel registered — approvals then always time out or must be
    /// resolved some other way.
    pub outgoing_url: Option<String>,
}

// ─── NotificationsConfig ──────────────────────────────────────────────────────

fn bool_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Whether the Communicator stage may send outbound notifications.
    pub enabled: bool,
    /// Per-category enable flags (category name → enabled).
    pub categories: std::collections::HashMap<String, bool>,
    #[serde(default = "bool_true")]
    pub notify_heartbeat: bool,
    #[serde(default = "bool_true")]
    pub notify_approval_request: bool,
    #[serde(default = "bool_true")]
    pub notify_incident_resolved: bool,
    #[serde(default = "bool_true")]
    pub notify_incident_escalated: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            categories: std::collections::HashMap::new(),
            notify_heartbeat: true,
            notify_approval_request: true,
            notify_incident_resolved: true,
            notify_incident_escalated: true,
        }
    }
}

// ─── AppConfig ────────────────────────────────────────────────────────────────

/// Top-level application configuration.
///
/// Loaded from `~/.sentinel/config.toml`, falling back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub critical_targets: CriticalTargetsConfig,
    pub approval: ApprovalConfig,
    pub pipeline: PipelineConfig,
    pub scheduler: SchedulerConfig,
    pub memory: MemoryConfig,
    pub webhook: WebhookConfig,
    pub notifications: NotificationsConfig,
}
