//! The `Tool` trait and its execution context.
//!
//! `execute` returns a plain `Result<_, String>` rather than the typed
//! `SentinelError` — component-internal traits stay lightweight, and the
//! registry converts at the boundary.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::risk::RiskTag;
use crate::audit::log::AuditLogWriter;
use crate::domain::ToolOutcome;

/// A single parameter in a tool's schema.
#[derive(Debug, Clone)]
pub struct ToolParam {
    pub name: &'static str,
    pub type_name: &'static str,
    pub required: bool,
    pub description: &'static str,
}

/// Minimal typed parameter schema: a list of (name, type, required,
/// description) entries.
#[derive(Debug, Clone, Default)]
pub struct ToolSchema {
    pub params: Vec<ToolParam>,
}

impl ToolSchema {
    pub fn new(params: Vec<ToolParam>) -> Self {
        Self { params }
    }

    /// Validate that every required param is present in `args`. Returns the
    /// names of missing required params.
    pub fn missing_required(&self, args: &Value) -> Vec<&'static str> {
        self.params
            .iter()
            .filter(|p| p.required)
            .filter(|p| args.get(p.name).is_none())
            .map(|p| p.name)
            .collect()
    }
}

/// Keyed mutex obtained by a handler to serialise mutations against the same
/// target id.
#[derive(Clone, Default)]
pub struct KeyedMutex {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the per-key lock, cloning the underlying `Arc<Mutex<()>>`
    /// first so the caller can release it independently of the registry's
    /// internal key map.
    pub async fn lock(&self, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.locks.lock().await;
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

/// Per-invocation execution context handed to every tool handler.
#[derive(Clone)]
pub struct ExecContext {
    pub incident_id: Uuid,
    pub dry_run: bool,
    pub deadline: Duration,
    cancel: Arc<AtomicBool>,
    pub keyed_mutex: KeyedMutex,
    pub audit: Arc<AuditLogWriter>,
}

impl ExecContext {
    pub fn new(
        incident_id: Uuid,
        dry_run: bool,
        deadline: Duration,
        keyed_mutex: KeyedMutex,
        audit: Arc<AuditLogWriter>,
    ) -> Self {
        Self {
            incident_id,
            dry_run,
            deadline,
            cancel: Arc::new(AtomicBool::new(false)),
            keyed_mutex,
            audit,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

/// Result of a single tool invocation, fed back to the LLM as `text`.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub text: String,
    pub outcome: ToolOutcome,
    pub error_kind: Option<String>,
}

impl ToolResult {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            outcome: ToolOutcome::Ok,
            error_kind: None,
        }
    }

    pub fn error(text: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            outcome: ToolOutcome::Error,
            error_kind: Some(kind.into()),
        }
    }

    pub fn dryrun(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            outcome: ToolOutcome::Dryrun,
            error_kind: None,
        }
    }

    pub fn denied(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            outcome: ToolOutcome::Denied,
            error_kind: Some("denied".to_string()),
        }
    }
}

/// A named, typed capability invoked by the agent during a stage.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable identifier used in LLM tool calls.
    fn name(&self) -> &str;

    /// Passed to the LLM.
    fn description(&self) -> &str;

    fn schema(&self) -> &ToolSchema;

    fn risk(&self) -> RiskTag;

    /// Extract `(tool_family, target_id)` from validated args for
    /// critical-target classification. Only consulted when `risk()` is
    /// `MutateCriticalCandidate`; tools that never touch a nameable target
    /// can leave the default (`None`), which the gate treats as never
    /// critical.
    fn critical_target(&self, _args: &Value) -> Option<(String, String)> {
        None
    }

    /// Run the handler against validated args. Must honour `ctx.dry_run`
    /// and `ctx.deadline`.
    async fn execute(&self, args: Value, ctx: &ExecContext) -> Result<ToolResult, String>;
}
