//! Wires every component together from a loaded [`AppConfig`]: tool
//! registry, LLM provider, vector memory, approval gate, channels, the
//! incident pipeline, and the scheduler. `main.rs` calls [`build`] once at
//! startup and is left holding just the axum router and the scheduler
//! handle.

use std::path::PathBuf;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::ai::providers::ProviderFactory;
use crate::ai::providers::reliable::ReliableProvider;
use crate::approval::ApprovalGate;
use crate::audit::AuditLogWriter;
use crate::channels::{Channel, ChannelManager, TextCommandChannel, WebhookChannel};
use crate::config::schema::AppConfig;
use crate::gateway::{self, GatewayState};
use crate::memory::{EmbeddingProvider, LruEmbeddingCache, MockEmbeddingProvider, SqliteVectorStore, VectorMemory};
use crate::pipeline::IncidentPipeline;
use crate::scheduler::{JobPayload, ReportPeriod, Schedule, ScheduledJob, Scheduler, SchedulerContext, TokioScheduler};
use crate::tools::{
    ClearScratchLogsTool, RestartHypervisorGuestTool, RunDatabaseMaintenanceTool, SendChatMessageTool,
    ServiceStatusTool, ToolRegistry,
};

/// Where state directories live (audit log, vector memory) when not
/// overridden by the config file.
fn state_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".sentinel")
}

/// Everything `main.rs` needs to run the service.
pub struct Orchestrator {
    pub router: axum::Router,
    pub scheduler: Arc<TokioScheduler>,
    pub channel_manager: Arc<ChannelManager>,
}

/// Build the whole dependency graph from `config`.
pub async fn build(config: AppConfig) -> Orchestrator {
    let dir = state_dir();
    std::fs::create_dir_all(&dir).ok();

    // ─── Channels ───────────────────────────────────────────────────────────
    let channel_manager = Arc::new(ChannelManager::new());
    let notify_channel_name = "chat".to_string();
    let mut commands_tx: Option<tokio::sync::mpsc::Sender<crate::channels::ChannelMessage>> = None;

    // ─── LLM provider ───────────────────────────────────────────────────────
    let api_key = std::env::var("SENTINEL_LLM_API_KEY").unwrap_or_default();
    let base_provider = ProviderFactory::create(&config.provider, &api_key)
        .unwrap_or_else(|e| panic!("failed to construct LLM provider '{}': {e}", config.provider.default_id));
    let provider = Arc::new(ReliableProvider::new(base_provider).with_retries(
        config.provider.max_retries,
        std::time::Duration::from_millis(500),
    ));

    // ─── Vector memory ──────────────────────────────────────────────────────
    let memory: Arc<dyn VectorMemory> = if config.memory.enabled {
        let path = dir.join("memory.sqlite3");
        Arc::new(SqliteVectorStore::open(path.to_string_lossy().as_ref()).unwrap_or_else(|e| {
            tracing::warn!("failed to open vector store at {path:?}: {e}, falling back to in-memory");
            SqliteVectorStore::in_memory().expect("in-memory sqlite store must open")
        }))
    } else {
        Arc::new(SqliteVectorStore::in_memory().expect("in-memory sqlite store must open"))
    };

    let embeddings: Arc<dyn EmbeddingProvider> =
        Arc::new(LruEmbeddingCache::new(Box::new(MockEmbeddingProvider::new()), config.memory.embedding_cache_size));

    // ─── Audit log ──────────────────────────────────────────────────────────
    let audit = AuditLogWriter::spawn(Some(dir.join("audit.jsonl")));

    // ─── Approval gate ──────────────────────────────────────────────────────
    let gate = Arc::new(ApprovalGate::new(
        config.critical_targets.clone(),
        &config.approval,
        channel_manager.clone(),
        notify_channel_name.clone(),
    ));

    if let Some(url) = config.webhook.outgoing_url.clone() {
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let webhook: Arc<dyn Channel> = Arc::new(WebhookChannel::new(notify_channel_name.clone(), url, rx));
        let wrapped = Arc::new(TextCommandChannel::new(webhook, gate.clone()));
        match channel_manager.register(wrapped).await {
            Ok(()) => commands_tx = Some(tx),
            Err(e) => tracing::warn!("failed to register chat channel: {e}"),
        }
    }

    if !channel_manager.is_empty().await {
        let (mut rx, _handles) = channel_manager.start_all(64).await;
        tokio::spawn(async move {
            // Non-command messages are already logged by the pipeline's
            // send_chat_message tool; this just drains the aggregated
            // receiver so the per-channel listen tasks never block on it.
            while rx.recv().await.is_some() {}
        });
    }

    // ─── Tools ──────────────────────────────────────────────────────────────
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ServiceStatusTool));
    registry.register(Arc::new(ClearScratchLogsTool));
    registry.register(Arc::new(RestartHypervisorGuestTool));
    registry.register(Arc::new(RunDatabaseMaintenanceTool));
    registry.register(Arc::new(SendChatMessageTool::new(channel_manager.clone(), notify_channel_name.clone())));
    let tools = Arc::new(registry);

    // ─── Incident pipeline ──────────────────────────────────────────────────
    let pipeline = IncidentPipeline::new(
        config.pipeline.clone(),
        tools,
        gate,
        memory.clone(),
        embeddings,
        audit,
        provider,
        config.provider.default_model.clone(),
    );
    let intake = pipeline.spawn_intake();
    let store = pipeline.store();

    // ─── Scheduler ──────────────────────────────────────────────────────────
    let scheduler = TokioScheduler::new(SchedulerContext {
        alert_intake: intake.clone(),
        memory: memory.clone(),
        channel: channel_manager.clone(),
        report_channel: notify_channel_name,
    });

    if config.scheduler.synthetic_alert_interval_seconds > 0 {
        scheduler
            .add_job(ScheduledJob {
                id: String::new(),
                name: "synthetic-self-check".to_string(),
                schedule: Schedule::Interval { secs: config.scheduler.synthetic_alert_interval_seconds },
                payload: JobPayload::SyntheticAlert,
                enabled: true,
                error_count: 0,
                next_run: None,
            })
            .await;
    }
    if config.scheduler.daily_report_enabled {
        scheduler
            .add_job(ScheduledJob {
                id: String::new(),
                name: "daily-report".to_string(),
                schedule: Schedule::Cron { expr: "0 0 * * *".to_string() },
                payload: JobPayload::Report { period: ReportPeriod::Daily },
                enabled: true,
                error_count: 0,
                next_run: None,
            })
            .await;
    }
    if config.scheduler.weekly_report_enabled {
        scheduler
            .add_job(ScheduledJob {
                id: String::new(),
                name: "weekly-report".to_string(),
                schedule: Schedule::Cron { expr: "0 0 * * 1".to_string() },
                payload: JobPayload::Report { period: ReportPeriod::Weekly },
                enabled: true,
                error_count: 0,
                next_run: None,
            })
            .await;
    }

    // ─── Metrics + router ───────────────────────────────────────────────────
    let metrics_handle: PrometheusHandle = crate::metrics::install();
    let router = gateway::router(GatewayState {
        intake,
        store,
        memory,
        metrics_handle,
        webhook_secret: config.webhook.shared_secret.clone(),
        commands: commands_tx,
    });

    Orchestrator { router, scheduler, channel_manager }
}
