//! The Incident Pipeline: intake queue, bounded worker pool, and the
//! four-stage Monitor → Analyst → Healer → Communicator state machine.
//!
//! A `Semaphore` bounds how many incidents run concurrently; each permitted
//! incident gets its own `tokio::spawn` rather than a joined batch, since
//! incidents finish independently and nothing waits on the full set. A
//! mutex-guarded fingerprint map tracks in-flight incidents so a duplicate
//! alert gets merged into the incident already handling it instead of
//! starting a second run.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Semaphore, mpsc};
use uuid::Uuid;

use crate::agent::{AgentRunner, StageRole};
use crate::ai::provider::{CostSink, LLMProvider};
use crate::approval::ApprovalGate;
use crate::audit::AuditLogWriter;
use crate::config::schema::PipelineConfig;
use crate::domain::alert::{Alert, AlertStatus};
use crate::domain::incident::{Incident, IncidentStatus, Outcome, StageOutput, ToolOutcome};
use crate::domain::memory::{MemoryPayload, MemoryRecord};
use crate::error::SentinelError;
use crate::memory::VectorMemory;
use crate::memory::embeddings::EmbeddingProvider;
use crate::tools::risk::RiskTag;
use crate::tools::traits::{ExecContext, KeyedMutex};
use crate::tools::ToolRegistry;

use super::dedup::{FingerprintDedup, IntakeDecision};
use super::store::IncidentStore;

/// Prefix the Analyst's system prompt instructs it to lead its final verdict
/// with when no remediation is warranted — the signal `drive_incident` reads
/// to take the "analyst decides benign" branch of the incident state machine.
const BENIGN_PREFIX: &str = "benign:";

const MONITOR_PROMPT: &str = "You are the Monitor stage of an automated incident-response pipeline for a homelab. Use the available read-only tools to gather evidence about the firing alert. When you have enough signal, reply with a concise diagnostic summary and issue no further tool calls.";

const ANALYST_PROMPT: &str = "You are the Analyst stage. Review the Monitor's findings and any similar past incidents. Decide whether this alert warrants remediation. If it does not — a transient blip, expected maintenance, noise — reply with your final verdict prefixed exactly with \"BENIGN:\" followed by your reasoning. Otherwise prefix it with \"ACTIONABLE:\" and describe what should be remediated.";

const HEALER_PROMPT: &str = "You are the Healer stage. Use the available tools to remediate the incident, preferring the least disruptive action that resolves it. Mutating a critical target will pause for human approval; if it is rejected, say so plainly in your final reply. If no action is safe or necessary, say so and issue no further tool calls.";

const COMMUNICATOR_PROMPT: &str = "You are the Communicator stage. Send exactly one status message via the send_chat_message tool summarising what happened and the outcome, then reply with a short confirmation.";

fn system_prompt(role: StageRole) -> &'static str {
    match role {
        StageRole::Monitor => MONITOR_PROMPT,
        StageRole::Analyst => ANALYST_PROMPT,
        StageRole::Healer => HEALER_PROMPT,
        StageRole::Communicator => COMMUNICATOR_PROMPT,
    }
}

fn verdict_is_benign(verdict: &str) -> bool {
    verdict.trim_start().to_ascii_lowercase().starts_with(BENIGN_PREFIX)
}

/// Accumulates a running incident's token usage across its sequential
/// stages. Atomics are enough — stages never overlap within one incident.
#[derive(Default)]
struct IncidentCostSink {
    tokens_in: AtomicU64,
    tokens_out: AtomicU64,
}

impl CostSink for IncidentCostSink {
    fn record(&self, tokens_in: u64, tokens_out: u64, _usd: f64) {
        self.tokens_in.fetch_add(tokens_in, Ordering::Relaxed);
        self.tokens_out.fetch_add(tokens_out, Ordering::Relaxed);
    }
}

impl IncidentCostSink {
    fn apply(&self, incident: &mut Incident) {
        let tokens_in = self.tokens_in.load(Ordering::Relaxed);
        let tokens_out = self.tokens_out.load(Ordering::Relaxed);
        incident.llm_cost.add(tokens_in, tokens_out, 0.0);
        crate::metrics::record_llm_tokens(tokens_in + tokens_out);
    }
}

fn drain_merges(incident: &mut Incident, merge_rx: &mut mpsc::UnboundedReceiver<Alert>) {
    while let Ok(alert) = merge_rx.try_recv() {
        incident.merge_duplicate(alert);
    }
}

fn build_payload(incident: &Incident) -> MemoryPayload {
    let stage_summaries = incident
        .stage_outputs
        .iter()
        .map(|s| (s.stage.as_str().to_string(), s.verdict.clone()))
        .collect();
    let tools_used = incident.tools_used.iter().map(|t| t.name.clone()).collect();
    let closed_at = incident.closed_at.unwrap_or(incident.received_at);
    let duration_seconds = (closed_at - incident.received_at).num_milliseconds() as f64 / 1000.0;
    MemoryPayload {
        fingerprint: incident.fingerprint.clone(),
        severity: incident.severity.clone(),
        labels: incident.alert.labels.clone(),
        stage_summaries,
        outcome: incident
            .outcome
            .map(|o| format!("{o:?}").to_lowercase())
            .unwrap_or_default(),
        tools_used,
        duration_seconds,
        llm_cost_usd: incident.llm_cost.usd,
        closed_at,
    }
}

/// Everything the pipeline needs to drive an incident end to end, wired
/// once at startup by the top-level orchestrator.
pub struct IncidentPipeline {
    config: PipelineConfig,
    dedup: FingerprintDedup,
    store: Arc<IncidentStore>,
    merge_txs: Mutex<HashMap<String, mpsc::UnboundedSender<Alert>>>,
    worker_semaphore: Arc<Semaphore>,
    tools: Arc<ToolRegistry>,
    gate: Arc<ApprovalGate>,
    memory: Arc<dyn VectorMemory>,
    embeddings: Arc<dyn EmbeddingProvider>,
    audit: Arc<AuditLogWriter>,
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl IncidentPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PipelineConfig,
        tools: Arc<ToolRegistry>,
        gate: Arc<ApprovalGate>,
        memory: Arc<dyn VectorMemory>,
        embeddings: Arc<dyn EmbeddingProvider>,
        audit: Arc<AuditLogWriter>,
        provider: Arc<dyn LLMProvider>,
        model: impl Into<String>,
    ) -> Arc<Self> {
        let worker_semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        let dedup = FingerprintDedup::new(Duration::from_secs(config.dedup_window_seconds));
        Arc::new(Self {
            config,
            dedup,
            store: IncidentStore::new(),
            merge_txs: Mutex::new(HashMap::new()),
            worker_semaphore,
            tools,
            gate,
            memory,
            embeddings,
            audit,
            provider,
            model: model.into(),
        })
    }

    pub fn store(&self) -> Arc<IncidentStore> {
        self.store.clone()
    }

    /// Spawn the intake consumer and return the bounded sender callers
    /// (the webhook handler, the scheduler) push alerts into.
    pub fn spawn_intake(self: &Arc<Self>) -> mpsc::Sender<Alert> {
        let (tx, mut rx) = mpsc::channel(self.config.queue_size);
        let pipeline = self.clone();
        tokio::spawn(async move {
            while let Some(alert) = rx.recv().await {
                pipeline.clone().dispatch(alert).await;
            }
        });
        tx
    }

    /// Route one inbound alert: merge into an in-flight incident sharing its
    /// fingerprint, or start a new pipeline run bounded by the worker pool.
    pub async fn dispatch(self: Arc<Self>, alert: Alert) {
        let incident = Incident::new(alert.clone());
        let decision = self.dedup.intake(&incident.fingerprint, incident.id).await;

        if let IntakeDecision::Merge(_existing_id) = decision {
            let delivered = {
                let merges = self.merge_txs.lock().await;
                merges
                    .get(&alert.fingerprint)
                    .map(|tx| tx.send(alert.clone()).is_ok())
            };
            if delivered != Some(true) {
                tracing::warn!(
                    fingerprint = %alert.fingerprint,
                    "dedup: owning incident already finished, dropping duplicate alert"
                );
            }
            return;
        }

        let (merge_tx, merge_rx) = mpsc::unbounded_channel();
        self.merge_txs
            .lock()
            .await
            .insert(incident.fingerprint.clone(), merge_tx);
        self.store.upsert(incident.clone()).await;

        let permit = self
            .worker_semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("worker semaphore is never closed");
        crate::metrics::set_incidents_in_flight(
            self.config.max_concurrent - self.worker_semaphore.available_permits(),
        );
        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.run_incident(incident, merge_rx).await;
            drop(permit);
            crate::metrics::set_incidents_in_flight(
                pipeline.config.max_concurrent - pipeline.worker_semaphore.available_permits(),
            );
        });
    }

    fn build_runner(&self, role: StageRole, cost_sink: Arc<dyn CostSink>) -> AgentRunner {
        let tools = match role {
            StageRole::Monitor | StageRole::Analyst => {
                Arc::new(self.tools.filtered(|t| t.risk() == RiskTag::Read))
            }
            StageRole::Healer => Arc::new(self.tools.filtered(|_| true)),
            StageRole::Communicator => {
                Arc::new(self.tools.filtered(|t| t.name() == "send_chat_message"))
            }
        };

        let runner = AgentRunner::new(
            self.provider.clone(),
            tools,
            self.gate.clone(),
            cost_sink,
            self.model.clone(),
            self.config.tool_call_budget,
        )
        .with_tool_fan_out(self.config.tool_fan_out);

        if role == StageRole::Analyst {
            runner.with_memory(self.memory.clone(), self.embeddings.clone())
        } else {
            runner
        }
    }

    async fn run_stage(
        &self,
        role: StageRole,
        incident: &mut Incident,
        ctx: &ExecContext,
        cost_sink: Arc<dyn CostSink>,
        stage_deadline: Duration,
    ) -> Result<StageOutput, SentinelError> {
        let runner = self.build_runner(role, cost_sink);
        let started = std::time::Instant::now();
        let output = runner
            .run_stage(role, system_prompt(role), incident, ctx, stage_deadline)
            .await?;
        crate::metrics::record_stage_duration(output.stage, started.elapsed().as_secs_f64());
        incident.push_stage_output(output.clone());
        Ok(output)
    }

    /// Run one incident to a terminal state, bounded by the overall
    /// incident deadline, then persist and finalize it.
    async fn run_incident(&self, mut incident: Incident, merge_rx: mpsc::UnboundedReceiver<Alert>) {
        let deadline = Duration::from_secs(self.config.deadline_seconds);
        match tokio::time::timeout(deadline, self.drive_incident(&mut incident, merge_rx)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                incident.finish(IncidentStatus::Failed, Outcome::Failed, format!("stage error: {e}"));
                self.best_effort_communicate(&mut incident).await;
            }
            Err(_) => {
                incident.finish(IncidentStatus::Failed, Outcome::Failed, "incident deadline exceeded");
                self.best_effort_communicate(&mut incident).await;
            }
        }
        self.finalize(incident).await;
    }

    async fn drive_incident(
        &self,
        incident: &mut Incident,
        mut merge_rx: mpsc::UnboundedReceiver<Alert>,
    ) -> Result<(), SentinelError> {
        let ctx = ExecContext::new(
            incident.id,
            false,
            Duration::from_secs(self.config.stage_wall_clock_seconds),
            KeyedMutex::new(),
            self.audit.clone(),
        );
        let stage_deadline = Duration::from_secs(self.config.stage_wall_clock_seconds);
        let cost_sink = Arc::new(IncidentCostSink::default());

        if incident.alert.status == AlertStatus::Resolved {
            incident.status = IncidentStatus::Notifying;
            self.run_stage(StageRole::Communicator, incident, &ctx, cost_sink.clone(), stage_deadline)
                .await?;
            cost_sink.apply(incident);
            incident.finish(IncidentStatus::Resolved, Outcome::Noop, "alert resolved before triage");
            return Ok(());
        }

        incident.status = IncidentStatus::Diagnosing;
        drain_merges(incident, &mut merge_rx);
        self.run_stage(StageRole::Monitor, incident, &ctx, cost_sink.clone(), stage_deadline)
            .await?;

        drain_merges(incident, &mut merge_rx);
        let analyst_output = self
            .run_stage(StageRole::Analyst, incident, &ctx, cost_sink.clone(), stage_deadline)
            .await?;

        if verdict_is_benign(&analyst_output.verdict) {
            incident.status = IncidentStatus::Notifying;
            drain_merges(incident, &mut merge_rx);
            self.run_stage(StageRole::Communicator, incident, &ctx, cost_sink.clone(), stage_deadline)
                .await?;
            cost_sink.apply(incident);
            incident.finish(IncidentStatus::Resolved, Outcome::Noop, "analyst classified the incident as benign");
            return Ok(());
        }

        incident.status = IncidentStatus::Remediating;
        drain_merges(incident, &mut merge_rx);
        let tools_before_healer = incident.tools_used.len();
        self.run_stage(StageRole::Healer, incident, &ctx, cost_sink.clone(), stage_deadline)
            .await?;
        let healer_denied = incident.tools_used[tools_before_healer..]
            .iter()
            .any(|t| t.outcome == ToolOutcome::Denied);

        incident.status = IncidentStatus::Notifying;
        drain_merges(incident, &mut merge_rx);
        self.run_stage(StageRole::Communicator, incident, &ctx, cost_sink.clone(), stage_deadline)
            .await?;
        cost_sink.apply(incident);

        if healer_denied {
            incident.finish(
                IncidentStatus::Escalated,
                Outcome::Escalated,
                "healer remediation was denied for a critical target",
            );
        } else {
            incident.finish(IncidentStatus::Resolved, Outcome::Resolved, "healer remediation completed");
        }
        Ok(())
    }

    /// One last Communicator call on the way to `failed`, with its own
    /// grace budget separate from the deadline that just tripped.
    async fn best_effort_communicate(&self, incident: &mut Incident) {
        let ctx = ExecContext::new(
            incident.id,
            false,
            Duration::from_secs(self.config.stage_wall_clock_seconds),
            KeyedMutex::new(),
            self.audit.clone(),
        );
        let cost_sink = Arc::new(IncidentCostSink::default());
        let grace = Duration::from_secs(self.config.stage_wall_clock_seconds);
        if let Err(e) = self
            .run_stage(StageRole::Communicator, incident, &ctx, cost_sink.clone(), grace)
            .await
        {
            tracing::warn!(error = %e, incident_id = %incident.id, "best-effort communicator call failed");
        }
        cost_sink.apply(incident);
    }

    /// Persist the terminal incident, release its dedup/merge slots, and —
    /// happens-after the terminal state write — upsert its Vector Memory
    /// record.
    async fn finalize(&self, incident: Incident) {
        self.store.upsert(incident.clone()).await;
        self.merge_txs.lock().await.remove(&incident.fingerprint);
        self.dedup.terminate(&incident.fingerprint).await;

        if !incident.status.is_terminal() {
            return;
        }
        let closed_at = incident.closed_at.unwrap_or(incident.received_at);
        let duration_seconds = (closed_at - incident.received_at).num_milliseconds() as f64 / 1000.0;
        crate::metrics::record_incident_terminal(incident.status, incident.outcome, duration_seconds);

        match self.embeddings.embed(&incident.alert.describe()).await {
            Ok(embedding) => {
                let record = MemoryRecord {
                    id: incident.id,
                    embedding,
                    payload: build_payload(&incident),
                };
                self.store_with_retry(record, incident.id).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, incident_id = %incident.id, "embedding failed, incident not written to memory");
            }
        }
    }

    /// Upsert `record` into Vector Memory, retrying exactly once on failure
    /// before logging a persistent failure.
    async fn store_with_retry(&self, record: MemoryRecord, incident_id: Uuid) {
        if let Err(first_err) = self.memory.store(record.clone()).await {
            tracing::warn!(error = %first_err, incident_id = %incident_id, "memory store failed, retrying once");
            if let Err(second_err) = self.memory.store(record).await {
                tracing::warn!(error = %second_err, incident_id = %incident_id, "memory store failed on retry, giving up");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::NullCostSink;
    use crate::ai::types::CompletionResponse;
    use crate::approval::ApprovalGate;
    use crate::channels::manager::ChannelManager;
    use crate::config::schema::{ApprovalConfig, CriticalTargetsConfig};
    use crate::memory::embeddings::MockEmbeddingProvider;
    use crate::memory::vector_store::SqliteVectorStore;
    use crate::tools::builtin::{SendChatMessageTool, ServiceStatusTool};
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::AtomicUsize;

    struct ScriptedProvider {
        responses: Vec<&'static str>,
        index: AtomicUsize,
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn complete(&self, request: CompletionRequest) -> crate::ai::provider::Result<CompletionResponse> {
            let i = self.index.fetch_add(1, Ordering::SeqCst);
            let content = self
                .responses
                .get(i)
                .copied()
                .unwrap_or("ACTIONABLE: fallback")
                .to_string();
            Ok(CompletionResponse {
                content,
                model: request.model,
                usage: None,
                finish_reason: Some("stop".to_string()),
            })
        }
        fn context_limit(&self) -> usize {
            128_000
        }
        fn supports_tools(&self) -> bool {
            true
        }
        fn provider_name(&self) -> &str {
            "scripted"
        }
    }

    use crate::ai::types::CompletionRequest;

    fn alert(fingerprint: &str, status: AlertStatus) -> Alert {
        Alert {
            fingerprint: fingerprint.to_string(),
            status,
            severity: "warning".into(),
            labels: StdHashMap::new(),
            annotations: StdHashMap::new(),
            starts_at: Utc::now(),
            ends_at: None,
            generator_url: None,
        }
    }

    fn test_pipeline(responses: Vec<&'static str>) -> Arc<IncidentPipeline> {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(ServiceStatusTool));
        let channel = Arc::new(ChannelManager::new());
        tools.register(Arc::new(SendChatMessageTool::new(channel.clone(), "notifications")));

        let gate = Arc::new(ApprovalGate::new(
            CriticalTargetsConfig::default(),
            &ApprovalConfig {
                timeout_seconds: 1,
                dry_run: false,
            },
            channel,
            "approvals",
        ));

        IncidentPipeline::new(
            PipelineConfig {
                deadline_seconds: 5,
                max_concurrent: 2,
                queue_size: 8,
                dedup_window_seconds: 60,
                tool_fan_out: 4,
                tool_call_budget: 5,
                stage_wall_clock_seconds: 3,
            },
            Arc::new(tools),
            gate,
            Arc::new(SqliteVectorStore::in_memory().unwrap()),
            Arc::new(MockEmbeddingProvider::default()),
            AuditLogWriter::spawn(None),
            Arc::new(ScriptedProvider {
                responses,
                index: AtomicUsize::new(0),
            }),
            "mock",
        )
    }

    #[tokio::test]
    async fn resolved_alert_takes_fast_path_to_noop() {
        let pipeline = test_pipeline(vec!["resolved, notifying only"]);
        let alert = alert("fp-resolved", AlertStatus::Resolved);
        pipeline.clone().dispatch(alert).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let (page, _) = pipeline.store().page(None, 10).await;
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].status, IncidentStatus::Resolved);
        assert_eq!(page[0].outcome, Some(Outcome::Noop));
    }

    #[tokio::test]
    async fn benign_analyst_verdict_skips_healer() {
        let pipeline = test_pipeline(vec![
            "monitor: disk usage briefly spiked",
            "BENIGN: self-corrected, no action needed",
            "notified",
        ]);
        pipeline.clone().dispatch(alert("fp-benign", AlertStatus::Firing)).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let (page, _) = pipeline.store().page(None, 10).await;
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].outcome, Some(Outcome::Noop));
        assert!(!page[0].stage_outputs.iter().any(|s| s.stage == crate::domain::incident::StageName::Healer));
    }

    #[tokio::test]
    async fn duplicate_fingerprint_merges_instead_of_spawning() {
        let pipeline = test_pipeline(vec!["monitor", "ACTIONABLE: needs fix", "healed", "notified"]);
        let first = alert("fp-dup", AlertStatus::Firing);
        pipeline.clone().dispatch(first).await;
        // Give dispatch time to register the merge sender before the duplicate arrives.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let duplicate = alert("fp-dup", AlertStatus::Firing);
        pipeline.clone().dispatch(duplicate).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let (page, _) = pipeline.store().page(None, 10).await;
        assert_eq!(page.len(), 1, "the duplicate must merge, not spawn a second incident");
        assert_eq!(page[0].alert_count(), 2);
    }

    #[test]
    fn benign_prefix_matching_is_case_insensitive_and_trims_leading_space() {
        assert!(verdict_is_benign("  Benign: nothing to do"));
        assert!(verdict_is_benign("BENIGN: nothing to do"));
        assert!(!verdict_is_benign("ACTIONABLE: do something"));
    }
}
