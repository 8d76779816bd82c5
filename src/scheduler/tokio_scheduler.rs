//! Tokio-backed scheduler implementation.
//!
//! `TokioScheduler` drives a background task that wakes every second, scans
//! for due jobs, executes them, records history, and reschedules. A
//! watch-channel carries the stop signal, the job map sits behind an
//! `RwLock`, each due job runs in its own `tokio::spawn`, and a
//! `tokio::time::timeout` flags jobs that run long. Jobs are process-lifetime
//! only — a job's work is driven directly against the incident pipeline's
//! intake queue and the vector memory store.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::channels::ChannelManager;
use crate::domain::alert::{Alert, AlertStatus};
use crate::memory::VectorMemory;

use super::heartbeat::backoff_secs;
use super::traits::{
    JobExecution, JobId, JobPayload, JobStatus, ReportPeriod, Schedule, ScheduledJob, Scheduler,
};

// ─── Constants ────────────────────────────────────────────────────────────────

/// Maximum execution time before a job is flagged as stuck.
const STUCK_THRESHOLD_SECS: u64 = 120;

/// Scheduler tick interval — how often we check for due jobs.
const TICK_INTERVAL_SECS: u64 = 1;

/// Maximum history entries kept per job.
const MAX_HISTORY_PER_JOB: usize = 100;

// ─── Internal state ───────────────────────────────────────────────────────────

type JobMap = HashMap<JobId, ScheduledJob>;
type HistoryMap = HashMap<JobId, Vec<JobExecution>>;

/// Everything a job's execution needs that isn't in its own payload.
pub struct SchedulerContext {
    pub alert_intake: mpsc::Sender<Alert>,
    pub memory: Arc<dyn VectorMemory>,
    pub channel: Arc<ChannelManager>,
    pub report_channel: String,
}

// ─── TokioScheduler ───────────────────────────────────────────────────────────

/// In-memory, Tokio-driven scheduler for synthetic self-check alerts and
/// periodic incident-memory report jobs.
pub struct TokioScheduler {
    jobs: Arc<RwLock<JobMap>>,
    history: Arc<RwLock<HistoryMap>>,
    ctx: Arc<SchedulerContext>,
    /// Send `true` to stop the background task.
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl TokioScheduler {
    pub fn new(ctx: SchedulerContext) -> Arc<Self> {
        let (stop_tx, stop_rx) = watch::channel(false);
        Arc::new(Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            history: Arc::new(RwLock::new(HashMap::new())),
            ctx: Arc::new(ctx),
            stop_tx,
            stop_rx,
        })
    }

    /// Compute the next run time for a job based on its schedule.
    ///
    /// Returns `None` if the schedule cannot be parsed (invalid cron expression).
    pub fn compute_next_run(schedule: &Schedule) -> Option<DateTime<Utc>> {
        match schedule {
            Schedule::Interval { secs } => Some(Utc::now() + chrono::Duration::seconds(*secs as i64)),
            Schedule::Cron { expr } => {
                use std::str::FromStr;
                // The `cron` crate expects a 6-field expression (sec min hr dom mon dow).
                // We support either 5-field (min hr dom mon dow) or 6-field.
                let full_expr = if expr.split_whitespace().count() == 5 {
                    format!("0 {expr}")
                } else {
                    expr.clone()
                };
                cron::Schedule::from_str(&full_expr).ok()?.upcoming(Utc).next()
            }
        }
    }

    fn record_history(history: &Arc<RwLock<HistoryMap>>, exec: JobExecution) {
        if let Ok(mut map) = history.write() {
            let entries = map.entry(exec.job_id.clone()).or_default();
            entries.insert(0, exec);
            entries.truncate(MAX_HISTORY_PER_JOB);
        }
    }
}

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn start(&self) {
        let jobs = self.jobs.clone();
        let history = self.history.clone();
        let ctx = self.ctx.clone();
        let mut stop_rx = self.stop_rx.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(TICK_INTERVAL_SECS));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let due: Vec<ScheduledJob> = {
                            let guard = match jobs.read() {
                                Ok(g) => g,
                                Err(_) => continue,
                            };
                            guard
                                .values()
                                .filter(|j| j.enabled)
                                .filter(|j| j.next_run.is_some_and(|t| t <= Utc::now()))
                                .cloned()
                                .collect()
                        };

                        for job in due {
                            let started_at = Utc::now();
                            let history_clone = history.clone();
                            let jobs_clone = jobs.clone();
                            let ctx_clone = ctx.clone();
                            let job_clone = job.clone();

                            tokio::spawn(async move {
                                let timeout = Duration::from_secs(STUCK_THRESHOLD_SECS);
                                let result = tokio::time::timeout(timeout, execute_job(&job_clone, &ctx_clone)).await;

                                let (status, output) = match result {
                                    Ok((s, o)) => (s, o),
                                    Err(_) => {
                                        tracing::warn!(job = %job_clone.name, "scheduler: job stuck after {STUCK_THRESHOLD_SECS}s");
                                        (JobStatus::Stuck, "execution timed out".to_string())
                                    }
                                };

                                let finished_at = Utc::now();
                                Self::record_history(&history_clone, JobExecution {
                                    job_id: job_clone.id.clone(),
                                    started_at,
                                    finished_at,
                                    status: status.clone(),
                                    output,
                                });

                                if let Ok(mut map) = jobs_clone.write() {
                                    if let Some(j) = map.get_mut(&job_clone.id) {
                                        if status == JobStatus::Success {
                                            j.error_count = 0;
                                        } else if status == JobStatus::Failed {
                                            j.error_count += 1;
                                            j.next_run = Some(Utc::now() + chrono::Duration::seconds(backoff_secs(j.error_count) as i64));
                                            return;
                                        }
                                        j.next_run = Self::compute_next_run(&j.schedule);
                                    }
                                }
                            });
                        }
                    }
                    Ok(()) = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    async fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    async fn add_job(&self, mut job: ScheduledJob) -> JobId {
        if job.id.is_empty() {
            job.id = Uuid::new_v4().to_string();
        }
        job.next_run = Self::compute_next_run(&job.schedule);

        let id = job.id.clone();
        if let Ok(mut map) = self.jobs.write() {
            map.insert(id.clone(), job);
        }
        id
    }

    async fn remove_job(&self, id: &JobId) -> bool {
        self.jobs.write().map(|mut m| m.remove(id).is_some()).unwrap_or(false)
    }

    async fn list_jobs(&self) -> Vec<ScheduledJob> {
        self.jobs
            .read()
            .map(|m| {
                let mut jobs: Vec<ScheduledJob> = m.values().cloned().collect();
                jobs.sort_by(|a, b| a.name.cmp(&b.name));
                jobs
            })
            .unwrap_or_default()
    }

    async fn job_history(&self, id: &JobId) -> Vec<JobExecution> {
        self.history.read().map(|m| m.get(id).cloned().unwrap_or_default()).unwrap_or_default()
    }
}

// ─── execute_job ─────────────────────────────────────────────────────────────

async fn execute_job(job: &ScheduledJob, ctx: &SchedulerContext) -> (JobStatus, String) {
    match &job.payload {
        JobPayload::SyntheticAlert => {
            let now = Utc::now();
            let alert = Alert {
                fingerprint: format!("synthetic-{}", now.timestamp_millis()),
                status: AlertStatus::Firing,
                severity: "info".to_string(),
                labels: HashMap::from([("source".to_string(), "scheduler".to_string())]),
                annotations: HashMap::from([(
                    "description".to_string(),
                    "periodic self-check: exercises the pipeline end to end".to_string(),
                )]),
                starts_at: now,
                ends_at: None,
                generator_url: None,
            };
            match ctx.alert_intake.try_send(alert) {
                Ok(()) => (JobStatus::Success, "synthetic alert enqueued".to_string()),
                Err(_) => (JobStatus::Skipped, "intake queue full, synthetic alert dropped".to_string()),
            }
        }
        JobPayload::Report { period } => {
            let stats = match ctx.memory.stats().await {
                Ok(s) => s,
                Err(e) => return (JobStatus::Failed, format!("stats unavailable: {e}")),
            };
            let label = match period {
                ReportPeriod::Daily => "daily",
                ReportPeriod::Weekly => "weekly",
            };
            let message = format!(
                "{label} report: {} incidents, {:.0}% resolved, avg {:.0}s, ${:.2} in LLM cost",
                stats.total,
                stats.success_rate * 100.0,
                stats.avg_duration_seconds,
                stats.cost_usd,
            );
            match ctx.channel.send(&ctx.report_channel, &message, None).await {
                Ok(()) => (JobStatus::Success, message),
                Err(e) => (JobStatus::Failed, format!("report delivery failed: {e}")),
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SqliteVectorStore;

    fn make_scheduler() -> (Arc<TokioScheduler>, mpsc::Receiver<Alert>) {
        let (tx, rx) = mpsc::channel(8);
        let channel = Arc::new(ChannelManager::new());
        let memory: Arc<dyn VectorMemory> = Arc::new(SqliteVectorStore::in_memory().unwrap());
        let scheduler = TokioScheduler::new(SchedulerContext {
            alert_intake: tx,
            memory,
            channel,
            report_channel: "notifications".to_string(),
        });
        (scheduler, rx)
    }

    fn interval_job(name: &str, secs: u64, payload: JobPayload) -> ScheduledJob {
        ScheduledJob {
            id: String::new(),
            name: name.to_string(),
            schedule: Schedule::Interval { secs },
            payload,
            enabled: true,
            error_count: 0,
            next_run: None,
        }
    }

    #[tokio::test]
    async fn add_and_list_job() {
        let (scheduler, _rx) = make_scheduler();
        let id = scheduler.add_job(interval_job("self-check", 60, JobPayload::SyntheticAlert)).await;

        let jobs = scheduler.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
        assert_eq!(jobs[0].name, "self-check");
    }

    #[tokio::test]
    async fn remove_existing_job_returns_true() {
        let (scheduler, _rx) = make_scheduler();
        let id = scheduler.add_job(interval_job("j", 10, JobPayload::SyntheticAlert)).await;
        assert!(scheduler.remove_job(&id).await);
        assert!(scheduler.list_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn remove_nonexistent_job_returns_false() {
        let (scheduler, _rx) = make_scheduler();
        assert!(!scheduler.remove_job(&"no-such-id".to_string()).await);
    }

    #[tokio::test]
    async fn add_job_assigns_id_when_empty() {
        let (scheduler, _rx) = make_scheduler();
        let id = scheduler.add_job(interval_job("j", 10, JobPayload::SyntheticAlert)).await;
        assert!(!id.is_empty());
    }

    #[tokio::test]
    async fn job_history_empty_for_new_job() {
        let (scheduler, _rx) = make_scheduler();
        let id = scheduler.add_job(interval_job("j", 10, JobPayload::SyntheticAlert)).await;
        assert!(scheduler.job_history(&id).await.is_empty());
    }

    #[test]
    fn compute_next_run_interval() {
        let before = Utc::now();
        let next = TokioScheduler::compute_next_run(&Schedule::Interval { secs: 300 });
        assert!(next.unwrap() > before);
    }

    #[test]
    fn compute_next_run_cron_valid() {
        let next = TokioScheduler::compute_next_run(&Schedule::Cron { expr: "* * * * *".to_string() });
        assert!(next.is_some());
    }

    #[test]
    fn compute_next_run_cron_invalid() {
        let next = TokioScheduler::compute_next_run(&Schedule::Cron { expr: "not a cron expression".to_string() });
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn list_jobs_sorted_by_name() {
        let (scheduler, _rx) = make_scheduler();
        scheduler.add_job(interval_job("zebra", 10, JobPayload::SyntheticAlert)).await;
        scheduler.add_job(interval_job("alpha", 10, JobPayload::SyntheticAlert)).await;
        scheduler.add_job(interval_job("mango", 10, JobPayload::SyntheticAlert)).await;

        let jobs = scheduler.list_jobs().await;
        let names: Vec<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mango", "zebra"]);
    }

    #[tokio::test]
    async fn synthetic_alert_job_enqueues_into_intake() {
        let (scheduler, mut rx) = make_scheduler();
        let job = interval_job("self-check", 60, JobPayload::SyntheticAlert);
        let id = scheduler.add_job(job.clone()).await;
        let mut j = job;
        j.id = id;
        let (status, _) = execute_job(&j, &scheduler.ctx).await;
        assert_eq!(status, JobStatus::Success);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn report_job_reads_memory_stats() {
        let (scheduler, _rx) = make_scheduler();
        scheduler.ctx.channel.register(Arc::new(test_channel("notifications"))).await.unwrap();
        let job = interval_job("daily-report", 86_400, JobPayload::Report { period: ReportPeriod::Daily });
        let (status, output) = execute_job(&job, &scheduler.ctx).await;
        assert_eq!(status, JobStatus::Success);
        assert!(output.contains("daily report"));
    }

    fn test_channel(name: &'static str) -> impl crate::channels::Channel {
        struct Noop(&'static str);
        #[async_trait::async_trait]
        impl crate::channels::Channel for Noop {
            fn name(&self) -> &str {
                self.0
            }
            async fn send(&self, _msg: &str, _r: Option<&str>) -> Result<(), String> {
                Ok(())
            }
            async fn listen(&self, _tx: mpsc::Sender<crate::channels::ChannelMessage>) -> Result<(), String> {
                Ok(())
            }
            async fn health_check(&self) -> bool {
                true
            }
        }
        Noop(name)
    }
}
