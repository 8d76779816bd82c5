//! Background job scheduler.
//!
//! # Architecture
//! ```text
//! Scheduler (trait)
//!   └── TokioScheduler          ← Tokio-driven in-memory scheduler
//!         ├── Schedule            ← Interval | Cron
//!         ├── JobPayload          ← SyntheticAlert | Report { period }
//!         └── heartbeat           ← shared error back-off ladder
//! ```
//!
//! # Key behaviours
//! - Ticks every second; executes due jobs concurrently via `tokio::spawn`
//! - Stuck detection: jobs running > 120s are recorded as `JobStatus::Stuck`
//! - Error back-off: `30s → 60s → 300s → 900s → 3600s`
//! - History ring-buffer: last 100 executions per job
//!
//! Jobs are process-lifetime only; nothing here is persisted to disk.

pub mod heartbeat;
pub mod tokio_scheduler;
pub mod traits;

pub use heartbeat::{DEFAULT_HEARTBEAT_INTERVAL_SECS, ERROR_BACKOFF_SECS, backoff_secs};
pub use tokio_scheduler::{SchedulerContext, TokioScheduler};
pub use traits::{
    JobExecution, JobId, JobPayload, JobStatus, ReportPeriod, Schedule, ScheduledJob, Scheduler,
};
