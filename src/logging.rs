//! Process-wide `tracing` setup.
//!
//! `EnvFilter` plus a `tracing-appender` non-blocking writer, with a
//! `tracing-log::LogTracer` bridge so dependencies still emitting `log`
//! records show up in the same stream. Logs go to stdout by default, or to
//! a configured directory when the process runs headless.

use std::path::PathBuf;
use std::sync::OnceLock;

// Keeps the non-blocking writer alive for the lifetime of the process.
static GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Initialise the global tracing subscriber.
///
/// Verbosity is controlled by `RUST_LOG` (defaults to `info`). When `log_dir`
/// is `Some`, logs are additionally written as daily-rolling files there;
/// otherwise logs go to stdout only. `log::` call sites (from dependencies
/// still using the `log` facade) are forwarded into the same pipeline.
pub fn init(log_dir: Option<PathBuf>) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir).ok();
            let file_appender = tracing_appender::rolling::daily(&dir, "homelab-sentinel.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let _ = GUARD.set(guard);
            registry
                .with(tracing_subscriber::fmt::layer().with_ansi(true))
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .try_init()
                .ok();
        }
        None => {
            registry
                .with(tracing_subscriber::fmt::layer())
                .try_init()
                .ok();
        }
    }

    tracing_log::LogTracer::init().ok();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "homelab-sentinel starting");
}
