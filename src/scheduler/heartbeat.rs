//! Error back-off ladder shared by every scheduled job kind.

/// Default synthetic self-check interval in seconds (five minutes).
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 5 * 60;

/// Error back-off levels in seconds: 30s → 60s → 300s → 900s → 3600s.
pub const ERROR_BACKOFF_SECS: &[u64] = &[30, 60, 300, 900, 3_600];

/// Return the back-off delay for `error_count` consecutive failures.
///
/// After `ERROR_BACKOFF_SECS.len()` failures the maximum back-off is used.
pub fn backoff_secs(error_count: u32) -> u64 {
    let idx = (error_count as usize).min(ERROR_BACKOFF_SECS.len() - 1);
    ERROR_BACKOFF_SECS[idx]
}
