//! Fingerprint dedup table.
//!
//! A process-wide `fingerprint -> incidentId` map, mutex-guarded. A parallel
//! `fingerprint -> Instant` map of recently-terminated incidents implements
//! a grace window: a duplicate alert for a fingerprint that closed moments
//! ago starts a fresh incident instead of reopening the old one.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use uuid::Uuid;

/// What [`FingerprintDedup::intake`] decided for an incoming alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeDecision {
    /// No in-flight or recently-terminated incident shares this
    /// fingerprint: start a new one.
    New,
    /// An in-flight incident already owns this fingerprint: merge.
    Merge(Uuid),
}

pub struct FingerprintDedup {
    in_flight: Mutex<HashMap<String, Uuid>>,
    terminated_recently: Mutex<HashMap<String, Instant>>,
    window: Duration,
}

impl FingerprintDedup {
    pub fn new(window: Duration) -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            terminated_recently: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Decide whether `fingerprint` starts a new incident or merges into an
    /// in-flight one. Registers the new incident id as in-flight on `New`.
    pub async fn intake(&self, fingerprint: &str, new_id: Uuid) -> IntakeDecision {
        let mut in_flight = self.in_flight.lock().await;
        if let Some(existing) = in_flight.get(fingerprint) {
            return IntakeDecision::Merge(*existing);
        }

        // A recently-terminated incident doesn't block a new one starting —
        // the window only exists to decide *this*, it never extends dedup.
        in_flight.insert(fingerprint.to_string(), new_id);
        IntakeDecision::New
    }

    /// Mark `fingerprint` terminated: removes it from the in-flight map and
    /// records the termination instant for the dedup window.
    pub async fn terminate(&self, fingerprint: &str) {
        self.in_flight.lock().await.remove(fingerprint);
        self.terminated_recently
            .lock()
            .await
            .insert(fingerprint.to_string(), Instant::now());
    }

    /// True if `fingerprint` terminated within the configured window.
    #[allow(dead_code)]
    pub async fn terminated_within_window(&self, fingerprint: &str) -> bool {
        self.terminated_recently
            .lock()
            .await
            .get(fingerprint)
            .is_some_and(|at| at.elapsed() < self.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_alert_starts_new_incident() {
        let dedup = FingerprintDedup::new(Duration::from_secs(60));
        let decision = dedup.intake("abc", Uuid::new_v4()).await;
        assert_eq!(decision, IntakeDecision::New);
    }

    #[tokio::test]
    async fn duplicate_in_flight_fingerprint_merges() {
        let dedup = FingerprintDedup::new(Duration::from_secs(60));
        let id = Uuid::new_v4();
        dedup.intake("abc", id).await;
        let decision = dedup.intake("abc", Uuid::new_v4()).await;
        assert_eq!(decision, IntakeDecision::Merge(id));
    }

    #[tokio::test]
    async fn terminated_fingerprint_allows_new_incident() {
        let dedup = FingerprintDedup::new(Duration::from_secs(60));
        let id = Uuid::new_v4();
        dedup.intake("abc", id).await;
        dedup.terminate("abc").await;
        let decision = dedup.intake("abc", Uuid::new_v4()).await;
        assert_eq!(decision, IntakeDecision::New);
        assert!(dedup.terminated_within_window("abc").await);
    }
}
