//! In-memory incident directory backing the `/incidents`/`/stats` reads.
//!
//! The owning source of truth for a running incident is the pipeline task
//! driving it; this store only ever sees snapshots pushed by
//! [`super::incident_pipeline::IncidentPipeline`] at creation and at each
//! terminal write.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::incident::Incident;

pub struct IncidentStore {
    incidents: Mutex<HashMap<Uuid, Incident>>,
}

impl IncidentStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            incidents: Mutex::new(HashMap::new()),
        })
    }

    pub async fn upsert(&self, incident: Incident) {
        self.incidents.lock().await.insert(incident.id, incident);
    }

    pub async fn get(&self, id: Uuid) -> Option<Incident> {
        self.incidents.lock().await.get(&id).cloned()
    }

    pub async fn in_flight_count(&self) -> usize {
        self.incidents
            .lock()
            .await
            .values()
            .filter(|i| !i.status.is_terminal())
            .count()
    }

    /// Incidents received at or before `cursor` (exclusive), newest first,
    /// ties broken by id descending so the ordering is total and stable
    /// across snapshots taken between pages.
    pub async fn page(
        &self,
        cursor: Option<(DateTime<Utc>, Uuid)>,
        limit: usize,
    ) -> (Vec<Incident>, Option<(DateTime<Utc>, Uuid)>) {
        let incidents = self.incidents.lock().await;
        let mut sorted: Vec<&Incident> = incidents.values().collect();
        sorted.sort_by(|a, b| (b.received_at, b.id).cmp(&(a.received_at, a.id)));

        let start = match cursor {
            Some(after) => sorted
                .iter()
                .position(|i| (i.received_at, i.id) < after)
                .unwrap_or(sorted.len()),
            None => 0,
        };

        let page: Vec<Incident> = sorted[start..]
            .iter()
            .take(limit)
            .map(|i| (*i).clone())
            .collect();
        let next_cursor = page.last().map(|i| (i.received_at, i.id));
        let has_more = start + page.len() < sorted.len();
        (page, if has_more { next_cursor } else { None })
    }
}
