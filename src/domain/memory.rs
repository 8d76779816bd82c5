//! The vector-indexed memory record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Per-incident payload snapshot stored alongside the embedding. Kept
/// deliberately flat, with no back-references to the live `Incident`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPayload {
    pub fingerprint: String,
    pub severity: String,
    pub labels: HashMap<String, String>,
    pub stage_summaries: HashMap<String, String>,
    pub outcome: String,
    pub tools_used: Vec<String>,
    pub duration_seconds: f64,
    pub llm_cost_usd: f64,
    pub closed_at: DateTime<Utc>,
}

/// `id == Incident.id`; written once, at terminal status (§3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub embedding: Vec<f32>,
    pub payload: MemoryPayload,
}

/// Aggregate statistics computed by scanning stored records (§4.3.X — no
/// separate aggregate table).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: usize,
    pub success_rate: f64,
    pub avg_duration_seconds: f64,
    pub cost_usd: f64,
    pub by_severity: HashMap<String, usize>,
}
