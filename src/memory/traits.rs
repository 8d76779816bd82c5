//! The `VectorMemory` trait: storage and cosine-similarity recall over
//! closed incidents.

use async_trait::async_trait;

use crate::domain::memory::{MemoryRecord, MemoryStats};

/// Abstraction over the vector-indexed incident memory store. The Analyst
/// stage is the only caller of `similar()` — memory injection is narrowed
/// to the Analyst role.
#[async_trait]
pub trait VectorMemory: Send + Sync {
    /// Persist a closed incident's record. Called exactly once, at terminal
    /// status, with `MemoryRecord.id == Incident.id`.
    async fn store(&self, record: MemoryRecord) -> Result<(), String>;

    /// Return up to `top_k` records with cosine similarity to `embedding` at
    /// or above `min_score`, sorted by descending similarity.
    async fn similar(
        &self,
        embedding: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<(MemoryRecord, f32)>, String>;

    /// Aggregate stats over all stored records, for `/stats` and the
    /// scheduled report jobs.
    async fn stats(&self) -> Result<MemoryStats, String>;
}
