//! `SqliteVectorStore`: a `rusqlite`-backed `VectorMemory` with brute-force
//! cosine scan.
//!
//! Wraps an `Arc<Mutex<Connection>>`. Embeddings are packed as
//! little-endian `f32` bytes into a BLOB column rather than pulled in via a
//! serialisation crate; a native `sqlite-vec` extension was considered and
//! rejected — a full table scan over at most a few thousand closed
//! incidents is microseconds of work at homelab scale.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, params};
use serde_json;
use uuid::Uuid;

use crate::domain::memory::{MemoryPayload, MemoryRecord, MemoryStats};

use super::embeddings::cosine_similarity;
use super::traits::VectorMemory;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY NOT NULL,
    embedding BLOB NOT NULL,
    payload TEXT NOT NULL,
    closed_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_memories_closed_at ON memories (closed_at);
"#;

fn pack_embedding(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn unpack_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVectorStore {
    pub fn open(path: &str) -> Result<Self, String> {
        let conn = Connection::open(path).map_err(|e| format!("sqlite open error: {e}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| format!("sqlite schema error: {e}"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, String> {
        let conn = Connection::open_in_memory().map_err(|e| format!("sqlite open error: {e}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| format!("sqlite schema error: {e}"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, String> {
        self.conn.lock().map_err(|e| format!("sqlite lock error: {e}"))
    }

    fn load_all(&self) -> Result<Vec<(Uuid, Vec<f32>, MemoryPayload)>, String> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, embedding, payload FROM memories")
            .map_err(|e| format!("sqlite prepare error: {e}"))?;
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let embedding: Vec<u8> = row.get(1)?;
                let payload: String = row.get(2)?;
                Ok((id, embedding, payload))
            })
            .map_err(|e| format!("sqlite query error: {e}"))?;

        let mut out = Vec::new();
        for row in rows {
            let (id, embedding, payload) = row.map_err(|e| format!("sqlite row error: {e}"))?;
            let id = Uuid::parse_str(&id).map_err(|e| format!("bad uuid in store: {e}"))?;
            let payload: MemoryPayload =
                serde_json::from_str(&payload).map_err(|e| format!("bad payload json: {e}"))?;
            out.push((id, unpack_embedding(&embedding), payload));
        }
        Ok(out)
    }
}

#[async_trait]
impl VectorMemory for SqliteVectorStore {
    async fn store(&self, record: MemoryRecord) -> Result<(), String> {
        let payload_json =
            serde_json::to_string(&record.payload).map_err(|e| format!("serialise error: {e}"))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO memories (id, embedding, payload, closed_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id.to_string(),
                pack_embedding(&record.embedding),
                payload_json,
                record.payload.closed_at.to_rfc3339(),
            ],
        )
        .map_err(|e| format!("sqlite insert error: {e}"))?;
        Ok(())
    }

    async fn similar(
        &self,
        embedding: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<(MemoryRecord, f32)>, String> {
        let rows = self.load_all()?;
        let mut scored: Vec<(MemoryRecord, f32)> = rows
            .into_iter()
            .map(|(id, stored_embedding, payload)| {
                let score = cosine_similarity(embedding, &stored_embedding);
                (
                    MemoryRecord {
                        id,
                        embedding: stored_embedding,
                        payload,
                    },
                    score,
                )
            })
            .filter(|(_, score)| *score >= min_score)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn stats(&self) -> Result<MemoryStats, String> {
        let rows = self.load_all()?;
        let total = rows.len();
        if total == 0 {
            return Ok(MemoryStats::default());
        }

        let mut resolved = 0usize;
        let mut duration_sum = 0.0;
        let mut cost_sum = 0.0;
        let mut by_severity = std::collections::HashMap::new();

        for (_, _, payload) in &rows {
            if payload.outcome == "resolved" {
                resolved += 1;
            }
            duration_sum += payload.duration_seconds;
            cost_sum += payload.llm_cost_usd;
            *by_severity.entry(payload.severity.clone()).or_insert(0) += 1;
        }

        Ok(MemoryStats {
            total,
            success_rate: resolved as f64 / total as f64,
            avg_duration_seconds: duration_sum / total as f64,
            cost_usd: cost_sum,
            by_severity,
        })
    }
}
