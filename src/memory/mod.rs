//! Vector Incident Memory.
//!
//! ```text
//! VectorMemory (trait)
//!   └── SqliteVectorStore        ← rusqlite-backed, brute-force cosine scan
//!         └── EmbeddingProvider (trait)
//!               ├── MockEmbeddingProvider  (deterministic hash-based)
//!               └── LruEmbeddingCache      (caching wrapper)
//! ```
//!
//! Only the Analyst stage calls `similar()`. Records are written once per
//! incident, at terminal status, by the Incident Pipeline.

pub mod embeddings;
pub mod traits;
pub mod vector_store;

pub use embeddings::{EmbeddingProvider, LruEmbeddingCache, MockEmbeddingProvider, cosine_similarity};
pub use traits::VectorMemory;
pub use vector_store::SqliteVectorStore;
