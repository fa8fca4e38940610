use crate::{ChunkRecord, ScoredChunk, StoreError};
use async_trait::async_trait;
use std::collections::HashSet;

/// Persistence and similarity search over `(id, vector, text, metadata)`
/// tuples. Implementations must tolerate concurrent readers and writers.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn backend(&self) -> &str;

    async fn existing_ids(&self) -> Result<HashSet<String>, StoreError>;

    /// Inserts records, replacing any record that already has the same id.
    async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<(), StoreError>;

    /// The `k` records closest to `vector`, nearest first.
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, StoreError>;

    /// Destroys everything stored and leaves an empty, usable store.
    async fn clear(&self) -> Result<(), StoreError>;

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.existing_ids().await?.len())
    }
}
