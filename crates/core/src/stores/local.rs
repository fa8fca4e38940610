use crate::store::euclidean_distance;
use crate::traits::VectorStore;
use crate::{ChunkRecord, ScoredChunk, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

const COLLECTION_FILE: &str = "collection.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collection {
    updated_at: Option<DateTime<Utc>>,
    dimensions: Option<usize>,
    records: BTreeMap<String, ChunkRecord>,
}

/// A vector collection kept in memory and, unless ephemeral, mirrored to
/// `collection.json` inside its persist directory after every write.
pub struct LocalStore {
    persist_dir: Option<PathBuf>,
    collection: RwLock<Collection>,
}

impl LocalStore {
    /// Opens the collection in `persist_dir`, creating the directory if absent.
    pub async fn open(persist_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let persist_dir = persist_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&persist_dir).await?;

        let collection = match tokio::fs::read(persist_dir.join(COLLECTION_FILE)).await {
            Ok(bytes) => serde_json::from_slice::<Collection>(&bytes).map_err(|error| {
                StoreError::Corrupt(format!("{}: {error}", persist_dir.display()))
            })?,
            Err(error) if error.kind() == ErrorKind::NotFound => Collection::default(),
            Err(error) => return Err(error.into()),
        };

        debug!(
            path = %persist_dir.display(),
            records = collection.records.len(),
            "opened local collection"
        );

        Ok(Self {
            persist_dir: Some(persist_dir),
            collection: RwLock::new(collection),
        })
    }

    /// An in-memory store that never touches disk.
    pub fn ephemeral() -> Self {
        Self {
            persist_dir: None,
            collection: RwLock::new(Collection::default()),
        }
    }

    async fn persist(&self, collection: &Collection) -> Result<(), StoreError> {
        let Some(dir) = &self.persist_dir else {
            return Ok(());
        };

        let bytes = serde_json::to_vec(collection)?;
        let staging = dir.join(format!("{COLLECTION_FILE}.tmp"));
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, dir.join(COLLECTION_FILE)).await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LocalStore {
    fn backend(&self) -> &str {
        "local"
    }

    async fn existing_ids(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.collection.read().await.records.keys().cloned().collect())
    }

    async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut collection = self.collection.write().await;
        let expected = collection
            .dimensions
            .unwrap_or_else(|| records[0].vector.len());

        if let Some(record) = records.iter().find(|record| record.vector.len() != expected) {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: record.vector.len(),
            });
        }

        let previous_dimensions = collection.dimensions.replace(expected);
        let previous_updated_at = collection.updated_at.replace(Utc::now());
        let replaced: Vec<(String, Option<ChunkRecord>)> = records
            .into_iter()
            .map(|record| {
                let id = record.id.clone();
                let old = collection.records.insert(id.clone(), record);
                (id, old)
            })
            .collect();

        if let Err(error) = self.persist(&collection).await {
            // Memory must not claim records the disk does not hold.
            for (id, old) in replaced.into_iter().rev() {
                match old {
                    Some(record) => collection.records.insert(id, record),
                    None => collection.records.remove(&id),
                };
            }
            collection.dimensions = previous_dimensions;
            collection.updated_at = previous_updated_at;
            return Err(error);
        }

        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        let collection = self.collection.read().await;
        if let Some(expected) = collection.dimensions {
            if vector.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let mut scored: Vec<ScoredChunk> = collection
            .records
            .values()
            .map(|record| ScoredChunk {
                id: record.id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                distance: euclidean_distance(vector, &record.vector),
            })
            .collect();

        scored.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        scored.truncate(k);
        Ok(scored)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut collection = self.collection.write().await;

        if let Some(dir) = &self.persist_dir {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => {}
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => return Err(error.into()),
            }
            tokio::fs::create_dir_all(dir).await?;
        }

        *collection = Collection::default();
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.collection.read().await.records.len())
    }
}
