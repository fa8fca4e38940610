use crate::traits::VectorStore;
use crate::{ChunkMetadata, ChunkRecord, ScoredChunk, StoreError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use uuid::Uuid;

const SCROLL_PAGE: usize = 256;

/// Vector store backed by a Qdrant server's REST API.
///
/// Qdrant only accepts integer or UUID point ids, so each point id is the
/// UUIDv5 of the chunk id and the chunk id itself travels in the payload.
pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    collection_ready: AtomicBool,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
            collection_ready: AtomicBool::new(false),
        }
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.endpoint, self.collection, suffix)
    }

    /// Creates the collection with `vector_size` dimensions unless it exists.
    pub async fn ensure_collection(&self, vector_size: usize) -> Result<(), StoreError> {
        if self.collection_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let response = self.client.get(self.collection_url("")).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(collection = %self.collection, vector_size, "creating qdrant collection");
            let response = self
                .client
                .put(self.collection_url(""))
                .json(&json!({
                    "vectors": { "size": vector_size, "distance": "Euclid" }
                }))
                .send()
                .await?;
            check_status(response).await?;
        } else {
            check_status(response).await?;
        }

        self.collection_ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn scroll_page(&self, offset: Option<Value>) -> Result<Option<(Vec<String>, Option<Value>)>, StoreError> {
        let mut body = json!({
            "limit": SCROLL_PAGE,
            "with_payload": ["chunk_id"],
            "with_vector": false,
        });
        if let Some(offset) = offset {
            body["offset"] = offset;
        }

        let response = self
            .client
            .post(self.collection_url("/points/scroll"))
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let parsed: Value = check_status(response).await?.json().await?;
        let ids = parsed
            .pointer("/result/points")
            .and_then(Value::as_array)
            .map(|points| {
                points
                    .iter()
                    .filter_map(|point| point.pointer("/payload/chunk_id").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let next = parsed
            .pointer("/result/next_page_offset")
            .filter(|value| !value.is_null())
            .cloned();

        Ok(Some((ids, next)))
    }
}

pub fn point_id(chunk_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, chunk_id.as_bytes())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::BackendResponse {
        backend: "qdrant".to_string(),
        details: format!("{status}: {body}"),
    })
}

fn hit_to_scored(hit: &Value) -> Option<ScoredChunk> {
    let payload = hit.get("payload")?;
    let id = payload.get("chunk_id")?.as_str()?.to_string();
    Some(ScoredChunk {
        text: payload
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        metadata: ChunkMetadata {
            id: id.clone(),
            source: payload
                .get("source")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            page: payload
                .get("page")
                .and_then(Value::as_u64)
                .and_then(|page| u32::try_from(page).ok())
                .unwrap_or_default(),
        },
        distance: hit.get("score").and_then(Value::as_f64).unwrap_or(f64::MAX),
        id,
    })
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn backend(&self) -> &str {
        "qdrant"
    }

    async fn existing_ids(&self) -> Result<HashSet<String>, StoreError> {
        let mut ids = HashSet::new();
        let mut offset = None;

        loop {
            let Some((page, next)) = self.scroll_page(offset).await? else {
                return Ok(ids);
            };
            ids.extend(page);
            match next {
                Some(next) => offset = Some(next),
                None => return Ok(ids),
            }
        }
    }

    async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<(), StoreError> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let vector_size = first.vector.len();
        self.ensure_collection(vector_size).await?;

        let points = records
            .iter()
            .map(|record| {
                if record.vector.len() != vector_size {
                    return Err(StoreError::DimensionMismatch {
                        expected: vector_size,
                        actual: record.vector.len(),
                    });
                }

                Ok(json!({
                    "id": point_id(&record.id).to_string(),
                    "vector": record.vector,
                    "payload": {
                        "chunk_id": record.id,
                        "text": record.text,
                        "source": record.metadata.source,
                        "page": record.metadata.page,
                    },
                }))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let response = self
            .client
            .put(self.collection_url("/points?wait=true"))
            .json(&json!({ "points": points }))
            .send()
            .await?;
        check_status(response).await?;

        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        let response = self
            .client
            .post(self.collection_url("/points/search"))
            .json(&json!({
                "vector": vector,
                "limit": k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let parsed: Value = check_status(response).await?.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::BackendResponse {
                backend: "qdrant".to_string(),
                details: "search response has no result array".to_string(),
            })?;

        Ok(hits.iter().filter_map(hit_to_scored).collect())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let response = self.client.delete(self.collection_url("")).send().await?;
        if response.status() != StatusCode::NOT_FOUND {
            check_status(response).await?;
        }
        self.collection_ready.store(false, Ordering::Release);
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let response = self
            .client
            .post(self.collection_url("/points/count"))
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }

        let parsed: Value = check_status(response).await?.json().await?;
        Ok(parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .unwrap_or_default() as usize)
    }
}
