use crate::chunking::split_pages;
use crate::config::RagConfig;
use crate::embeddings::Embedder;
use crate::identity::assign_chunk_ids;
use crate::ingest::{load_documents, SkippedPdf};
use crate::traits::VectorStore;
use crate::{Chunk, ChunkRecord, PdfExtractor, RagError};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Identifiers already in the store before this run.
    pub existing: usize,
    /// Chunks left untouched because their identifier was already stored.
    pub skipped: usize,
    pub added: usize,
}

/// Adds the chunks whose identifier is not stored yet. Stored chunks are not
/// re-embedded or rewritten, so the cost tracks new content only.
pub async fn index_chunks(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<IndexReport, RagError> {
    let existing_ids = store.existing_ids().await?;
    info!(existing = existing_ids.len(), "existing documents in store");

    let new_chunks: Vec<&Chunk> = chunks
        .iter()
        .filter(|chunk| !existing_ids.contains(chunk.chunk_id()))
        .collect();

    let report = IndexReport {
        existing: existing_ids.len(),
        skipped: chunks.len() - new_chunks.len(),
        added: new_chunks.len(),
    };
    info!(skipped = report.skipped, adding = report.added, "computed new chunks");

    for batch in new_chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.text().to_string()).collect();
        let vectors = embedder.embed_batch(&texts).await?;

        let records = batch
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkRecord {
                id: chunk.chunk_id().to_string(),
                vector,
                text: chunk.text().to_string(),
                metadata: chunk.metadata(),
            })
            .collect();

        store.upsert(records).await?;
    }

    Ok(report)
}

#[derive(Debug, Clone, Default)]
pub struct IngestionSummary {
    pub pages: usize,
    pub chunks: usize,
    pub index: IndexReport,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Load → chunk → identify → embed → store, for one data directory.
pub struct Ingestor {
    config: RagConfig,
    extractor: Arc<dyn PdfExtractor>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl Ingestor {
    pub fn new(
        config: RagConfig,
        extractor: Arc<dyn PdfExtractor>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            config,
            extractor,
            embedder,
            store,
        }
    }

    /// With `reset`, the store is emptied first, so the result matches a first
    /// run against an empty store. A failure after the reset leaves whatever
    /// was written so far.
    pub async fn run(&self, reset: bool) -> Result<IngestionSummary, RagError> {
        if reset {
            info!(backend = self.store.backend(), "clearing store");
            self.store.clear().await?;
        }

        let data_dir = self.config.data_dir.clone();
        let extractor = Arc::clone(&self.extractor);
        let loaded =
            tokio::task::spawn_blocking(move || load_documents(&data_dir, extractor.as_ref()))
                .await
                .map_err(crate::IngestError::from)??;
        info!(pages = loaded.pages.len(), skipped_files = loaded.skipped_files.len(), "loaded documents");

        let chunks = assign_chunk_ids(split_pages(&loaded.pages, self.config.chunking)?);
        info!(chunks = chunks.len(), "split documents into chunks");

        let index = index_chunks(
            self.store.as_ref(),
            self.embedder.as_ref(),
            &chunks,
            self.config.embed_batch_size,
        )
        .await?;

        Ok(IngestionSummary {
            pages: loaded.pages.len(),
            chunks: chunks.len(),
            index,
            skipped_files: loaded.skipped_files,
        })
    }
}
