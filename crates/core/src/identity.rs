//! Deterministic chunk identifiers.
//!
//! An identifier is `source:page:ordinal`, where `ordinal` counts the chunks
//! seen so far on the same page. Re-chunking unchanged input with the same
//! [`crate::ChunkingConfig`] therefore reproduces identical identifiers, which
//! is what makes re-indexing idempotent.
//!
//! The counter resets whenever the `(source, page)` pair differs from the
//! previous chunk's, so the chunker must emit a page's chunks contiguously and
//! in a stable order. Changing the chunk size or overlap reuses identifiers for
//! different text; such a change needs a full reset of the store.

use crate::models::{Chunk, PageChunk};

pub fn chunk_id(source_path: &str, page_number: u32, ordinal: usize) -> String {
    format!("{source_path}:{page_number}:{ordinal}")
}

pub fn assign_chunk_ids(chunks: impl IntoIterator<Item = PageChunk>) -> Vec<Chunk> {
    let mut last_page: Option<(String, u32)> = None;
    let mut ordinal = 0usize;

    chunks
        .into_iter()
        .map(|chunk| {
            let same_page = last_page
                .as_ref()
                .is_some_and(|(source, page)| *source == chunk.source_path && *page == chunk.page_number);

            if same_page {
                ordinal += 1;
            } else {
                ordinal = 0;
                last_page = Some((chunk.source_path.clone(), chunk.page_number));
            }

            let id = chunk_id(&chunk.source_path, chunk.page_number, ordinal);
            Chunk::identified(chunk, id)
        })
        .collect()
}
