use serde::{Deserialize, Serialize};

/// A span of page text produced by the chunker, before it has an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageChunk {
    pub source_path: String,
    pub page_number: u32,
    pub text: String,
}

/// A retrievable unit of text with its stable identifier.
///
/// Only [`crate::identity::assign_chunk_ids`] builds these, so an identifier
/// is assigned exactly once and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    chunk_id: String,
    source_path: String,
    page_number: u32,
    text: String,
}

impl Chunk {
    pub(crate) fn identified(chunk: PageChunk, chunk_id: String) -> Self {
        Self {
            chunk_id,
            source_path: chunk.source_path,
            page_number: chunk.page_number,
            text: chunk.text,
        }
    }

    pub fn chunk_id(&self) -> &str {
        &self.chunk_id
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            id: self.chunk_id.clone(),
            source: self.source_path.clone(),
            page: self.page_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub id: String,
    pub source: String,
    pub page: u32,
}

/// One persisted `(id, vector, text, metadata)` tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Lower is closer.
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub rank: usize,
    pub source: String,
    pub distance: f64,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
}

impl RagAnswer {
    pub fn source_ids(&self) -> Vec<&str> {
        self.sources.iter().map(|source| source.source.as_str()).collect()
    }
}

/// Incremental output of a streamed answer, serialized as
/// `{"type": "token", "content": "..."}` and friends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum QueryEvent {
    Token(String),
    Sources(Vec<SourceCitation>),
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_events_use_type_and_content_fields() {
        let token = serde_json::to_value(QueryEvent::Token("Hi".to_string())).unwrap();
        assert_eq!(token, serde_json::json!({"type": "token", "content": "Hi"}));

        let error = serde_json::to_value(QueryEvent::Error("boom".to_string())).unwrap();
        assert_eq!(error["type"], "error");
        assert_eq!(error["content"], "boom");
    }

    #[test]
    fn metadata_mirrors_chunk_fields() {
        let chunk = Chunk::identified(
            PageChunk {
                source_path: "data/monopoly.pdf".to_string(),
                page_number: 2,
                text: "Each player is given $1500.".to_string(),
            },
            "data/monopoly.pdf:2:0".to_string(),
        );

        let metadata = chunk.metadata();
        assert_eq!(metadata.id, "data/monopoly.pdf:2:0");
        assert_eq!(metadata.source, "data/monopoly.pdf");
        assert_eq!(metadata.page, 2);
    }
}
