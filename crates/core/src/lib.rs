pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod grading;
pub mod identity;
pub mod indexer;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod query;
pub mod store;
pub mod stores;
pub mod traits;

pub use chunking::{split_pages, split_text, ChunkingConfig};
pub use config::{EmbeddingBackend, EmbeddingConfig, LlmConfig, RagConfig, StoreConfig};
pub use embeddings::{
    create_embedder, CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{ConfigError, IngestError, ProviderError, RagError, StoreError};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use grading::{grade, parse_verdict, query_and_validate, GradedAnswer, Verdict};
pub use identity::{assign_chunk_ids, chunk_id};
pub use indexer::{index_chunks, IndexReport, IngestionSummary, Ingestor};
pub use ingest::{discover_pdf_files, load_documents, LoadReport, SkippedPdf};
pub use llm::{LanguageModel, OllamaGenerator, TokenStream};
pub use models::{
    Chunk, ChunkMetadata, ChunkRecord, PageChunk, QueryEvent, RagAnswer, ScoredChunk,
    SourceCitation,
};
pub use query::{build_prompt, RagPipeline};
pub use store::open_store;
pub use stores::{LocalStore, QdrantStore};
pub use traits::VectorStore;
