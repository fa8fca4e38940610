use crate::chunking::ChunkingConfig;
use crate::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";
pub const DEFAULT_COLLECTION: &str = "documents";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    Ollama,
    Ngram,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub base_url: String,
    pub ngram_dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            model: "nomic-embed-text".to_string(),
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            ngram_dimensions: crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "mistral".to_string(),
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Local { persist_dir: PathBuf },
    Qdrant { url: String, collection: String },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Local {
            persist_dir: PathBuf::from("chroma"),
        }
    }
}

/// Everything the pipeline needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub data_dir: PathBuf,
    pub store: StoreConfig,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub embed_batch_size: usize,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            store: StoreConfig::default(),
            chunking: ChunkingConfig::default(),
            top_k: 5,
            embed_batch_size: 256,
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl RagConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking
            .validate()
            .map_err(|error| ConfigError::Invalid {
                field: "chunking",
                reason: error.to_string(),
            })?;

        if self.top_k == 0 {
            return Err(ConfigError::Invalid {
                field: "top_k",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.embed_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "embed_batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.embedding.backend == EmbeddingBackend::Ngram && self.embedding.ngram_dimensions == 0
        {
            return Err(ConfigError::Invalid {
                field: "embedding.ngram_dimensions",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.embedding.backend == EmbeddingBackend::Ollama {
            parse_url("embedding.base_url", &self.embedding.base_url)?;
        }
        parse_url("llm.base_url", &self.llm.base_url)?;
        if let StoreConfig::Qdrant { url, collection } = &self.store {
            parse_url("store.url", url)?;
            if collection.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "store.collection",
                    reason: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::Url { field, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RagConfig::default().validate().expect("defaults should validate");
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let mut config = RagConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "chunking", .. })
        ));
    }

    #[test]
    fn bad_store_url_is_rejected() {
        let config = RagConfig {
            store: StoreConfig::Qdrant {
                url: "not a url".to_string(),
                collection: "documents".to_string(),
            },
            ..RagConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Url { field: "store.url", .. })
        ));
    }

    #[test]
    fn ngram_backend_skips_embedding_url_check() {
        let mut config = RagConfig::default();
        config.embedding.backend = EmbeddingBackend::Ngram;
        config.embedding.base_url = String::new();
        assert!(config.validate().is_ok());
    }
}
