use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::ProviderError;
use crate::llm::api_url;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Turns text into a fixed-length vector. Index time and query time must use
/// the same embedder, otherwise distances are meaningless.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

pub fn create_embedder(config: &EmbeddingConfig) -> Arc<dyn Embedder> {
    match config.backend {
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(&config.base_url, &config.model)),
        EmbeddingBackend::Ngram => Arc::new(CharacterNgramEmbedder {
            dimensions: config.ngram_dimensions,
        }),
    }
}

/// Offline embedder hashing character trigrams into buckets.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn name(&self) -> &str {
        "ngram"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed_sync(text))
    }
}

/// Embeddings from a local Ollama server (`POST /api/embed`).
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: Client,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EmbedResponse {
    Wrapped { embeddings: Vec<Vec<f32>> },
    Bare(Vec<Vec<f32>>),
}

impl EmbedResponse {
    fn into_vectors(self) -> Vec<Vec<f32>> {
        match self {
            Self::Wrapped { embeddings } => embeddings,
            Self::Bare(embeddings) => embeddings,
        }
    }
}

impl OllamaEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            client: Client::new(),
        }
    }

    fn endpoint(&self) -> Result<Url, ProviderError> {
        api_url(&self.base_url, "api/embed")
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::EmptyResponse {
                provider: "ollama".to_string(),
            })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(self.endpoint()?)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::BackendResponse {
                provider: "ollama".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let vectors = response.json::<EmbedResponse>().await?.into_vectors();
        if vectors.len() != texts.len() {
            return Err(ProviderError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }

        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::{CharacterNgramEmbedder, EmbedResponse, Embedder, OllamaEmbedder};

    #[tokio::test]
    async fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Each player starts with $1500").await.unwrap();
        let second = embedder.embed("Each player starts with $1500").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc").await.unwrap();
        assert_eq!(vector.len(), 32);
    }

    #[tokio::test]
    async fn batch_embedding_preserves_order() {
        let embedder = CharacterNgramEmbedder::default();
        let texts = vec!["railroads".to_string(), "utilities".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[1], embedder.embed_sync("utilities"));
    }

    #[test]
    fn both_embed_response_shapes_parse() {
        let wrapped: EmbedResponse =
            serde_json::from_str(r#"{"model":"m","embeddings":[[0.1,0.2]]}"#).unwrap();
        assert_eq!(wrapped.into_vectors(), vec![vec![0.1, 0.2]]);

        let bare: EmbedResponse = serde_json::from_str("[[1.0],[2.0]]").unwrap();
        assert_eq!(bare.into_vectors().len(), 2);
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let embedder = OllamaEmbedder::new("http://127.0.0.1:11434/", "nomic-embed-text");
        assert_eq!(
            embedder.endpoint().unwrap().as_str(),
            "http://127.0.0.1:11434/api/embed"
        );

        let proxied = OllamaEmbedder::new("https://proxy.example/ollama", "nomic-embed-text");
        assert_eq!(
            proxied.endpoint().unwrap().as_str(),
            "https://proxy.example/ollama/api/embed"
        );
    }
}
