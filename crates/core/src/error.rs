use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("data directory does not exist: {0}")]
    MissingDirectory(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("loader task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("vector dimension {actual} does not match collection dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("persisted collection is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid response from {provider}: {details}")]
    BackendResponse { provider: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("{provider} returned an empty response")]
    EmptyResponse { provider: String },

    #[error("expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("url parse error for {field}: {source}")]
    Url {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("question is empty")]
    EmptyQuestion,
}
