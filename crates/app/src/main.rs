mod server;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_rag_core::{
    create_embedder, open_store, query_and_validate, ChunkingConfig, EmbeddingBackend,
    EmbeddingConfig, Ingestor, LlmConfig, LopdfExtractor, OllamaGenerator, RagConfig, RagPipeline,
    StoreConfig, VectorStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version, about = "Ask questions about a folder of PDFs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Folder scanned recursively for PDFs
    #[arg(long, env = "RAG_DATA_DIR", default_value = "data", global = true)]
    data_dir: PathBuf,

    /// Vector store backend
    #[arg(long, env = "RAG_STORE", value_enum, default_value_t = StoreKind::Local, global = true)]
    store: StoreKind,

    /// Directory for the local store
    #[arg(long, env = "RAG_STORE_DIR", default_value = "chroma", global = true)]
    store_dir: PathBuf,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = pdf_rag_core::config::DEFAULT_QDRANT_URL, global = true)]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, env = "QDRANT_COLLECTION", default_value = pdf_rag_core::config::DEFAULT_COLLECTION, global = true)]
    qdrant_collection: String,

    /// Ollama base URL, shared by embeddings and generation
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = pdf_rag_core::config::DEFAULT_OLLAMA_URL, global = true)]
    ollama_url: String,

    /// Embedding provider
    #[arg(long, env = "RAG_EMBEDDINGS", value_enum, default_value_t = EmbeddingKind::Ollama, global = true)]
    embeddings: EmbeddingKind,

    /// Embedding model served by Ollama
    #[arg(long, env = "OLLAMA_EMBED_MODEL", default_value = "nomic-embed-text", global = true)]
    embed_model: String,

    /// Generation model served by Ollama
    #[arg(long, env = "OLLAMA_MODEL", default_value = "mistral", global = true)]
    model: String,

    /// Number of chunks retrieved per question
    #[arg(long, env = "RAG_TOP_K", default_value = "5", global = true)]
    top_k: usize,

    /// Chunk size in characters
    #[arg(long, default_value = "800", global = true)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, default_value = "80", global = true)]
    chunk_overlap: usize,

    #[arg(long, env = "OLLAMA_TIMEOUT_SECS", default_value = "120", global = true)]
    llm_timeout_secs: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreKind {
    Local,
    Qdrant,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbeddingKind {
    Ollama,
    Ngram,
}

#[derive(Subcommand)]
enum Command {
    /// Load PDFs, chunk them and add chunks the store has not seen.
    Ingest {
        /// Clear the store before indexing.
        #[arg(long, default_value_t = false)]
        reset: bool,
    },
    /// Answer a question from the indexed documents.
    Query {
        query_text: String,
    },
    /// Answer a question and have the model judge it against an expected answer.
    Grade {
        #[arg(long)]
        question: String,
        #[arg(long)]
        expected: String,
    },
    /// Check that the model server and the store are reachable.
    Check,
    /// Run the web interface.
    Serve {
        #[arg(long, env = "RAG_BIND", default_value = "127.0.0.1:8000")]
        bind: String,
    },
}

impl Cli {
    fn rag_config(&self) -> RagConfig {
        let store = match self.store {
            StoreKind::Local => StoreConfig::Local {
                persist_dir: self.store_dir.clone(),
            },
            StoreKind::Qdrant => StoreConfig::Qdrant {
                url: self.qdrant_url.clone(),
                collection: self.qdrant_collection.clone(),
            },
        };
        let backend = match self.embeddings {
            EmbeddingKind::Ollama => EmbeddingBackend::Ollama,
            EmbeddingKind::Ngram => EmbeddingBackend::Ngram,
        };

        RagConfig {
            data_dir: self.data_dir.clone(),
            store,
            chunking: ChunkingConfig {
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
            },
            top_k: self.top_k,
            embedding: EmbeddingConfig {
                backend,
                model: self.embed_model.clone(),
                base_url: self.ollama_url.clone(),
                ..EmbeddingConfig::default()
            },
            llm: LlmConfig {
                model: self.model.clone(),
                base_url: self.ollama_url.clone(),
                timeout_secs: self.llm_timeout_secs,
            },
            ..RagConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.rag_config();
    config.validate().context("invalid configuration")?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    let embedder = create_embedder(&config.embedding);
    let store = open_store(&config.store).await?;
    let generator = Arc::new(OllamaGenerator::new(&config.llm)?);

    match cli.command {
        Command::Ingest { reset } => {
            let ingestor = Ingestor::new(config, Arc::new(LopdfExtractor), embedder, store);
            let summary = ingestor.run(reset).await?;

            for skipped in &summary.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }

            println!("Number of existing documents in DB: {}", summary.index.existing);
            println!("Chunks already indexed: {}", summary.index.skipped);
            if summary.index.added == 0 {
                println!("No new documents to add");
            } else {
                println!("Added new documents: {}", summary.index.added);
            }
        }
        Command::Query { query_text } => {
            let pipeline = RagPipeline::new(embedder, store, generator, config.top_k);
            let answer = pipeline.answer(&query_text).await?;

            println!("=== Answer ===");
            if answer.answer.is_empty() {
                println!("(no response returned by the LLM)");
            } else {
                println!("{}", answer.answer);
            }

            println!();
            println!("=== Top Sources ===");
            for source in &answer.sources {
                println!("[{}] {} (distance: {})", source.rank, source.source, source.distance);
                println!("    {}", source.snippet);
            }
        }
        Command::Grade { question, expected } => {
            let pipeline = RagPipeline::new(embedder, store, generator.clone(), config.top_k);
            let graded = query_and_validate(&pipeline, generator.as_ref(), &question, &expected).await?;

            println!("Question: {question}");
            println!("Expected: {expected}");
            println!("Actual:   {}", graded.answer.answer);
            if !graded.verdict.passed {
                println!("FAIL (judge said: {})", graded.verdict.judge_response.trim());
                bail!("response did not match the expected answer");
            }
            println!("PASS");
        }
        Command::Check => {
            let models = generator
                .list_models()
                .await
                .with_context(|| format!("model server at {} is not reachable", config.llm.base_url))?;
            println!("Model server: {} ({} models)", config.llm.base_url, models.len());
            let mut required = vec![config.llm.model.as_str()];
            if config.embedding.backend == EmbeddingBackend::Ollama {
                required.push(config.embedding.model.as_str());
            }
            for required in required {
                let available = models
                    .iter()
                    .any(|name| name == required || name.starts_with(&format!("{required}:")));
                if !available {
                    warn!(model = %required, "model not pulled on the server");
                }
                println!("  {required}: {}", if available { "available" } else { "missing" });
            }

            let count = store.count().await?;
            println!("Store: {} ({count} chunks)", store.backend());
        }
        Command::Serve { bind } => {
            let pipeline = RagPipeline::new(
                Arc::clone(&embedder),
                Arc::clone(&store),
                generator,
                config.top_k,
            );
            let data_dir = config.data_dir.clone();
            let ingestor = Ingestor::new(config, Arc::new(LopdfExtractor), embedder, store);

            server::run_server(
                &bind,
                server::AppState {
                    data_dir,
                    pipeline,
                    ingestor: Arc::new(ingestor),
                },
            )
            .await?;
        }
    }

    Ok(())
}
