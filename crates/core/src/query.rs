use crate::embeddings::Embedder;
use crate::llm::LanguageModel;
use crate::traits::VectorStore;
use crate::{QueryEvent, RagAnswer, RagError, ScoredChunk, SourceCitation};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tracing::{debug, info};

pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

const SNIPPET_CHARS: usize = 300;

pub fn build_prompt(context: &[ScoredChunk], question: &str) -> String {
    let context = context
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER);

    format!(
        "\nAnswer the question based only on the following context:\n\n{context}\n\n---\n\nAnswer the question based on the above context: {question}\n"
    )
}

pub fn citations(retrieved: &[ScoredChunk]) -> Vec<SourceCitation> {
    retrieved
        .iter()
        .enumerate()
        .map(|(index, chunk)| SourceCitation {
            rank: index + 1,
            source: chunk.id.clone(),
            distance: (chunk.distance * 1e6).round() / 1e6,
            snippet: chunk
                .text
                .trim()
                .replace('\n', " ")
                .chars()
                .take(SNIPPET_CHARS)
                .collect(),
        })
        .collect()
}

/// Question answering over whatever the store holds. Retrieved chunks are
/// used in the store's order, with no re-ranking or filtering.
#[derive(Clone)]
pub struct RagPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LanguageModel>,
    top_k: usize,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            top_k,
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>, RagError> {
        if question.trim().is_empty() {
            return Err(RagError::EmptyQuestion);
        }

        let query_vector = self.embedder.embed(question).await?;
        let retrieved = self.store.search(&query_vector, self.top_k).await?;
        info!(retrieved = retrieved.len(), top_k = self.top_k, "retrieved context");
        Ok(retrieved)
    }

    pub async fn answer(&self, question: &str) -> Result<RagAnswer, RagError> {
        let retrieved = self.retrieve(question).await?;
        let prompt = build_prompt(&retrieved, question);
        debug!(model = self.llm.name(), prompt_chars = prompt.len(), "generating answer");

        let answer = self.llm.generate(&prompt).await?;

        Ok(RagAnswer {
            answer: answer.trim().to_string(),
            sources: citations(&retrieved),
        })
    }

    /// Tokens as the model produces them, then the sources. Any failure is
    /// reported as one `Error` event that ends the stream.
    pub fn answer_stream(&self, question: String) -> BoxStream<'static, QueryEvent> {
        let pipeline = self.clone();

        stream::once(async move {
            let retrieved = pipeline.retrieve(&question).await?;
            let prompt = build_prompt(&retrieved, &question);
            let tokens = pipeline.llm.generate_stream(&prompt).await?;
            Ok::<_, RagError>((tokens, citations(&retrieved)))
        })
        .flat_map(|opened| match opened {
            Ok((tokens, sources)) => tokens
                .map(|token| match token {
                    Ok(token) => QueryEvent::Token(token),
                    Err(error) => QueryEvent::Error(error.to_string()),
                })
                .chain(stream::once(future::ready(QueryEvent::Sources(sources))))
                .boxed(),
            Err(error) => stream::once(future::ready(QueryEvent::Error(error.to_string()))).boxed(),
        })
        .scan(false, |failed, event| {
            if *failed {
                return future::ready(None);
            }
            *failed = matches!(event, QueryEvent::Error(_));
            future::ready(Some(event))
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::llm::TokenStream;
    use crate::stores::LocalStore;
    use crate::{ChunkMetadata, ChunkRecord, ProviderError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
        tokens: Vec<&'static str>,
        fail_midway: bool,
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(format!("  {}\n", self.tokens.concat()))
        }

        async fn generate_stream(&self, prompt: &str) -> Result<TokenStream, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut items: Vec<Result<String, ProviderError>> =
                self.tokens.iter().map(|token| Ok(token.to_string())).collect();
            if self.fail_midway {
                items.insert(
                    1,
                    Err(ProviderError::EmptyResponse {
                        provider: "recording".to_string(),
                    }),
                );
            }
            Ok(stream::iter(items).boxed())
        }
    }

    fn scored(id: &str, text: &str, distance: f64) -> ScoredChunk {
        ScoredChunk {
            id: id.to_string(),
            text: text.to_string(),
            metadata: ChunkMetadata {
                id: id.to_string(),
                source: "data/monopoly.pdf".to_string(),
                page: 1,
            },
            distance,
        }
    }

    async fn pipeline_with(model: Arc<RecordingModel>) -> RagPipeline {
        let embedder = CharacterNgramEmbedder { dimensions: 1024 };
        let store = LocalStore::ephemeral();
        let texts = [
            ("data/monopoly.pdf:1:0", "Each player is given $1500 divided as follows."),
            ("data/ticket_to_ride.pdf:1:0", "The longest continuous path scores 10 points."),
        ];
        let records = texts
            .iter()
            .map(|(id, text)| ChunkRecord {
                id: id.to_string(),
                vector: embedder.embed_sync(text),
                text: text.to_string(),
                metadata: ChunkMetadata {
                    id: id.to_string(),
                    source: id.split(':').next().unwrap_or_default().to_string(),
                    page: 1,
                },
            })
            .collect();
        store.upsert(records).await.unwrap();

        RagPipeline::new(Arc::new(embedder), Arc::new(store), model, 1)
    }

    #[test]
    fn prompt_joins_context_with_delimiter() {
        let prompt = build_prompt(
            &[scored("a", "first", 0.1), scored("b", "second", 0.2)],
            "How much money?",
        );
        assert_eq!(
            prompt,
            "\nAnswer the question based only on the following context:\n\nfirst\n\n---\n\nsecond\n\n---\n\nAnswer the question based on the above context: How much money?\n"
        );
    }

    #[test]
    fn citations_rank_round_and_flatten() {
        let long = format!("line one\nline two {}", "x".repeat(400));
        let cited = citations(&[scored("a:1:0", &long, 0.123456789)]);

        assert_eq!(cited[0].rank, 1);
        assert_eq!(cited[0].source, "a:1:0");
        assert_eq!(cited[0].distance, 0.123457);
        assert!(cited[0].snippet.starts_with("line one line two"));
        assert_eq!(cited[0].snippet.chars().count(), 300);
    }

    #[tokio::test]
    async fn answer_cites_the_retrieved_chunk() {
        let model = Arc::new(RecordingModel {
            tokens: vec!["A player starts with $1500."],
            ..Default::default()
        });
        let pipeline = pipeline_with(Arc::clone(&model)).await;

        let answer = pipeline
            .answer("How much total money does a player start with in Monopoly?")
            .await
            .unwrap();

        assert_eq!(answer.answer, "A player starts with $1500.");
        assert_eq!(answer.source_ids(), vec!["data/monopoly.pdf:1:0"]);
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("Each player is given $1500"));
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let pipeline = pipeline_with(Arc::new(RecordingModel::default())).await;
        assert!(matches!(pipeline.answer("   ").await, Err(RagError::EmptyQuestion)));
    }

    #[tokio::test]
    async fn stream_emits_tokens_then_sources() {
        let model = Arc::new(RecordingModel {
            tokens: vec!["$15", "00"],
            ..Default::default()
        });
        let pipeline = pipeline_with(model).await;

        let events: Vec<QueryEvent> = pipeline
            .answer_stream("How much money does a Monopoly player start with?".to_string())
            .collect()
            .await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], QueryEvent::Token("$15".to_string()));
        assert_eq!(events[1], QueryEvent::Token("00".to_string()));
        assert!(matches!(&events[2], QueryEvent::Sources(sources) if sources[0].source == "data/monopoly.pdf:1:0"));
    }

    #[tokio::test]
    async fn stream_stops_at_first_error() {
        let model = Arc::new(RecordingModel {
            tokens: vec!["one", "two"],
            fail_midway: true,
            ..Default::default()
        });
        let pipeline = pipeline_with(model).await;

        let events: Vec<QueryEvent> = pipeline.answer_stream("question".to_string()).collect().await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], QueryEvent::Token("one".to_string()));
        assert!(matches!(events[1], QueryEvent::Error(_)));
    }

    #[tokio::test]
    async fn stream_reports_empty_question_as_error() {
        let pipeline = pipeline_with(Arc::new(RecordingModel::default())).await;
        let events: Vec<QueryEvent> = pipeline.answer_stream(String::new()).collect().await;
        assert_eq!(events, vec![QueryEvent::Error("question is empty".to_string())]);
    }
}
