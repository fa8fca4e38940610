use crate::config::LlmConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

pub type TokenStream = BoxStream<'static, Result<String, ProviderError>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Streams the completion token by token. The default yields the full
    /// completion as a single token.
    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream, ProviderError> {
        let text = self.generate(prompt).await?;
        Ok(stream::iter([Ok(text)]).boxed())
    }
}

/// Completions from a local Ollama server (`POST /api/generate`).
pub struct OllamaGenerator {
    base_url: String,
    model: String,
    client: Client,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, PartialEq)]
enum StreamLine {
    Token(String),
    Done(String),
    Skip,
}

/// Resolves `path` under `base_url`, keeping any path prefix the base carries.
pub(crate) fn api_url(base_url: &str, path: &str) -> Result<Url, ProviderError> {
    let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
    Ok(base.join(path.trim_start_matches('/'))?)
}

impl OllamaGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        api_url(&self.base_url, path)
    }

    /// Names of the models the server has pulled.
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let response = self.client.get(self.endpoint("api/tags")?).send().await?;
        let response = ensure_success(response).await?;
        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|model| model.name).collect())
    }

    async fn post_generate(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(self.endpoint("api/generate")?)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream,
            })
            .send()
            .await?;
        ensure_success(response).await
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::BackendResponse {
        provider: "ollama".to_string(),
        details: format!("{status}: {body}"),
    })
}

/// Interprets one NDJSON line of a streamed generate response. Lines that are
/// not JSON are skipped.
fn parse_stream_line(line: &[u8]) -> Result<StreamLine, ProviderError> {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(StreamLine::Skip);
    }

    let Ok(chunk) = serde_json::from_str::<GenerateChunk>(trimmed) else {
        return Ok(StreamLine::Skip);
    };

    if let Some(error) = chunk.error {
        return Err(ProviderError::BackendResponse {
            provider: "ollama".to_string(),
            details: error,
        });
    }

    Ok(if chunk.done {
        StreamLine::Done(chunk.response)
    } else if chunk.response.is_empty() {
        StreamLine::Skip
    } else {
        StreamLine::Token(chunk.response)
    })
}

type ByteStream = BoxStream<'static, Result<Vec<u8>, reqwest::Error>>;

struct LineReader {
    bytes: ByteStream,
    buffer: Vec<u8>,
    finished: bool,
}

impl LineReader {
    /// Next token, or `None` once the server reports completion or closes.
    async fn next_token(&mut self) -> Result<Option<String>, ProviderError> {
        loop {
            if self.finished {
                return Ok(None);
            }

            let line = match self.buffer.iter().position(|byte| *byte == b'\n') {
                Some(position) => self.buffer.drain(..=position).collect::<Vec<u8>>(),
                None => match self.bytes.next().await {
                    Some(chunk) => {
                        self.buffer.extend_from_slice(&chunk?);
                        continue;
                    }
                    None => {
                        self.finished = true;
                        std::mem::take(&mut self.buffer)
                    }
                },
            };

            match parse_stream_line(&line)? {
                StreamLine::Token(token) => return Ok(Some(token)),
                StreamLine::Done(token) => {
                    self.finished = true;
                    if !token.is_empty() {
                        return Ok(Some(token));
                    }
                }
                StreamLine::Skip => {}
            }
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let response = self.post_generate(prompt, false).await?;
        let chunk: GenerateChunk = response.json().await?;
        if let Some(error) = chunk.error {
            return Err(ProviderError::BackendResponse {
                provider: "ollama".to_string(),
                details: error,
            });
        }
        Ok(chunk.response)
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream, ProviderError> {
        let response = self.post_generate(prompt, true).await?;
        let reader = LineReader {
            bytes: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
            buffer: Vec::new(),
            finished: false,
        };

        let tokens = stream::try_unfold(reader, |mut reader| async move {
            let next = reader.next_token().await?;
            Ok::<_, ProviderError>(next.map(|token| (token, reader)))
        });

        Ok(tokens.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(parts: &[&str]) -> LineReader {
        let owned: Vec<Result<Vec<u8>, reqwest::Error>> =
            parts.iter().map(|part| Ok(part.as_bytes().to_vec())).collect();
        LineReader {
            bytes: stream::iter(owned).boxed(),
            buffer: Vec::new(),
            finished: false,
        }
    }

    async fn drain(mut reader: LineReader) -> Result<Vec<String>, ProviderError> {
        let mut tokens = Vec::new();
        while let Some(token) = reader.next_token().await? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    #[test]
    fn stream_lines_are_classified() {
        assert_eq!(
            parse_stream_line(br#"{"response":"Hi","done":false}"#).unwrap(),
            StreamLine::Token("Hi".to_string())
        );
        assert_eq!(
            parse_stream_line(br#"{"response":"","done":true}"#).unwrap(),
            StreamLine::Done(String::new())
        );
        assert_eq!(parse_stream_line(b"not json").unwrap(), StreamLine::Skip);
        assert_eq!(parse_stream_line(b"   ").unwrap(), StreamLine::Skip);
        assert!(parse_stream_line(br#"{"error":"model not found"}"#).is_err());
    }

    #[tokio::test]
    async fn tokens_split_across_network_chunks_are_reassembled() {
        let tokens = drain(reader(&[
            "{\"response\":\"The \",\"do",
            "ne\":false}\n{\"response\":\"player\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true}\n{\"response\":\"ignored\",\"done\":false}\n",
        ]))
        .await
        .unwrap();

        assert_eq!(tokens, vec!["The ", "player"]);
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_read() {
        let tokens = drain(reader(&["{\"response\":\"$1500\",\"done\":false}"]))
            .await
            .unwrap();
        assert_eq!(tokens, vec!["$1500"]);
    }

    #[tokio::test]
    async fn error_line_ends_stream_with_error() {
        let result = drain(reader(&["{\"response\":\"a\"}\n{\"error\":\"out of memory\"}\n"])).await;
        assert!(matches!(result, Err(ProviderError::BackendResponse { details, .. }) if details == "out of memory"));
    }

    #[test]
    fn endpoints_join_onto_base_url() {
        let generator = OllamaGenerator::new(&LlmConfig {
            base_url: "http://localhost:11434/".to_string(),
            ..LlmConfig::default()
        })
        .unwrap();
        assert_eq!(
            generator.endpoint("api/generate").unwrap().as_str(),
            "http://localhost:11434/api/generate"
        );
    }

    #[test]
    fn base_url_path_prefix_is_kept() {
        assert_eq!(
            api_url("http://gateway.local/ollama", "api/tags").unwrap().as_str(),
            "http://gateway.local/ollama/api/tags"
        );
        assert_eq!(
            api_url("http://gateway.local/ollama/", "/api/tags").unwrap().as_str(),
            "http://gateway.local/ollama/api/tags"
        );
    }
}
