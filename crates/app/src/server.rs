//! Web front end: document upload, a one-shot question form and a streaming
//! chat endpoint.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Upload and question forms |
//! | `POST` | `/upload` | Multipart `files` (+ optional `reset`); indexes in the background |
//! | `POST` | `/query` | Form field `query`; renders the answer page |
//! | `GET`  | `/chat` | Chat page |
//! | `POST` | `/chat/stream` | JSON `{"query": ...}`; Server-Sent Events of answer tokens |
//! | `GET`  | `/health` | Status and version |

use axum::{
    extract::{DefaultBodyLimit, Form, Multipart, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        Html, IntoResponse, Redirect, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, BoxStream, StreamExt};
use pdf_rag_core::{Ingestor, QueryEvent, RagError, RagPipeline, SourceCitation};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");
const RESULT_TEMPLATE: &str = include_str!("../templates/result.html");
const CHAT_TEMPLATE: &str = include_str!("../templates/chat.html");

const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub pipeline: RagPipeline,
    pub ingestor: Arc<Ingestor>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/query", post(query_page))
        .route("/chat", get(chat_page))
        .route("/chat/stream", post(chat_stream))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(bind: &str, state: AppState) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&state.data_dir).await?;

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, "web server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
    }
}

// ============ Errors ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl From<RagError> for AppError {
    fn from(error: RagError) -> Self {
        let (status, code) = match &error {
            RagError::EmptyQuestion => (StatusCode::BAD_REQUEST, "bad_request"),
            RagError::Provider(_) => (StatusCode::BAD_GATEWAY, "provider_error"),
            RagError::Store(_) => (StatusCode::BAD_GATEWAY, "store_error"),
            RagError::Ingest(_) | RagError::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        Self {
            status,
            code,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ Rendering ============

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn render_sources(sources: &[SourceCitation]) -> String {
    sources
        .iter()
        .map(|source| {
            format!(
                "    <li><code>{}</code> (distance: {})<div class=\"snippet\">{}</div></li>",
                escape_html(&source.source),
                source.distance,
                escape_html(&source.snippet)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============ GET / ============

#[derive(Debug, Default, Deserialize)]
pub struct PageStatus {
    success: Option<String>,
    error: Option<String>,
}

async fn index(Query(status): Query<PageStatus>) -> Html<String> {
    let banner = match (&status.success, &status.error) {
        (_, Some(error)) => format!(
            "<p class=\"status error\">Something went wrong: {}</p>",
            escape_html(error)
        ),
        (Some(success), None) => format!(
            "<p class=\"status success\">Done: {}. Indexing runs in the background.</p>",
            escape_html(success)
        ),
        (None, None) => String::new(),
    };
    Html(INDEX_TEMPLATE.replace("{{status}}", &banner))
}

// ============ POST /upload ============

/// Keeps only the final path component so uploads cannot escape the data
/// directory. Returns `None` for names that are not PDFs.
pub fn upload_file_name(raw: &str) -> Option<String> {
    let name = Path::new(raw.rsplit(['/', '\\']).next().unwrap_or_default())
        .file_name()?
        .to_str()?
        .to_string();

    let is_pdf = Path::new(&name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    is_pdf.then_some(name)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "on" | "1" | "yes"
    )
}

struct Upload {
    saved: Vec<String>,
    reset: bool,
}

async fn save_uploads(data_dir: &Path, mut multipart: Multipart) -> anyhow::Result<Upload> {
    let mut upload = Upload {
        saved: Vec::new(),
        reset: false,
    };

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("reset") => upload.reset = is_truthy(&field.text().await?),
            Some("files") => {
                let Some(name) = field.file_name().and_then(upload_file_name) else {
                    warn!(file_name = ?field.file_name(), "ignoring non-pdf upload");
                    continue;
                };
                let bytes = field.bytes().await?;
                tokio::fs::write(data_dir.join(&name), &bytes).await?;
                info!(file = %name, bytes = bytes.len(), "saved upload");
                upload.saved.push(name);
            }
            _ => {}
        }
    }

    Ok(upload)
}

async fn upload(State(state): State<AppState>, multipart: Multipart) -> Redirect {
    let upload = match save_uploads(&state.data_dir, multipart).await {
        Ok(upload) => upload,
        Err(error) => {
            error!(%error, "failed to save upload");
            return Redirect::to("/?error=upload_failed");
        }
    };

    if upload.saved.is_empty() {
        return Redirect::to("/?error=no_pdf_files");
    }

    let ingestor = Arc::clone(&state.ingestor);
    let files = upload.saved;
    let reset = upload.reset;
    info!(files = files.len(), reset, "starting background ingestion");

    tokio::spawn(async move {
        match ingestor.run(reset).await {
            Ok(summary) => info!(
                files = %files.join(", "),
                added = summary.index.added,
                skipped = summary.index.skipped,
                "ingestion complete"
            ),
            Err(error) => error!(%error, "ingestion failed"),
        }
    });

    Redirect::to("/?success=uploaded")
}

// ============ POST /query ============

#[derive(Debug, Deserialize)]
pub struct QueryForm {
    query: String,
}

async fn query_page(
    State(state): State<AppState>,
    Form(form): Form<QueryForm>,
) -> Result<Html<String>, AppError> {
    let answer = state.pipeline.answer(&form.query).await?;
    let answer_text = if answer.answer.is_empty() {
        "(no response returned by the LLM)".to_string()
    } else {
        answer.answer.clone()
    };

    Ok(Html(
        RESULT_TEMPLATE
            .replace("{{query}}", &escape_html(&form.query))
            .replace("{{answer}}", &escape_html(&answer_text))
            .replace("{{sources}}", &render_sources(&answer.sources)),
    ))
}

// ============ GET /chat ============

async fn chat_page() -> Html<&'static str> {
    Html(CHAT_TEMPLATE)
}

// ============ POST /chat/stream ============

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    query: String,
}

type EventStream = BoxStream<'static, Result<Event, axum::Error>>;

async fn chat_stream(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Sse<EventStream> {
    if request.query.trim().is_empty() {
        let event = Event::default().json_data(QueryEvent::Error("No query provided".to_string()));
        return Sse::new(stream::iter([event]).boxed());
    }

    let events = state
        .pipeline
        .answer_stream(request.query)
        .map(|event| Event::default().json_data(event))
        .chain(stream::once(async { Ok(Event::default().data("[DONE]")) }))
        .boxed();

    Sse::new(events)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
