//! HTTP service boundary: upload, query, and health endpoints.
//!
//! Translates transport concerns into pipeline calls and internal errors
//! into status codes. No retrieval logic lives here.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::embeddings::EmbeddingError;
use crate::llm::LlmError;
use crate::rag::{format_context, Citation, IndexStats, RagError};
use crate::AppState;

/// Maximum accepted upload size (200 MiB).
const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/query", post(query))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 1024 * 1024))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn run(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    log::info!("shutting down");
}

/// Client-facing error: a status code plus a detail message.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "detail": self.message }));
        (self.status, body).into_response()
    }
}

impl From<RagError> for ApiError {
    fn from(e: RagError) -> Self {
        let status = match &e {
            RagError::Loader(_) => StatusCode::BAD_REQUEST,
            RagError::Embedding(EmbeddingError::MissingApiKey) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            RagError::Embedding(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        let status = match &e {
            LlmError::MissingApiKey => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    provider: &'static str,
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<IndexStats>,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (status, index) = health_status(state.engine.stats());
    Json(HealthResponse {
        status,
        provider: state.settings.provider.as_str(),
        model: state.settings.llm_model.clone(),
        index,
    })
}

/// An index that exists but cannot be opened is reported as degraded,
/// not as an empty index.
fn health_status(
    stats: Result<Option<IndexStats>, RagError>,
) -> (&'static str, Option<IndexStats>) {
    match stats {
        Ok(index) => ("ok", index),
        Err(err) => {
            log::warn!("health check: index unavailable: {err}");
            ("degraded", None)
        }
    }
}

#[derive(Serialize)]
struct IngestResponse {
    ok: bool,
    filename: String,
    chunks: usize,
}

async fn ingest(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| ApiError::bad_request("file field has no filename"))?;
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("failed to read upload: {e}")))?;
            upload = Some((filename, data));
            break;
        }
    }

    let (filename, data) =
        upload.ok_or_else(|| ApiError::bad_request("missing file field"))?;
    let filename = validate_pdf_filename(&filename)
        .ok_or_else(|| ApiError::bad_request("upload a PDF"))?;

    if data.len() > MAX_UPLOAD_BYTES {
        return Err(ApiError {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: "PDF too large (>200MB)".to_string(),
        });
    }

    let dest = state.settings.upload_dir.join(&filename);
    tokio::fs::write(&dest, &data)
        .await
        .map_err(|e| ApiError::internal(format!("failed to store upload: {e}")))?;

    let chunks = state.engine.ingest(&dest).await?;
    Ok(Json(IngestResponse {
        ok: true,
        filename,
        chunks,
    }))
}

#[derive(Deserialize)]
struct QueryForm {
    question: String,
    k: Option<usize>,
}

#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    sources: Vec<Citation>,
}

async fn query(
    State(state): State<Arc<AppState>>,
    Form(form): Form<QueryForm>,
) -> Result<Json<QueryResponse>, ApiError> {
    let k = form.k.unwrap_or(state.settings.top_k).max(1);

    let results = state.engine.retrieve(&form.question, k).await?;
    let context = format_context(&results);
    let answer = state.llm.generate(&form.question, &context).await?;

    let sources = results.iter().map(Citation::from).collect();
    Ok(Json(QueryResponse { answer, sources }))
}

/// Strip any directory components and require a .pdf extension.
fn validate_pdf_filename(raw: &str) -> Option<String> {
    let name = Path::new(raw).file_name()?.to_str()?.to_string();
    if name.to_lowercase().ends_with(".pdf") && name.len() > 4 {
        Some(name)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_reports_degraded_index() {
        let (status, index) =
            health_status(Err(RagError::IndexUnavailable("file is not a database".into())));
        assert_eq!(status, "degraded");
        assert!(index.is_none());

        let (status, index) = health_status(Ok(None));
        assert_eq!(status, "ok");
        assert!(index.is_none());
    }

    #[test]
    fn test_validate_pdf_filename() {
        assert_eq!(
            validate_pdf_filename("report.pdf"),
            Some("report.pdf".to_string())
        );
        assert_eq!(
            validate_pdf_filename("Report.PDF"),
            Some("Report.PDF".to_string())
        );
        assert_eq!(
            validate_pdf_filename("../../etc/passwd.pdf"),
            Some("passwd.pdf".to_string())
        );
        assert_eq!(validate_pdf_filename("notes.txt"), None);
        assert_eq!(validate_pdf_filename(".pdf"), None);
        assert_eq!(validate_pdf_filename(""), None);
    }
}
