/// HTTP service for document processing and phrase review
///
/// Routes:
/// - POST /api/doc-process/                  count, classify and store a document
/// - GET  /api/data-fetcher/                 page through aggregated phrases
/// - POST /api/status-updater/{phrase}/{code} confirm a phrase as stop (0) or highlight (1)
/// - POST /api/word-graph/                   store a document's word graph
///
/// Successful responses carry `{"message": ...}` (or `{"items": [...]}`),
/// failures `{"detail": ...}`.

mod handlers;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::errors::PhraseError;
use crate::pipeline::DocumentProcessor;

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<DocumentProcessor>,
}

impl AppState {
    pub fn new(processor: DocumentProcessor) -> Self {
        AppState {
            processor: Arc::new(processor),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/doc-process/", post(handlers::doc_process))
        .route("/api/data-fetcher/", get(handlers::data_fetcher))
        .route("/api/status-updater/{phrase}/{code}", post(handlers::status_updater))
        .route("/api/word-graph/", post(handlers::word_graph))
        .with_state(state)
}

/// Bind `bind` and serve until the process is stopped.
pub async fn serve(state: AppState, bind: &str) -> Result<(), PhraseError> {
    let listener = TcpListener::bind(bind).await?;
    tracing::info!(bind = %bind, "Phrase API listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Error response. Unknown phrases map to 404, everything else to 400.
pub struct ApiError(PhraseError);

impl From<PhraseError> for ApiError {
    fn from(e: PhraseError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PhraseError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        tracing::error!(status = status.as_u16(), error = %self.0, "Request failed");
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}
