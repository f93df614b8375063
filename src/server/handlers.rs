/// Axum handlers for the `/api/*` routes.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, AppState};
use crate::errors::PhraseError;
use crate::model::{content_key, PhraseStatus, StatusFilter};
use crate::pipeline::{DocumentRef, ProcessOptions};
use crate::text::ngram::NgramRange;
use crate::text::DocType;

const DEFAULT_LIMIT: u64 = 10;
const DEFAULT_PAGE: u64 = 1;

type ApiResult = Result<(StatusCode, Json<Value>), ApiError>;

fn rejected(field: &str, rejection: impl std::fmt::Display) -> ApiError {
    ApiError(PhraseError::validation(field, &rejection.to_string()))
}

fn created(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, Json(json!({ "message": message })))
}

#[derive(Deserialize)]
pub(super) struct DocumentBody {
    document: String,
}

#[derive(Deserialize)]
pub(super) struct DocProcessQuery {
    #[serde(default)]
    doc_type: DocType,
    #[serde(default)]
    replace_stop: bool,
    #[serde(default)]
    tag_stop: bool,
    #[serde(default)]
    tag_highlight: bool,
    ngram_range: Option<String>,
    doc_id: Option<String>,
    sitename: Option<String>,
}

impl DocProcessQuery {
    fn options(&self) -> Result<ProcessOptions, PhraseError> {
        let ngram_range = match &self.ngram_range {
            Some(raw) => raw.parse::<NgramRange>()?,
            None => NgramRange::default(),
        };
        Ok(ProcessOptions {
            doc_type: self.doc_type,
            replace_stop: self.replace_stop,
            tag_stop: self.tag_stop,
            tag_highlight: self.tag_highlight,
            ngram_range,
        })
    }

    fn doc_ref(&self) -> Result<Option<DocumentRef>, PhraseError> {
        match (&self.doc_id, &self.sitename) {
            (Some(doc_id), Some(sitename)) => Ok(Some(DocumentRef {
                sitename: sitename.clone(),
                doc_id: doc_id.clone(),
            })),
            (None, None) => Ok(None),
            _ => Err(PhraseError::validation(
                "doc_id",
                "doc_id and sitename must be given together",
            )),
        }
    }
}

/// POST /api/doc-process/
pub(super) async fn doc_process(
    State(state): State<AppState>,
    query: Result<Query<DocProcessQuery>, QueryRejection>,
    body: Result<Json<DocumentBody>, JsonRejection>,
) -> ApiResult {
    let Query(query) = query.map_err(|e| rejected("query", e))?;
    let Json(body) = body.map_err(|e| rejected("document", e))?;

    let options = query.options()?;
    let doc_ref = query.doc_ref()?;

    let report = state
        .processor
        .process(&body.document, &options, doc_ref.as_ref())
        .await?;

    tracing::info!(
        doc_type = %options.doc_type,
        doc_id = doc_ref.as_ref().map(|r| r.doc_id.as_str()).unwrap_or("-"),
        phrases = report.vertices.upserted,
        edges = report.edges.upserted,
        abandoned = report.abandoned(),
        "Results integration done"
    );
    Ok(created("Results integration done."))
}

#[derive(Deserialize)]
pub(super) struct FetchQuery {
    status: Option<String>,
    limit: Option<u64>,
    page: Option<u64>,
}

/// GET /api/data-fetcher/
pub(super) async fn data_fetcher(
    State(state): State<AppState>,
    query: Result<Query<FetchQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query.map_err(|e| rejected("query", e))?;

    let filter = match query.status.as_deref() {
        None | Some("") => StatusFilter::All,
        Some(raw) => raw
            .parse::<StatusFilter>()
            .map_err(|_| PhraseError::validation("status", "Wrong status code input."))?,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let page = query.page.unwrap_or(DEFAULT_PAGE);
    if limit == 0 {
        return Err(PhraseError::validation("limit", "limit must be at least 1").into());
    }
    if page == 0 {
        return Err(PhraseError::validation("page", "page must be at least 1").into());
    }

    let offset = (page - 1).saturating_mul(limit);
    let items = state
        .processor
        .store()
        .fetch_phrases(filter, limit, offset)
        .await
        .map_err(PhraseError::from)?;

    Ok((StatusCode::OK, Json(json!({ "items": items }))))
}

/// POST /api/status-updater/{phrase}/{code}
pub(super) async fn status_updater(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> ApiResult {
    let Path((phrase, code)) = path.map_err(|e| rejected("path", e))?;

    let status = code
        .parse::<u8>()
        .ok()
        .and_then(PhraseStatus::from_code)
        .ok_or_else(|| PhraseError::validation("code", "Status code must be 0 (stop) or 1 (highlight)"))?;

    let updated = state
        .processor
        .store()
        .set_status(&content_key(&phrase), status)
        .await
        .map_err(PhraseError::from)?;
    if !updated {
        return Err(PhraseError::not_found(format!("phrase '{}'", phrase)).into());
    }

    tracing::info!(phrase = %phrase, status = %status, "Phrase status updated");
    Ok(created("Status updated."))
}

#[derive(Deserialize)]
pub(super) struct WordGraphQuery {
    #[serde(default)]
    doc_type: DocType,
}

/// POST /api/word-graph/
pub(super) async fn word_graph(
    State(state): State<AppState>,
    query: Result<Query<WordGraphQuery>, QueryRejection>,
    body: Result<Json<DocumentBody>, JsonRejection>,
) -> ApiResult {
    let Query(query) = query.map_err(|e| rejected("query", e))?;
    let Json(body) = body.map_err(|e| rejected("document", e))?;

    let report = state
        .processor
        .process_word_graph(&body.document, query.doc_type)
        .await?;

    tracing::info!(
        words = report.vertices.upserted,
        links = report.edges.upserted,
        abandoned = report.abandoned(),
        "Finished creating word graph"
    );
    Ok(created("Results integration done."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(ngram_range: Option<&str>, doc_id: Option<&str>, sitename: Option<&str>) -> DocProcessQuery {
        DocProcessQuery {
            doc_type: DocType::Text,
            replace_stop: false,
            tag_stop: true,
            tag_highlight: false,
            ngram_range: ngram_range.map(str::to_string),
            doc_id: doc_id.map(str::to_string),
            sitename: sitename.map(str::to_string),
        }
    }

    #[test]
    fn test_options_from_query() {
        let options = query(Some("2,4"), None, None).options().unwrap();
        assert_eq!(options.ngram_range, NgramRange::new(2, 4).unwrap());
        assert!(options.tag_stop);
        assert!(query(Some("4,2"), None, None).options().is_err());
        assert_eq!(query(None, None, None).options().unwrap().ngram_range, NgramRange::default());
    }

    #[test]
    fn test_doc_ref_requires_both_fields() {
        assert!(query(None, None, None).doc_ref().unwrap().is_none());
        let doc_ref = query(None, Some("7"), Some("news")).doc_ref().unwrap().unwrap();
        assert_eq!(doc_ref.doc_id, "7");
        assert!(query(None, Some("7"), None).doc_ref().is_err());
    }
}
