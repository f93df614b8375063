/// Graph store abstraction layer
///
/// Provides the GraphStore trait over the phrase/word vertices, co-occurrence
/// edges and the lookup collections (stop words, named entities, frequent
/// phrase lists). ArangoDB is the production backend; the in-memory store
/// backs tests and dry runs.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{
    DocEdgeRecord, DocPhraseRecord, EdgeKind, EdgeRecord, FrequentKind, PhraseRecord, PhraseStatus, StatusFilter,
    WordRecord,
};

pub mod arango;
pub mod memory;

pub use arango::ArangoGraphStore;
pub use memory::InMemoryGraphStore;

/// ArangoDB write-write conflict.
pub const ERROR_CONFLICT: i64 = 1200;
/// ArangoDB unique constraint violated (concurrent insert of the same key).
pub const ERROR_UNIQUE_CONSTRAINT: i64 = 1210;

/// Errors returned by graph store operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Lost a race with a concurrent writer; safe to retry
    #[error("Transient conflict: {0}")]
    Transient(String),

    /// The server rejected the query
    #[error("Query failed (HTTP {code}, error {num}): {message}")]
    Query { code: u16, num: i64, message: String },

    /// The server could not be reached or timed out
    #[error("Connection error: {0}")]
    Connection(String),

    /// The response did not have the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Internal graph store error: {0}")]
    Internal(String),
}

impl GraphError {
    /// Whether the same request may succeed if simply sent again.
    pub fn is_transient(&self) -> bool {
        match self {
            GraphError::Transient(_) => true,
            GraphError::Query { code, num, .. } => {
                matches!(*num, ERROR_CONFLICT | ERROR_UNIQUE_CONSTRAINT) || matches!(*code, 409 | 503)
            }
            _ => false,
        }
    }
}

/// Core abstraction for graph persistence.
///
/// Every upsert is an insert-or-increment keyed by the record's content hash:
/// absent records are inserted with the incoming count, present ones get the
/// incoming count added. Other fields are only written on insert.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_phrase(&self, phrase: &PhraseRecord) -> Result<(), GraphError>;

    async fn upsert_word(&self, word: &WordRecord) -> Result<(), GraphError>;

    /// Upsert an edge; `kind` picks the phrase or word edge collection.
    async fn upsert_edge(&self, kind: EdgeKind, edge: &EdgeRecord) -> Result<(), GraphError>;

    /// Write a per-document staging record. An existing record with the same
    /// key is left untouched, so re-posting a document does not double count.
    async fn stage_doc_phrase(&self, record: &DocPhraseRecord) -> Result<(), GraphError>;

    /// Staging records of one document.
    async fn doc_phrases(&self, sitename: &str, doc_id: &str) -> Result<Vec<DocPhraseRecord>, GraphError>;

    /// Fold a staging record into the aggregated collection and set its
    /// agg_status, as one operation. Already aggregated records are skipped.
    async fn aggregate_doc_phrase(&self, record: &DocPhraseRecord) -> Result<(), GraphError>;

    /// Stage a phrase edge of one document. Like `stage_doc_phrase`, an
    /// existing record is left untouched.
    async fn stage_doc_edge(&self, record: &DocEdgeRecord) -> Result<(), GraphError>;

    async fn doc_edges(&self, sitename: &str, doc_id: &str) -> Result<Vec<DocEdgeRecord>, GraphError>;

    /// Fold a staged edge into the phrase edge collection and mark it
    /// aggregated. Already aggregated records are skipped.
    async fn aggregate_doc_edge(&self, record: &DocEdgeRecord) -> Result<(), GraphError>;

    /// Set the status of an aggregated phrase. Returns false when no phrase has
    /// this key.
    async fn set_status(&self, key: &str, status: PhraseStatus) -> Result<bool, GraphError>;

    /// Aggregated phrases matching `filter`, by count descending.
    async fn fetch_phrases(
        &self,
        filter: StatusFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<PhraseRecord>, GraphError>;

    /// A stable window of aggregated phrases, ordered by key.
    async fn phrase_window(&self, offset: u64, limit: u64) -> Result<Vec<PhraseRecord>, GraphError>;

    /// Mark a phrase suggested-highlight if its status is still unset.
    /// Returns whether the update applied.
    async fn suggest_highlight(&self, key: &str) -> Result<bool, GraphError>;

    /// Whether an entity with this key (hash of the word) is known.
    async fn has_entity(&self, key: &str) -> Result<bool, GraphError>;

    /// Record a named entity. Returns false if it was already known.
    async fn insert_entity(&self, word: &str) -> Result<bool, GraphError>;

    /// Every known named entity.
    async fn entities(&self) -> Result<Vec<String>, GraphError>;

    async fn stop_words(&self) -> Result<Vec<String>, GraphError>;

    /// Pre-recorded frequent phrases of one kind.
    async fn frequent_phrases(&self, kind: FrequentKind) -> Result<Vec<String>, GraphError>;

    /// Empty every collection. Only meant for tests and local resets.
    async fn truncate_all(&self) -> Result<(), GraphError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let conflict = GraphError::Query { code: 409, num: ERROR_CONFLICT, message: "conflict".into() };
        assert!(conflict.is_transient());

        let unique = GraphError::Query { code: 400, num: ERROR_UNIQUE_CONSTRAINT, message: "dup".into() };
        assert!(unique.is_transient());

        let unavailable = GraphError::Query { code: 503, num: 0, message: "busy".into() };
        assert!(unavailable.is_transient());

        let syntax = GraphError::Query { code: 400, num: 1501, message: "syntax error".into() };
        assert!(!syntax.is_transient());

        assert!(!GraphError::Connection("refused".into()).is_transient());
        assert!(GraphError::Transient("retry".into()).is_transient());
    }
}
