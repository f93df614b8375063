/// Upsert-with-retry against the graph store
///
/// Wraps every graph write in a bounded retry loop. Transient conflicts are
/// retried with a fixed pause; anything else, or running out of attempts,
/// abandons the record. Abandonment is returned as a value (never raised) so
/// callers can count it and carry on with the next record.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::graph::{GraphError, GraphStore};
use crate::model::{DocEdgeRecord, DocPhraseRecord, EdgeKind, EdgeRecord, PhraseRecord, WordRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy::new(config.max_attempts, Duration::from_millis(config.backoff_ms))
    }
}

/// A record the aggregator gave up on.
#[derive(Debug, thiserror::Error)]
#[error("Abandoned {key} after {attempts} attempt(s): {reason}")]
pub struct Abandoned {
    pub key: String,
    pub attempts: u32,
    pub reason: GraphError,
}

/// Upserted/abandoned tally of a batch of aggregator calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateReport {
    pub upserted: usize,
    pub abandoned: usize,
}

impl AggregateReport {
    pub fn record(&mut self, result: &Result<(), Abandoned>) {
        match result {
            Ok(()) => self.upserted += 1,
            Err(_) => self.abandoned += 1,
        }
    }

    pub fn merge(&mut self, other: AggregateReport) {
        self.upserted += other.upserted;
        self.abandoned += other.abandoned;
    }
}

#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn GraphStore>,
    policy: RetryPolicy,
}

impl Aggregator {
    pub fn new(store: Arc<dyn GraphStore>, policy: RetryPolicy) -> Self {
        Aggregator { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub async fn upsert_phrase(&self, phrase: &PhraseRecord) -> Result<(), Abandoned> {
        let store = self.store.as_ref();
        self.with_retry(&phrase.key, move || store.upsert_phrase(phrase)).await
    }

    pub async fn upsert_word(&self, word: &WordRecord) -> Result<(), Abandoned> {
        let store = self.store.as_ref();
        self.with_retry(&word.key, move || store.upsert_word(word)).await
    }

    pub async fn upsert_edge(&self, kind: EdgeKind, edge: &EdgeRecord) -> Result<(), Abandoned> {
        let store = self.store.as_ref();
        self.with_retry(&edge.key, move || store.upsert_edge(kind, edge)).await
    }

    pub async fn stage_doc_phrase(&self, record: &DocPhraseRecord) -> Result<(), Abandoned> {
        let store = self.store.as_ref();
        self.with_retry(&record.key, move || store.stage_doc_phrase(record)).await
    }

    pub async fn aggregate_doc_phrase(&self, record: &DocPhraseRecord) -> Result<(), Abandoned> {
        let store = self.store.as_ref();
        self.with_retry(&record.key, move || store.aggregate_doc_phrase(record)).await
    }

    pub async fn stage_doc_edge(&self, record: &DocEdgeRecord) -> Result<(), Abandoned> {
        let store = self.store.as_ref();
        self.with_retry(&record.key, move || store.stage_doc_edge(record)).await
    }

    pub async fn aggregate_doc_edge(&self, record: &DocEdgeRecord) -> Result<(), Abandoned> {
        let store = self.store.as_ref();
        self.with_retry(&record.key, move || store.aggregate_doc_edge(record)).await
    }

    async fn with_retry<F, Fut>(&self, key: &str, mut op: F) -> Result<(), Abandoned>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), GraphError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    tracing::warn!(
                        key = %key,
                        attempt,
                        error = %e,
                        "Upsert conflict, retrying"
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                }
                Err(e) => {
                    tracing::error!(
                        key = %key,
                        attempts = attempt,
                        error = %e,
                        "Upsert abandoned"
                    );
                    return Err(Abandoned {
                        key: key.to_string(),
                        attempts: attempt,
                        reason: e,
                    });
                }
            }
        }
    }
}
