/// Suggested-highlight tagging of all-entity phrases.
///
/// Walks the aggregated phrase collection in offset windows ordered by key
/// and marks every untagged phrase whose words are all known named entities.
/// The update is conditional on the status still being unset, so manual tags
/// are never overwritten and re-runs are harmless.

use std::fmt;
use std::sync::Arc;

use super::{BatchReport, Connections, UnitOutcome, WorkerPool};
use crate::errors::PhraseError;
use crate::graph::GraphStore;
use crate::model::content_key;

pub const DEFAULT_CHUNK_SIZE: u64 = 1000;

/// One offset window of the aggregated collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offset {} (+{})", self.offset, self.limit)
    }
}

/// ceil(max_records / chunk_size) windows covering `[0, max_records)`.
pub fn windows(max_records: u64, chunk_size: u64) -> Vec<Window> {
    let chunk_size = chunk_size.max(1);
    let count = max_records.div_ceil(chunk_size);
    (0..count)
        .map(|i| Window {
            offset: i * chunk_size,
            limit: chunk_size,
        })
        .collect()
}

pub async fn search_named_entities(
    connections: Arc<dyn Connections>,
    max_records: u64,
    chunk_size: u64,
    n_jobs: usize,
) -> Result<BatchReport, PhraseError> {
    let windows = windows(max_records, chunk_size);
    tracing::info!(windows = windows.len(), n_jobs, "Starting NE search");

    let pool = WorkerPool::new("search-NE", n_jobs);
    let report = pool
        .run(windows, |window| {
            let connections = connections.clone();
            async move { tag_window(connections.as_ref(), window).await }
        })
        .await;
    Ok(report)
}

/// Whether every word of `phrase` is a known entity.
async fn all_entities(store: &dyn GraphStore, phrase: &str) -> Result<bool, PhraseError> {
    let mut words = phrase.split_whitespace().peekable();
    if words.peek().is_none() {
        return Ok(false);
    }
    for word in words {
        if !store.has_entity(&content_key(word)).await? {
            return Ok(false);
        }
    }
    Ok(true)
}

async fn tag_window(connections: &dyn Connections, window: Window) -> Result<UnitOutcome, PhraseError> {
    let store = connections.graph_store().await?;
    let phrases = store.phrase_window(window.offset, window.limit).await?;

    let mut outcome = UnitOutcome::default();
    let mut scanned = 0usize;
    for phrase in phrases.iter().filter(|p| p.status.is_none()) {
        scanned += 1;
        if all_entities(store.as_ref(), &phrase.bag).await? && store.suggest_highlight(&phrase.key).await? {
            outcome.records += 1;
        }
    }

    tracing::info!(window = %window, scanned, tagged = outcome.records, "Finished window");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::testing::StaticConnections;
    use crate::model::{PhraseRecord, PhraseStatus};

    #[test]
    fn test_windows_round_up() {
        assert_eq!(windows(2500, 1000).len(), 3);
        assert_eq!(windows(2000, 1000).len(), 2);
        assert!(windows(0, 1000).is_empty());
        assert_eq!(windows(5, 2)[2], Window { offset: 4, limit: 2 });
    }

    #[tokio::test]
    async fn test_tags_only_untagged_entity_phrases() {
        let connections = Arc::new(StaticConnections::new().await);
        let graph = &connections.graph;
        graph.insert_entity("alice").await.unwrap();
        graph.insert_entity("bob").await.unwrap();
        graph.upsert_phrase(&PhraseRecord::new("alice bob", 3, None)).await.unwrap();
        graph.upsert_phrase(&PhraseRecord::new("alice xyz", 2, None)).await.unwrap();
        graph
            .upsert_phrase(&PhraseRecord::new("bob", 1, Some(PhraseStatus::Stop)))
            .await
            .unwrap();

        let report = search_named_entities(connections.clone(), 3, 2, 2).await.unwrap();
        assert_eq!(report.units, 2);
        assert_eq!(report.records, 1);

        assert_eq!(
            graph.phrase("alice bob").await.unwrap().status,
            Some(PhraseStatus::SuggestedHighlight)
        );
        assert_eq!(graph.phrase("alice xyz").await.unwrap().status, None);
        assert_eq!(graph.phrase("bob").await.unwrap().status, Some(PhraseStatus::Stop));

        // Idempotent
        let rerun = search_named_entities(connections.clone(), 3, 2, 2).await.unwrap();
        assert_eq!(rerun.records, 0);
    }
}
