/// Folding staged per-document phrases and edges into the aggregated
/// collections.

use std::fmt;
use std::sync::Arc;

use super::{BatchReport, Connections, UnitOutcome, WorkerPool};
use crate::aggregate::AggregateReport;
use crate::errors::PhraseError;
use crate::graph::GraphError;
use crate::source::{partition_ranges, IdRange};

/// Documents handled by one worker task.
const DOCS_PER_UNIT: usize = 50;

/// Which documents of a site to aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocTargets {
    /// Every id from 0 up to and including the given one.
    MaxId(i64),
    IdList(Vec<String>),
}

impl DocTargets {
    /// Split the targets into units of at most `DOCS_PER_UNIT` documents.
    /// Id spans stay ranges; ids are only formatted once a unit runs.
    pub fn chunks(self) -> Vec<DocChunk> {
        match self {
            DocTargets::MaxId(max) => partition_ranges(0, max, DOCS_PER_UNIT as i64)
                .into_iter()
                .map(DocChunk::Range)
                .collect(),
            DocTargets::IdList(ids) => ids
                .chunks(DOCS_PER_UNIT)
                .map(|ids| DocChunk::List(ids.to_vec()))
                .collect(),
        }
    }
}

/// One worker unit of document ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocChunk {
    Range(IdRange),
    List(Vec<String>),
}

impl DocChunk {
    pub fn doc_ids(&self) -> Vec<String> {
        match self {
            DocChunk::Range(range) => (range.start..=range.end).map(|id| id.to_string()).collect(),
            DocChunk::List(ids) => ids.clone(),
        }
    }
}

impl fmt::Display for DocChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocChunk::Range(range) => write!(f, "docs {}", range),
            DocChunk::List(ids) => match (ids.first(), ids.last()) {
                (Some(first), Some(last)) => write!(f, "docs {}..{} ({})", first, last, ids.len()),
                _ => f.write_str("docs (none)"),
            },
        }
    }
}

pub async fn chunk_aggregate(
    connections: Arc<dyn Connections>,
    sitename: String,
    targets: DocTargets,
    n_jobs: usize,
) -> Result<BatchReport, PhraseError> {
    let chunks = targets.chunks();

    tracing::info!(sitename = %sitename, chunks = chunks.len(), n_jobs, "Starting chunk aggregation");

    let sitename = Arc::new(sitename);
    let pool = WorkerPool::new("chunk-agg", n_jobs);
    let report = pool
        .run(chunks, |chunk| {
            let connections = connections.clone();
            let sitename = sitename.clone();
            async move { aggregate_chunk(connections.as_ref(), &sitename, chunk).await }
        })
        .await;
    Ok(report)
}

async fn aggregate_chunk(
    connections: &dyn Connections,
    sitename: &str,
    chunk: DocChunk,
) -> Result<UnitOutcome, PhraseError> {
    let aggregator = connections.aggregator().await?;
    let mut outcome = UnitOutcome::default();

    for doc_id in &chunk.doc_ids() {
        let store = aggregator.store();
        let staged = async {
            Ok::<_, GraphError>((
                store.doc_phrases(sitename, doc_id).await?,
                store.doc_edges(sitename, doc_id).await?,
            ))
        };
        let (phrases, edges) = match staged.await {
            Ok(staged) => staged,
            Err(e) => {
                tracing::error!(sitename, doc_id = %doc_id, error = %e, "Failed fetching staged records");
                outcome.failed_records += 1;
                continue;
            }
        };
        if phrases.is_empty() && edges.is_empty() {
            tracing::debug!(sitename, doc_id = %doc_id, "No staged records");
            continue;
        }

        let mut doc_report = AggregateReport::default();
        for record in phrases.iter().filter(|r| !r.is_aggregated()) {
            let result = aggregator.aggregate_doc_phrase(record).await;
            doc_report.record(&result);
        }
        for record in edges.iter().filter(|r| !r.is_aggregated()) {
            let result = aggregator.aggregate_doc_edge(record).await;
            doc_report.record(&result);
        }

        outcome.records += doc_report.upserted;
        outcome.abandoned += doc_report.abandoned;
        tracing::debug!(
            sitename,
            doc_id = %doc_id,
            aggregated = doc_report.upserted,
            abandoned = doc_report.abandoned,
            "Aggregated document"
        );
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphStore;
    use crate::jobs::testing::StaticConnections;
    use crate::model::{DocEdgeRecord, DocPhraseRecord, EdgeKind, EdgeRecord, PhraseRecord};

    async fn stage(connections: &StaticConnections, doc_id: &str, bag: &str, count: u64) {
        let record = DocPhraseRecord::new("news", doc_id, &PhraseRecord::new(bag, count, None));
        connections.graph.stage_doc_phrase(&record).await.unwrap();
    }

    #[test]
    fn test_doc_targets() {
        let chunks = DocTargets::MaxId(2).chunks();
        assert_eq!(chunks, vec![DocChunk::Range(IdRange { start: 0, end: 2 })]);
        assert_eq!(chunks[0].doc_ids(), vec!["0", "1", "2"]);

        let chunks = DocTargets::IdList(vec!["7".into(), "9".into()]).chunks();
        assert_eq!(chunks[0].doc_ids(), vec!["7", "9"]);
    }

    #[test]
    fn test_large_max_id_stays_ranges() {
        let chunks = DocTargets::MaxId(1_999_999).chunks();
        assert_eq!(chunks.len(), 40_000);
        assert_eq!(chunks[1], DocChunk::Range(IdRange { start: 50, end: 99 }));
        assert_eq!(
            chunks.last(),
            Some(&DocChunk::Range(IdRange { start: 1_999_950, end: 1_999_999 }))
        );
        assert_eq!(chunks[0].doc_ids().len(), 50);
    }

    #[tokio::test]
    async fn test_folds_staged_edges_once() {
        let connections = Arc::new(StaticConnections::new().await);
        let edge = DocEdgeRecord::new("news", "4", &EdgeRecord::new("a", "b", 1));
        connections.graph.stage_doc_edge(&edge).await.unwrap();
        stage(&connections, "4", "a", 1).await;

        let report = chunk_aggregate(connections.clone(), "news".into(), DocTargets::MaxId(60), 2)
            .await
            .unwrap();
        assert_eq!(report.units, 2);
        assert_eq!(report.records, 2);
        assert_eq!(connections.graph.edge(EdgeKind::Phrase, "a_b").await.unwrap().count, 1);

        let rerun = chunk_aggregate(connections.clone(), "news".into(), DocTargets::MaxId(60), 2)
            .await
            .unwrap();
        assert_eq!(rerun.records, 0);
        assert_eq!(connections.graph.edge(EdgeKind::Phrase, "a_b").await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_aggregates_across_documents_once() {
        let connections = Arc::new(StaticConnections::new().await);
        stage(&connections, "1", "hello", 2).await;
        stage(&connections, "2", "hello", 3).await;
        stage(&connections, "2", "world", 1).await;

        let report = chunk_aggregate(connections.clone(), "news".into(), DocTargets::MaxId(3), 2)
            .await
            .unwrap();
        assert_eq!(report.records, 3);
        assert_eq!(connections.graph.phrase("hello").await.unwrap().count, 5);

        // Re-running must not double count
        let rerun = chunk_aggregate(connections.clone(), "news".into(), DocTargets::MaxId(3), 2)
            .await
            .unwrap();
        assert_eq!(rerun.records, 0);
        assert_eq!(connections.graph.phrase("hello").await.unwrap().count, 5);
    }

    #[tokio::test]
    async fn test_id_list_limits_documents() {
        let connections = Arc::new(StaticConnections::new().await);
        stage(&connections, "1", "alpha", 1).await;
        stage(&connections, "2", "beta", 1).await;

        chunk_aggregate(connections.clone(), "news".into(), DocTargets::IdList(vec!["2".into()]), 2)
            .await
            .unwrap();
        assert!(connections.graph.phrase("alpha").await.is_none());
        assert_eq!(connections.graph.phrase("beta").await.unwrap().count, 1);
    }
}
