/// Incremental ingestion of one site's articles.
///
/// Resolves the id span to scan (tracker checkpoint up to the source's
/// maximum id unless overridden), splits it into id ranges and submits every
/// pending article of a range to the document sink. Successful articles
/// advance the checkpoint and are marked processed; failures are marked failed
/// so a later run covering their range picks them up again.

use std::sync::Arc;

use super::{BatchReport, Connections, UnitOutcome, WorkerPool};
use crate::errors::PhraseError;
use crate::pipeline::{DocumentRef, ProcessOptions};
use crate::source::{partition_ranges, IdRange, ProcStatus};

#[derive(Debug, Clone)]
pub struct IngestArgs {
    pub sitename: String,
    /// Source database host, part of the checkpoint key.
    pub host: String,
    /// First id to scan; defaults to the tracker checkpoint.
    pub min_id: Option<i64>,
    /// Last id to scan; defaults to the source's maximum id.
    pub max_id: Option<i64>,
    pub range_width: i64,
    pub options: ProcessOptions,
    pub n_jobs: usize,
}

pub async fn ingest_site(connections: Arc<dyn Connections>, args: IngestArgs) -> Result<BatchReport, PhraseError> {
    let tracker = connections.tracker().await?;
    tracker.init().await?;
    let source = connections.article_source().await?;

    let min_id = match args.min_id {
        Some(id) => id,
        None => tracker.get_last_id(&args.sitename, &args.host).await?,
    };
    let max_id = match args.max_id {
        Some(id) => id,
        None => source.max_id().await?,
    };

    if min_id == 0 {
        tracing::info!(sitename = %args.sitename, "First time ingesting site");
    } else {
        tracing::info!(sitename = %args.sitename, from_id = min_id, "Resuming ingestion");
    }

    let ranges = partition_ranges(min_id, max_id, args.range_width);
    tracing::info!(
        sitename = %args.sitename,
        min_id,
        max_id,
        ranges = ranges.len(),
        "Partitioned article ids"
    );

    let pool = WorkerPool::new(format!("ingest {}", args.sitename), args.n_jobs);
    let args = Arc::new(args);
    let report = pool
        .run(ranges, |range| {
            let connections = connections.clone();
            let args = args.clone();
            async move { ingest_range(connections.as_ref(), &args, range).await }
        })
        .await;
    Ok(report)
}

async fn ingest_range(
    connections: &dyn Connections,
    args: &IngestArgs,
    range: IdRange,
) -> Result<UnitOutcome, PhraseError> {
    let source = connections.article_source().await?;
    let tracker = connections.tracker().await?;
    let sink = connections.document_sink().await?;

    let articles = source.pending_articles(range).await?;
    let mut outcome = UnitOutcome::default();

    for article in articles {
        let doc_ref = DocumentRef {
            sitename: args.sitename.clone(),
            doc_id: article.id.to_string(),
        };
        let result = match article.content.as_deref() {
            Some(content) => sink.submit(content, &args.options, &doc_ref).await,
            None => Err(PhraseError::validation("content", "Article has no content")),
        };

        match result {
            Ok(report) => {
                tracker.set_last_id(&args.sitename, &args.host, article.id).await?;
                source.mark_status(article.id, ProcStatus::Processed).await?;
                outcome.records += 1;
                outcome.abandoned += report.map(|r| r.abandoned()).unwrap_or(0);
                tracing::debug!(sitename = %args.sitename, article_id = article.id, "Ingested article");
            }
            Err(e) => {
                tracing::error!(
                    sitename = %args.sitename,
                    article_id = article.id,
                    error = %e,
                    "Failed ingesting article"
                );
                source.mark_status(article.id, ProcStatus::Failed).await?;
                outcome.failed_records += 1;
            }
        }
    }

    tracing::info!(sitename = %args.sitename, range = %range, records = outcome.records, "Finished id range");
    Ok(outcome)
}
