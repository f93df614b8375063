/// Processing progress of the article source.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::Connections;
use crate::errors::PhraseError;
use crate::source::ProgressCounts;

fn rate_bar(label: &str, total: u64, position: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg:>14} [{bar:40}] {pos}/{len} ({percent}%)")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message(label.to_string());
    bar.set_position(position.min(total));
    bar
}

/// Show processed and failed rows against the table total.
pub async fn view_progress(connections: &dyn Connections) -> Result<ProgressCounts, PhraseError> {
    let source = connections.article_source().await?;
    let counts = source.progress().await?;

    tracing::info!(
        total = counts.total,
        processed = counts.processed,
        failed = counts.failed,
        "Source progress"
    );

    let bars = MultiProgress::new();
    let processed = bars.add(rate_bar("PROGRESS RATE", counts.total, counts.processed));
    let failed = bars.add(rate_bar("FAILED RATE", counts.total, counts.failed));
    processed.abandon();
    failed.abandon();

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::testing::StaticConnections;
    use crate::source::{ArticleSource, ProcStatus};

    #[tokio::test]
    async fn test_view_progress_counts() {
        let connections = StaticConnections::new().await;
        for id in 1..=4 {
            connections.source.insert(id, Some("text")).await;
        }
        connections.source.mark_status(1, ProcStatus::Processed).await.unwrap();
        connections.source.mark_status(2, ProcStatus::Processed).await.unwrap();
        connections.source.mark_status(3, ProcStatus::Failed).await.unwrap();

        let counts = view_progress(&connections).await.unwrap();
        assert_eq!(counts, ProgressCounts { total: 4, processed: 2, failed: 1 });
    }

    #[test]
    fn test_rate_bar_clamps_position() {
        let bar = rate_bar("x", 3, 10);
        assert_eq!(bar.position(), 3);
    }
}
