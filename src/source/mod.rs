/// Article source abstraction
///
/// The relational table the ingest job reads articles from and writes the
/// per-row processing status back to.

use async_trait::async_trait;
use std::fmt;

use crate::errors::PhraseError;

pub mod memory;
pub mod mysql;

pub use memory::InMemoryArticleSource;
pub use mysql::MySqlArticleSource;

/// One source row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub id: i64,
    /// NULL content rows are marked failed.
    pub content: Option<String>,
}

/// Terminal processing status written back to the source row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ProcStatus {
    Processed = 1,
    Failed = 2,
}

impl ProcStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Inclusive id range handed to one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    pub start: i64,
    pub end: i64,
}

impl IdRange {
    pub fn contains(&self, id: i64) -> bool {
        self.start <= id && id <= self.end
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Split `[min, max]` into contiguous inclusive ranges of at most `width` ids.
pub fn partition_ranges(min: i64, max: i64, width: i64) -> Vec<IdRange> {
    let width = width.max(1);
    let mut ranges = Vec::new();
    let mut start = min;
    while start <= max {
        let end = start.saturating_add(width - 1).min(max);
        ranges.push(IdRange { start, end });
        if end == i64::MAX {
            break;
        }
        start = end + 1;
    }
    ranges
}

/// Row counts shown by `view-progress`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounts {
    pub total: u64,
    pub processed: u64,
    pub failed: u64,
}

#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Highest article id, 0 for an empty table.
    async fn max_id(&self) -> Result<i64, PhraseError>;

    /// Rows in `range` not yet processed, by id. Failed rows are included.
    async fn pending_articles(&self, range: IdRange) -> Result<Vec<Article>, PhraseError>;

    async fn mark_status(&self, id: i64, status: ProcStatus) -> Result<(), PhraseError>;

    async fn progress(&self) -> Result<ProgressCounts, PhraseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_covers_range() {
        let ranges = partition_ranges(0, 250, 100);
        assert_eq!(
            ranges,
            vec![
                IdRange { start: 0, end: 99 },
                IdRange { start: 100, end: 199 },
                IdRange { start: 200, end: 250 },
            ]
        );
    }

    #[test]
    fn test_partition_edge_cases() {
        assert!(partition_ranges(10, 5, 100).is_empty());
        assert_eq!(partition_ranges(7, 7, 100), vec![IdRange { start: 7, end: 7 }]);
        assert_eq!(partition_ranges(1, 3, 0).len(), 3);
        assert_eq!(
            partition_ranges(i64::MAX - 1, i64::MAX, 10),
            vec![IdRange { start: i64::MAX - 1, end: i64::MAX }]
        );
    }

    #[test]
    fn test_proc_status_codes() {
        assert_eq!(ProcStatus::Processed.code(), 1);
        assert_eq!(ProcStatus::Failed.code(), 2);
        assert_eq!(IdRange { start: 1, end: 5 }.to_string(), "1..=5");
    }
}
