/// In-memory article source for tests and dry runs.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::{Article, ArticleSource, IdRange, ProcStatus, ProgressCounts};
use crate::errors::PhraseError;

#[derive(Default)]
pub struct InMemoryArticleSource {
    rows: Mutex<BTreeMap<i64, (Option<String>, Option<ProcStatus>)>>,
}

impl InMemoryArticleSource {
    pub fn new() -> Self {
        InMemoryArticleSource::default()
    }

    pub async fn insert(&self, id: i64, content: Option<&str>) {
        self.rows
            .lock()
            .await
            .insert(id, (content.map(str::to_string), None));
    }

    pub async fn status(&self, id: i64) -> Option<ProcStatus> {
        self.rows.lock().await.get(&id).and_then(|(_, status)| *status)
    }
}

#[async_trait]
impl ArticleSource for InMemoryArticleSource {
    async fn max_id(&self) -> Result<i64, PhraseError> {
        Ok(self.rows.lock().await.keys().next_back().copied().unwrap_or(0))
    }

    async fn pending_articles(&self, range: IdRange) -> Result<Vec<Article>, PhraseError> {
        if range.start > range.end {
            return Ok(Vec::new());
        }
        Ok(self
            .rows
            .lock()
            .await
            .range(range.start..=range.end)
            .filter(|(_, (_, status))| *status != Some(ProcStatus::Processed))
            .map(|(id, (content, _))| Article {
                id: *id,
                content: content.clone(),
            })
            .collect())
    }

    async fn mark_status(&self, id: i64, status: ProcStatus) -> Result<(), PhraseError> {
        if let Some(row) = self.rows.lock().await.get_mut(&id) {
            row.1 = Some(status);
        }
        Ok(())
    }

    async fn progress(&self) -> Result<ProgressCounts, PhraseError> {
        let rows = self.rows.lock().await;
        let count = |wanted: ProcStatus| rows.values().filter(|(_, s)| *s == Some(wanted)).count() as u64;
        Ok(ProgressCounts {
            total: rows.len() as u64,
            processed: count(ProcStatus::Processed),
            failed: count(ProcStatus::Failed),
        })
    }
}
