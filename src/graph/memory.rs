/// In-memory graph store
///
/// Same upsert semantics as the ArangoDB store, kept in hash maps. Used by
/// tests and by `serve --in-memory` for local experiments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{GraphError, GraphStore};
use crate::model::{
    content_key, DocEdgeRecord, DocPhraseRecord, EdgeKind, EdgeRecord, FrequentKind, PhraseRecord, PhraseStatus,
    StatusFilter, WordRecord,
};

#[derive(Default)]
struct Collections {
    phrases: HashMap<String, PhraseRecord>,
    doc_phrases: HashMap<String, DocPhraseRecord>,
    doc_edges: HashMap<String, DocEdgeRecord>,
    words: HashMap<String, WordRecord>,
    phrase_edges: HashMap<String, EdgeRecord>,
    word_edges: HashMap<String, EdgeRecord>,
    entities: HashMap<String, String>,
    stop_words: Vec<String>,
    repeated_stops: Vec<String>,
    repeated_ne: Vec<String>,
}

impl Collections {
    fn edges_mut(&mut self, kind: EdgeKind) -> &mut HashMap<String, EdgeRecord> {
        match kind {
            EdgeKind::Phrase => &mut self.phrase_edges,
            EdgeKind::Word => &mut self.word_edges,
        }
    }

    fn upsert_phrase(&mut self, phrase: &PhraseRecord, collection: &str) {
        self.phrases
            .entry(phrase.key.clone())
            .and_modify(|existing| existing.count += phrase.count)
            .or_insert_with(|| PhraseRecord {
                object_id: Some(format!("{}/{}", collection, phrase.key)),
                ..phrase.clone()
            });
    }

    fn upsert_edge(&mut self, kind: EdgeKind, edge: &EdgeRecord) {
        self.edges_mut(kind)
            .entry(edge.key.clone())
            .and_modify(|existing| existing.count += edge.count)
            .or_insert_with(|| edge.clone());
    }
}

pub struct InMemoryGraphStore {
    inner: Mutex<Collections>,
    phrase_collection: String,
    /// Number of upcoming writes that fail with a transient conflict.
    transient_failures: AtomicU32,
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        InMemoryGraphStore::new()
    }
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        InMemoryGraphStore {
            inner: Mutex::new(Collections::default()),
            phrase_collection: "agg_phrases".to_string(),
            transient_failures: AtomicU32::new(0),
        }
    }

    /// Make the next `n` writes fail with `GraphError::Transient`.
    pub fn inject_transient_failures(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    fn take_failure(&self) -> Result<(), GraphError> {
        let took = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            Err(GraphError::Transient("injected write-write conflict".to_string()))
        } else {
            Ok(())
        }
    }

    pub async fn add_stop_words<I, S>(&self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.lock().await.stop_words.extend(words.into_iter().map(Into::into));
    }

    pub async fn add_frequent_phrases<I, S>(&self, kind: FrequentKind, phrases: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = self.inner.lock().await;
        let list = match kind {
            FrequentKind::Stop => &mut inner.repeated_stops,
            FrequentKind::NamedEntity => &mut inner.repeated_ne,
        };
        list.extend(phrases.into_iter().map(Into::into));
    }

    pub async fn phrase(&self, bag: &str) -> Option<PhraseRecord> {
        self.inner.lock().await.phrases.get(&content_key(bag)).cloned()
    }

    pub async fn word(&self, word: &str) -> Option<WordRecord> {
        self.inner.lock().await.words.get(&content_key(word)).cloned()
    }

    pub async fn edge(&self, kind: EdgeKind, key: &str) -> Option<EdgeRecord> {
        self.inner.lock().await.edges_mut(kind).get(key).cloned()
    }

    pub async fn edge_count(&self, kind: EdgeKind) -> usize {
        self.inner.lock().await.edges_mut(kind).len()
    }

    pub async fn phrase_count(&self) -> usize {
        self.inner.lock().await.phrases.len()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_phrase(&self, phrase: &PhraseRecord) -> Result<(), GraphError> {
        self.take_failure()?;
        self.inner.lock().await.upsert_phrase(phrase, &self.phrase_collection);
        Ok(())
    }

    async fn upsert_word(&self, word: &WordRecord) -> Result<(), GraphError> {
        self.take_failure()?;
        self.inner
            .lock()
            .await
            .words
            .entry(word.key.clone())
            .and_modify(|existing| existing.count += word.count)
            .or_insert_with(|| word.clone());
        Ok(())
    }

    async fn upsert_edge(&self, kind: EdgeKind, edge: &EdgeRecord) -> Result<(), GraphError> {
        self.take_failure()?;
        self.inner.lock().await.upsert_edge(kind, edge);
        Ok(())
    }

    async fn stage_doc_phrase(&self, record: &DocPhraseRecord) -> Result<(), GraphError> {
        self.take_failure()?;
        self.inner
            .lock()
            .await
            .doc_phrases
            .entry(record.key.clone())
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn doc_phrases(&self, sitename: &str, doc_id: &str) -> Result<Vec<DocPhraseRecord>, GraphError> {
        let inner = self.inner.lock().await;
        let mut records: Vec<DocPhraseRecord> = inner
            .doc_phrases
            .values()
            .filter(|d| d.sitename == sitename && d.doc_id == doc_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    async fn aggregate_doc_phrase(&self, record: &DocPhraseRecord) -> Result<(), GraphError> {
        self.take_failure()?;
        let mut inner = self.inner.lock().await;
        let staged = match inner.doc_phrases.get(&record.key) {
            Some(staged) if !staged.is_aggregated() => staged.clone(),
            _ => return Ok(()),
        };
        inner.upsert_phrase(&staged.to_phrase(), &self.phrase_collection);
        if let Some(staged) = inner.doc_phrases.get_mut(&record.key) {
            staged.agg_status = Some(1);
        }
        Ok(())
    }

    async fn stage_doc_edge(&self, record: &DocEdgeRecord) -> Result<(), GraphError> {
        self.take_failure()?;
        self.inner
            .lock()
            .await
            .doc_edges
            .entry(record.key.clone())
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn doc_edges(&self, sitename: &str, doc_id: &str) -> Result<Vec<DocEdgeRecord>, GraphError> {
        let inner = self.inner.lock().await;
        let mut records: Vec<DocEdgeRecord> = inner
            .doc_edges
            .values()
            .filter(|d| d.sitename == sitename && d.doc_id == doc_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    async fn aggregate_doc_edge(&self, record: &DocEdgeRecord) -> Result<(), GraphError> {
        self.take_failure()?;
        let mut inner = self.inner.lock().await;
        let staged = match inner.doc_edges.get(&record.key) {
            Some(staged) if !staged.is_aggregated() => staged.to_edge(),
            _ => return Ok(()),
        };
        inner.upsert_edge(EdgeKind::Phrase, &staged);
        if let Some(staged) = inner.doc_edges.get_mut(&record.key) {
            staged.agg_status = Some(1);
        }
        Ok(())
    }

    async fn set_status(&self, key: &str, status: PhraseStatus) -> Result<bool, GraphError> {
        let mut inner = self.inner.lock().await;
        match inner.phrases.get_mut(key) {
            Some(phrase) => {
                phrase.status = Some(status);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn fetch_phrases(
        &self,
        filter: StatusFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<PhraseRecord>, GraphError> {
        let inner = self.inner.lock().await;
        let mut matching: Vec<&PhraseRecord> = inner
            .phrases
            .values()
            .filter(|p| filter.matches(p.status))
            .collect();
        matching.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        Ok(matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn phrase_window(&self, offset: u64, limit: u64) -> Result<Vec<PhraseRecord>, GraphError> {
        let inner = self.inner.lock().await;
        let mut all: Vec<&PhraseRecord> = inner.phrases.values().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn suggest_highlight(&self, key: &str) -> Result<bool, GraphError> {
        let mut inner = self.inner.lock().await;
        match inner.phrases.get_mut(key) {
            Some(phrase) if phrase.status.is_none() => {
                phrase.status = Some(PhraseStatus::SuggestedHighlight);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn has_entity(&self, key: &str) -> Result<bool, GraphError> {
        Ok(self.inner.lock().await.entities.contains_key(key))
    }

    async fn insert_entity(&self, word: &str) -> Result<bool, GraphError> {
        self.take_failure()?;
        let mut inner = self.inner.lock().await;
        let key = content_key(word);
        if inner.entities.contains_key(&key) {
            return Ok(false);
        }
        inner.entities.insert(key, word.to_string());
        Ok(true)
    }

    async fn entities(&self) -> Result<Vec<String>, GraphError> {
        let mut words: Vec<String> = self.inner.lock().await.entities.values().cloned().collect();
        words.sort();
        Ok(words)
    }

    async fn stop_words(&self) -> Result<Vec<String>, GraphError> {
        Ok(self.inner.lock().await.stop_words.clone())
    }

    async fn frequent_phrases(&self, kind: FrequentKind) -> Result<Vec<String>, GraphError> {
        let inner = self.inner.lock().await;
        Ok(match kind {
            FrequentKind::Stop => inner.repeated_stops.clone(),
            FrequentKind::NamedEntity => inner.repeated_ne.clone(),
        })
    }

    async fn truncate_all(&self) -> Result<(), GraphError> {
        *self.inner.lock().await = Collections::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_increments_count() {
        let store = InMemoryGraphStore::new();
        store.upsert_phrase(&PhraseRecord::new("hello world", 2, None)).await.unwrap();
        store.upsert_phrase(&PhraseRecord::new("hello world", 3, None)).await.unwrap();

        let phrase = store.phrase("hello world").await.unwrap();
        assert_eq!(phrase.count, 5);
        assert_eq!(store.phrase_count().await, 1);
        assert_eq!(
            phrase.object_id.as_deref(),
            Some(format!("agg_phrases/{}", content_key("hello world")).as_str())
        );
    }

    #[tokio::test]
    async fn test_upsert_keeps_first_status() {
        let store = InMemoryGraphStore::new();
        store
            .upsert_phrase(&PhraseRecord::new("the", 1, Some(PhraseStatus::SuggestedStop)))
            .await
            .unwrap();
        store.upsert_phrase(&PhraseRecord::new("the", 1, None)).await.unwrap();
        let phrase = store.phrase("the").await.unwrap();
        assert_eq!(phrase.status, Some(PhraseStatus::SuggestedStop));
        assert_eq!(phrase.count, 2);
    }

    #[tokio::test]
    async fn test_fetch_sorts_by_count_and_filters() {
        let store = InMemoryGraphStore::new();
        store.upsert_phrase(&PhraseRecord::new("a", 1, None)).await.unwrap();
        store.upsert_phrase(&PhraseRecord::new("b", 7, None)).await.unwrap();
        store
            .upsert_phrase(&PhraseRecord::new("c", 9, Some(PhraseStatus::Stop)))
            .await
            .unwrap();

        let all = store.fetch_phrases(StatusFilter::All, 10, 0).await.unwrap();
        assert_eq!(all.iter().map(|p| p.bag.as_str()).collect::<Vec<_>>(), vec!["c", "b", "a"]);

        let open = store.fetch_phrases(StatusFilter::NoStatus, 10, 0).await.unwrap();
        assert_eq!(open.iter().map(|p| p.bag.as_str()).collect::<Vec<_>>(), vec!["b", "a"]);

        let second_page = store.fetch_phrases(StatusFilter::All, 1, 1).await.unwrap();
        assert_eq!(second_page[0].bag, "b");
    }

    #[tokio::test]
    async fn test_suggest_highlight_only_when_unset() {
        let store = InMemoryGraphStore::new();
        store.upsert_phrase(&PhraseRecord::new("tehran", 1, None)).await.unwrap();
        store
            .upsert_phrase(&PhraseRecord::new("karaj", 1, Some(PhraseStatus::Stop)))
            .await
            .unwrap();

        assert!(store.suggest_highlight(&content_key("tehran")).await.unwrap());
        assert!(!store.suggest_highlight(&content_key("karaj")).await.unwrap());
        assert!(!store.suggest_highlight(&content_key("missing")).await.unwrap());
        assert_eq!(
            store.phrase("karaj").await.unwrap().status,
            Some(PhraseStatus::Stop)
        );
    }

    #[tokio::test]
    async fn test_aggregate_doc_phrase_is_idempotent() {
        let store = InMemoryGraphStore::new();
        let staged = DocPhraseRecord::new("site", "1", &PhraseRecord::new("hello", 3, None));
        store.stage_doc_phrase(&staged).await.unwrap();

        store.aggregate_doc_phrase(&staged).await.unwrap();
        store.aggregate_doc_phrase(&staged).await.unwrap();

        assert_eq!(store.phrase("hello").await.unwrap().count, 3);
        let records = store.doc_phrases("site", "1").await.unwrap();
        assert!(records[0].is_aggregated());
    }

    #[tokio::test]
    async fn test_staged_edges_fold_once() {
        let store = InMemoryGraphStore::new();
        let staged = DocEdgeRecord::new("site", "1", &EdgeRecord::new("a", "b", 1));
        store.stage_doc_edge(&staged).await.unwrap();
        store.stage_doc_edge(&staged).await.unwrap();
        assert_eq!(store.doc_edges("site", "1").await.unwrap().len(), 1);
        assert!(store.edge(EdgeKind::Phrase, "a_b").await.is_none());

        store.aggregate_doc_edge(&staged).await.unwrap();
        store.aggregate_doc_edge(&staged).await.unwrap();
        assert_eq!(store.edge(EdgeKind::Phrase, "a_b").await.unwrap().count, 1);
        assert!(store.doc_edges("site", "1").await.unwrap()[0].is_aggregated());
    }

    #[tokio::test]
    async fn test_injected_failures_are_transient() {
        let store = InMemoryGraphStore::new();
        store.inject_transient_failures(1);
        let err = store.upsert_phrase(&PhraseRecord::new("x", 1, None)).await.unwrap_err();
        assert!(err.is_transient());
        store.upsert_phrase(&PhraseRecord::new("x", 1, None)).await.unwrap();
        assert_eq!(store.phrase("x").await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_insert_entity_ignores_duplicates() {
        let store = InMemoryGraphStore::new();
        assert!(store.insert_entity("tehran").await.unwrap());
        assert!(!store.insert_entity("tehran").await.unwrap());
        assert!(store.has_entity(&content_key("tehran")).await.unwrap());
        assert_eq!(store.entities().await.unwrap(), vec!["tehran".to_string()]);
    }
}
