/// Removal of pre-recorded frequent phrases before counting.

use regex::Regex;
use std::collections::BTreeMap;

use super::word_boundary_pattern;
use crate::errors::PhraseError;
use crate::graph::GraphStore;
use crate::model::{word_count, FrequentKind};
use crate::text::squash_whitespace;

/// Frequent phrases bucketed by word count, one pattern per bucket.
#[derive(Debug, Clone, Default)]
pub struct FrequentFilter {
    buckets: BTreeMap<usize, Regex>,
}

impl FrequentFilter {
    pub fn new<S: AsRef<str>>(phrases: &[S]) -> Result<Self, PhraseError> {
        let mut by_length: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
        for phrase in phrases {
            let phrase = phrase.as_ref();
            let length = word_count(phrase);
            if length > 0 {
                by_length.entry(length).or_default().push(phrase);
            }
        }

        let mut buckets = BTreeMap::new();
        for (length, phrases) in by_length {
            if let Some(pattern) = word_boundary_pattern(&phrases)? {
                buckets.insert(length, pattern);
            }
        }
        Ok(FrequentFilter { buckets })
    }

    /// Build the filter from both frequent lists of `store`. None when both
    /// lists are empty.
    pub async fn load(store: &dyn GraphStore) -> Result<Option<Self>, PhraseError> {
        let mut phrases = store.frequent_phrases(FrequentKind::Stop).await?;
        phrases.extend(store.frequent_phrases(FrequentKind::NamedEntity).await?);
        if phrases.is_empty() {
            return Ok(None);
        }
        let filter = FrequentFilter::new(&phrases)?;
        tracing::info!(phrases = phrases.len(), buckets = filter.buckets.len(), "Loaded frequent phrase filter");
        Ok(Some(filter))
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Remove every frequent phrase from `text`, longest phrases first.
    pub fn strip(&self, text: &str) -> String {
        let mut stripped = text.to_string();
        for pattern in self.buckets.values().rev() {
            stripped = pattern.replace_all(&stripped, " ").into_owned();
        }
        squash_whitespace(&stripped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longer_phrases_win() {
        let filter = FrequentFilter::new(&["new york", "new york times", "york"]).unwrap();
        assert_eq!(filter.strip("read the new york times today"), "read the today");
        assert_eq!(filter.strip("in new york now"), "in now");
        assert_eq!(filter.strip("old york"), "old");
    }

    #[test]
    fn test_empty_filter_keeps_text() {
        let filter = FrequentFilter::new::<&str>(&[]).unwrap();
        assert!(filter.is_empty());
        assert_eq!(filter.strip("keep  this"), "keep this");
    }

    #[tokio::test]
    async fn test_load_merges_both_lists() {
        let store = crate::graph::InMemoryGraphStore::new();
        assert!(FrequentFilter::load(&store).await.unwrap().is_none());

        store.add_frequent_phrases(FrequentKind::Stop, ["said that"]).await;
        store.add_frequent_phrases(FrequentKind::NamedEntity, ["tehran"]).await;
        let filter = FrequentFilter::load(&store).await.unwrap().unwrap();
        assert_eq!(filter.strip("he said that tehran is big"), "he is big");
    }
}
