/// Phrase status detection
///
/// A phrase is a suggested stop when it contains a known stop word, and a
/// suggested highlight when every word of it is a known named entity. The
/// stop-word pattern and the entity set are snapshot once into a
/// `StatusContext` and shared read-only by every worker.

pub mod frequent;

pub use frequent::FrequentFilter;

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;

use crate::errors::PhraseError;
use crate::graph::GraphStore;
use crate::model::PhraseStatus;
use crate::text::squash_whitespace;

/// Build `\b(?:w1|w2|...)\b` over `words`, longest first so the longest
/// alternative wins. Returns None for an empty list.
pub fn word_boundary_pattern<S: AsRef<str>>(words: &[S]) -> Result<Option<Regex>, PhraseError> {
    let mut escaped: Vec<String> = words
        .iter()
        .map(|w| w.as_ref().trim())
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();
    if escaped.is_empty() {
        return Ok(None);
    }
    escaped.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    escaped.dedup();
    let pattern = format!(r"\b(?:{})\b", escaped.join("|"));
    Ok(Some(Regex::new(&pattern)?))
}

/// Status of a single phrase. A stop-word match always wins over the entity
/// check.
pub fn detect_status(
    phrase: &str,
    stop_pattern: Option<&Regex>,
    entities: &HashSet<String>,
) -> Option<PhraseStatus> {
    if stop_pattern.is_some_and(|re| re.is_match(phrase)) {
        return Some(PhraseStatus::SuggestedStop);
    }

    let mut words = phrase.split_whitespace().peekable();
    if words.peek().is_none() {
        return None;
    }
    if words.all(|w| entities.contains(w)) {
        return Some(PhraseStatus::SuggestedHighlight);
    }

    None
}

/// Immutable snapshot of the stop-word pattern and the known entities.
#[derive(Debug, Clone)]
pub struct StatusContext {
    stop_pattern: Option<Regex>,
    entities: HashSet<String>,
    loaded_at: DateTime<Utc>,
}

impl StatusContext {
    pub fn new<S: AsRef<str>>(stop_words: &[S], entities: impl IntoIterator<Item = String>) -> Result<Self, PhraseError> {
        Ok(StatusContext {
            stop_pattern: word_boundary_pattern(stop_words)?,
            entities: entities.into_iter().collect(),
            loaded_at: Utc::now(),
        })
    }

    /// Context that never matches anything.
    pub fn empty() -> Self {
        StatusContext {
            stop_pattern: None,
            entities: HashSet::new(),
            loaded_at: Utc::now(),
        }
    }

    /// Snapshot the stop-word and entity collections of `store`.
    pub async fn load(store: &dyn GraphStore) -> Result<Self, PhraseError> {
        let stop_words = store.stop_words().await?;
        let entities = store.entities().await?;
        let context = StatusContext::new(&stop_words, entities)?;
        tracing::info!(
            stop_words = stop_words.len(),
            entities = context.entities.len(),
            "Loaded status context"
        );
        Ok(context)
    }

    pub fn status(&self, phrase: &str) -> Option<PhraseStatus> {
        detect_status(phrase, self.stop_pattern.as_ref(), &self.entities)
    }

    /// Status restricted to the tags the caller asked for.
    pub fn status_for(&self, phrase: &str, tag_stop: bool, tag_highlight: bool) -> Option<PhraseStatus> {
        match self.status(phrase) {
            Some(PhraseStatus::SuggestedStop) if tag_stop => Some(PhraseStatus::SuggestedStop),
            Some(PhraseStatus::SuggestedHighlight) if tag_highlight => Some(PhraseStatus::SuggestedHighlight),
            _ => None,
        }
    }

    /// Drop every stop word from `text`.
    pub fn remove_stop_words(&self, text: &str) -> String {
        match &self.stop_pattern {
            Some(re) => squash_whitespace(&re.replace_all(text, " ")),
            None => text.to_string(),
        }
    }

    pub fn is_entity(&self, word: &str) -> bool {
        self.entities.contains(word)
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(words: &[&str]) -> HashSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_stop_word_wins_over_entities() {
        let stop = word_boundary_pattern(&["the"]).unwrap();
        let known = entities(&["the", "city"]);
        assert_eq!(
            detect_status("the city", stop.as_ref(), &known),
            Some(PhraseStatus::SuggestedStop)
        );
    }

    #[test]
    fn test_all_entities_is_highlight() {
        let known = entities(&["alice", "bob"]);
        assert_eq!(
            detect_status("alice bob", None, &known),
            Some(PhraseStatus::SuggestedHighlight)
        );
        assert_eq!(detect_status("alice xyz", None, &entities(&["alice"])), None);
    }

    #[test]
    fn test_empty_phrase_is_never_highlight() {
        assert_eq!(detect_status("   ", None, &entities(&["alice"])), None);
    }

    #[test]
    fn test_stop_pattern_respects_word_boundaries() {
        let stop = word_boundary_pattern(&["in"]).unwrap();
        assert_eq!(detect_status("inside", stop.as_ref(), &HashSet::new()), None);
        assert_eq!(
            detect_status("live in peace", stop.as_ref(), &HashSet::new()),
            Some(PhraseStatus::SuggestedStop)
        );
    }

    #[test]
    fn test_stop_pattern_handles_persian_and_metachars() {
        let stop = word_boundary_pattern(&["از", "c++"]).unwrap().unwrap();
        assert!(stop.is_match("سفر از تهران"));
        assert!(!stop.is_match("ازدواج"));
        assert!(word_boundary_pattern::<&str>(&[]).unwrap().is_none());
    }

    #[test]
    fn test_status_for_respects_flags() {
        let context = StatusContext::new(&["of"], vec!["tehran".to_string()]).unwrap();
        assert_eq!(context.status_for("city of", false, true), None);
        assert_eq!(context.status_for("city of", true, false), Some(PhraseStatus::SuggestedStop));
        assert_eq!(context.status_for("tehran", true, false), None);
        assert_eq!(
            context.status_for("tehran", false, true),
            Some(PhraseStatus::SuggestedHighlight)
        );
    }

    #[test]
    fn test_remove_stop_words() {
        let context = StatusContext::new(&["the", "of"], Vec::new()).unwrap();
        assert_eq!(context.remove_stop_words("the heart of the city"), "heart city");
        assert_eq!(StatusContext::empty().remove_stop_words("the city"), "the city");
    }

    #[tokio::test]
    async fn test_load_snapshots_store() {
        let store = crate::graph::InMemoryGraphStore::new();
        store.add_stop_words(["and"]).await;
        store.insert_entity("alice").await.unwrap();

        let context = StatusContext::load(&store).await.unwrap();
        assert_eq!(context.status("alice"), Some(PhraseStatus::SuggestedHighlight));
        assert_eq!(context.status("alice and bob"), Some(PhraseStatus::SuggestedStop));
        assert!(context.is_entity("alice"));
    }
}
