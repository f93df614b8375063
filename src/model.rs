/// Graph entities and their content-derived identities.
///
/// Every vertex key is the SHA-256 hex digest of its text, so the same phrase
/// always lands on the same document and repeated ingestion increments counts
/// instead of duplicating rows.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::errors::PhraseError;

/// SHA-256 hex digest of `text`, used as the key of phrases, words and entities.
pub fn content_key(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Number of whitespace-separated words in a phrase.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Phrase status. Suggested variants are heuristics awaiting human review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhraseStatus {
    Stop,
    Highlight,
    SuggestedStop,
    SuggestedHighlight,
}

impl PhraseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhraseStatus::Stop => "stop",
            PhraseStatus::Highlight => "highlight",
            PhraseStatus::SuggestedStop => "suggested-stop",
            PhraseStatus::SuggestedHighlight => "suggested-highlight",
        }
    }

    /// Status-updater codes: 0 marks a stop phrase, 1 a highlight.
    pub fn from_code(code: u8) -> Option<PhraseStatus> {
        match code {
            0 => Some(PhraseStatus::Stop),
            1 => Some(PhraseStatus::Highlight),
            _ => None,
        }
    }
}

impl fmt::Display for PhraseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhraseStatus {
    type Err = PhraseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop" => Ok(PhraseStatus::Stop),
            "highlight" => Ok(PhraseStatus::Highlight),
            "suggested-stop" => Ok(PhraseStatus::SuggestedStop),
            "suggested-highlight" => Ok(PhraseStatus::SuggestedHighlight),
            other => Err(PhraseError::validation(
                "status",
                &format!("Unknown phrase status: {}", other),
            )),
        }
    }
}

/// Aggregated phrase vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseRecord {
    #[serde(rename = "_key")]
    pub key: String,
    pub bag: String,
    pub count: u64,
    #[serde(default)]
    pub status: Option<PhraseStatus>,
    #[serde(default)]
    pub length: usize,
    /// Store-assigned document id ("<collection>/<key>"), absent before insert.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

impl PhraseRecord {
    pub fn new(bag: &str, count: u64, status: Option<PhraseStatus>) -> Self {
        PhraseRecord {
            key: content_key(bag),
            bag: bag.to_string(),
            count,
            status,
            length: word_count(bag),
            object_id: None,
        }
    }
}

/// Single-word vertex of the word graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordRecord {
    #[serde(rename = "_key")]
    pub key: String,
    pub word: String,
    pub count: u64,
    #[serde(default)]
    pub status: Option<PhraseStatus>,
}

impl WordRecord {
    pub fn new(word: &str, count: u64, status: Option<PhraseStatus>) -> Self {
        WordRecord {
            key: content_key(word),
            word: word.to_string(),
            count,
            status,
        }
    }
}

/// Which vertex/edge collection pair an edge belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Phrase,
    Word,
}

/// Co-occurrence edge between two vertex keys.
///
/// `from`/`to` hold bare vertex keys; the graph store qualifies them with the
/// vertex collection name when it writes `_from`/`_to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    #[serde(rename = "_key")]
    pub key: String,
    pub from: String,
    pub to: String,
    pub count: u64,
}

impl EdgeRecord {
    pub fn new(from: &str, to: &str, count: u64) -> Self {
        EdgeRecord {
            key: format!("{}_{}", from, to),
            from: from.to_string(),
            to: to.to_string(),
            count,
        }
    }
}

/// Per-document phrase record staged for chunk aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocPhraseRecord {
    #[serde(rename = "_key")]
    pub key: String,
    pub phrase_hash: String,
    pub bag: String,
    pub count: u64,
    #[serde(default)]
    pub status: Option<PhraseStatus>,
    #[serde(default)]
    pub length: usize,
    pub sitename: String,
    pub doc_id: String,
    /// 1 once folded into the aggregated collection.
    #[serde(default)]
    pub agg_status: Option<u8>,
}

impl DocPhraseRecord {
    pub fn new(sitename: &str, doc_id: &str, phrase: &PhraseRecord) -> Self {
        DocPhraseRecord {
            key: content_key(&format!("{}:{}:{}", sitename, doc_id, phrase.key)),
            phrase_hash: phrase.key.clone(),
            bag: phrase.bag.clone(),
            count: phrase.count,
            status: phrase.status,
            length: phrase.length,
            sitename: sitename.to_string(),
            doc_id: doc_id.to_string(),
            agg_status: None,
        }
    }

    pub fn is_aggregated(&self) -> bool {
        self.agg_status == Some(1)
    }

    /// The aggregated vertex this staging record folds into.
    pub fn to_phrase(&self) -> PhraseRecord {
        PhraseRecord {
            key: self.phrase_hash.clone(),
            bag: self.bag.clone(),
            count: self.count,
            status: self.status,
            length: self.length,
            object_id: None,
        }
    }
}

/// Per-document phrase edge staged for chunk aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocEdgeRecord {
    #[serde(rename = "_key")]
    pub key: String,
    /// Key of the aggregated edge ("<from>_<to>").
    pub edge_key: String,
    pub from: String,
    pub to: String,
    pub count: u64,
    pub sitename: String,
    pub doc_id: String,
    #[serde(default)]
    pub agg_status: Option<u8>,
}

impl DocEdgeRecord {
    pub fn new(sitename: &str, doc_id: &str, edge: &EdgeRecord) -> Self {
        DocEdgeRecord {
            key: content_key(&format!("{}:{}:{}", sitename, doc_id, edge.key)),
            edge_key: edge.key.clone(),
            from: edge.from.clone(),
            to: edge.to.clone(),
            count: edge.count,
            sitename: sitename.to_string(),
            doc_id: doc_id.to_string(),
            agg_status: None,
        }
    }

    pub fn is_aggregated(&self) -> bool {
        self.agg_status == Some(1)
    }

    pub fn to_edge(&self) -> EdgeRecord {
        EdgeRecord {
            key: self.edge_key.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            count: self.count,
        }
    }
}

/// Status filter of the data-fetcher endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    HasStatus,
    NoStatus,
    Is(PhraseStatus),
}

impl StatusFilter {
    pub fn matches(&self, status: Option<PhraseStatus>) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::HasStatus => status.is_some(),
            StatusFilter::NoStatus => status.is_none(),
            StatusFilter::Is(wanted) => status == Some(*wanted),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = PhraseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "has_status" => Ok(StatusFilter::HasStatus),
            "no_status" => Ok(StatusFilter::NoStatus),
            other => other.parse().map(StatusFilter::Is),
        }
    }
}

/// Pre-recorded frequent phrase lists stripped before counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequentKind {
    Stop,
    NamedEntity,
}
