/// Per-document processing pipeline
///
/// text extraction → stop-word / frequent-phrase filters → n-gram counts →
/// status detection → aggregator. The word-graph pipeline shares the first
/// steps and writes word vertices and consecutive-word edges instead.
///
/// `DocumentSink` is how the ingest job hands articles to the pipeline:
/// either over HTTP to a running doc-process service or in-process.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use crate::aggregate::{AggregateReport, Aggregator, RetryPolicy};
use crate::classify::{FrequentFilter, StatusContext};
use crate::config::IngestConfig;
use crate::errors::PhraseError;
use crate::graph::GraphStore;
use crate::model::{content_key, DocEdgeRecord, DocPhraseRecord, EdgeKind, EdgeRecord, PhraseRecord, WordRecord};
use crate::text::ngram::{count_phrases, word_graph, NgramRange};
use crate::text::{extract_text, DocType};

/// Query options of the doc-process endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    pub doc_type: DocType,
    /// Remove stop words from the text before counting.
    pub replace_stop: bool,
    /// Tag phrases containing stop words as suggested-stop.
    pub tag_stop: bool,
    /// Tag all-entity phrases as suggested-highlight.
    pub tag_highlight: bool,
    pub ngram_range: NgramRange,
}

/// Identifies a source article; its phrases are staged for chunk-agg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub sitename: String,
    pub doc_id: String,
}

/// Outcome of processing one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub vertices: AggregateReport,
    pub edges: AggregateReport,
}

impl ProcessReport {
    pub fn abandoned(&self) -> usize {
        self.vertices.abandoned + self.edges.abandoned
    }
}

/// Read-only classification state shared by every processor of a job.
#[derive(Debug, Clone)]
pub struct Filters {
    pub context: Arc<StatusContext>,
    pub frequent: Option<Arc<FrequentFilter>>,
}

impl Filters {
    /// Snapshot the stop words, entities and frequent phrase lists of `store`.
    pub async fn load(store: &dyn GraphStore) -> Result<Self, PhraseError> {
        let context = StatusContext::load(store).await?;
        let frequent = FrequentFilter::load(store).await?;
        Ok(Filters {
            context: Arc::new(context),
            frequent: frequent.map(Arc::new),
        })
    }
}

pub struct DocumentProcessor {
    aggregator: Aggregator,
    context: Arc<StatusContext>,
    frequent: Option<Arc<FrequentFilter>>,
    client: reqwest::Client,
}

impl DocumentProcessor {
    pub fn new(aggregator: Aggregator, filters: Filters, client: reqwest::Client) -> Self {
        DocumentProcessor {
            aggregator,
            context: filters.context,
            frequent: filters.frequent,
            client,
        }
    }

    /// Build a processor over `store` with a fresh snapshot of its filters.
    pub async fn load(
        store: Arc<dyn GraphStore>,
        policy: RetryPolicy,
        client: reqwest::Client,
    ) -> Result<Self, PhraseError> {
        let filters = Filters::load(store.as_ref()).await?;
        Ok(DocumentProcessor::new(Aggregator::new(store, policy), filters, client))
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        self.aggregator.store()
    }

    async fn prepare_text(&self, document: &str, doc_type: DocType, replace_stop: bool) -> Result<String, PhraseError> {
        let mut text = extract_text(&self.client, document, doc_type).await?;
        if replace_stop {
            text = self.context.remove_stop_words(&text);
        }
        if let Some(frequent) = &self.frequent {
            text = frequent.strip(&text);
        }
        Ok(text)
    }

    /// Count, classify and store the phrases of one document.
    ///
    /// With a `doc_ref` the phrases and their edges are staged per document
    /// (folded into the aggregated collections later by chunk-agg), so posting
    /// the same document again changes nothing. Without one they are upserted
    /// directly. Edges link every pair of distinct phrases.
    pub async fn process(
        &self,
        document: &str,
        options: &ProcessOptions,
        doc_ref: Option<&DocumentRef>,
    ) -> Result<ProcessReport, PhraseError> {
        let text = self
            .prepare_text(document, options.doc_type, options.replace_stop)
            .await?;

        let phrases: Vec<PhraseRecord> = count_phrases(&text, options.ngram_range)
            .into_iter()
            .map(|c| {
                let status = self
                    .context
                    .status_for(&c.bag, options.tag_stop, options.tag_highlight);
                PhraseRecord::new(&c.bag, c.count, status)
            })
            .collect();

        tracing::debug!(
            phrases = phrases.len(),
            doc_id = doc_ref.map(|r| r.doc_id.as_str()).unwrap_or("-"),
            "Counted phrases"
        );

        let mut report = ProcessReport::default();
        for phrase in &phrases {
            let result = match doc_ref {
                Some(r) => {
                    self.aggregator
                        .stage_doc_phrase(&DocPhraseRecord::new(&r.sitename, &r.doc_id, phrase))
                        .await
                }
                None => self.aggregator.upsert_phrase(phrase).await,
            };
            report.vertices.record(&result);
        }

        for (i, from) in phrases.iter().enumerate() {
            for to in &phrases[i + 1..] {
                let edge = EdgeRecord::new(&from.key, &to.key, 1);
                let result = match doc_ref {
                    Some(r) => {
                        self.aggregator
                            .stage_doc_edge(&DocEdgeRecord::new(&r.sitename, &r.doc_id, &edge))
                            .await
                    }
                    None => self.aggregator.upsert_edge(EdgeKind::Phrase, &edge).await,
                };
                report.edges.record(&result);
            }
        }

        if report.abandoned() > 0 {
            tracing::warn!(
                abandoned = report.abandoned(),
                doc_id = doc_ref.map(|r| r.doc_id.as_str()).unwrap_or("-"),
                "Some records were abandoned"
            );
        }
        Ok(report)
    }

    /// Store word counts and consecutive-word edges of one document.
    pub async fn process_word_graph(&self, document: &str, doc_type: DocType) -> Result<ProcessReport, PhraseError> {
        let text = self.prepare_text(document, doc_type, false).await?;
        let graph = word_graph(&text);

        let mut report = ProcessReport::default();
        for word in &graph.words {
            let record = WordRecord::new(&word.bag, word.count, self.context.status(&word.bag));
            let result = self.aggregator.upsert_word(&record).await;
            report.vertices.record(&result);
        }
        for link in &graph.links {
            let edge = EdgeRecord::new(&content_key(&link.from), &content_key(&link.to), link.count);
            let result = self.aggregator.upsert_edge(EdgeKind::Word, &edge).await;
            report.edges.record(&result);
        }

        tracing::debug!(
            words = graph.words.len(),
            links = graph.links.len(),
            "Stored word graph"
        );
        Ok(report)
    }
}

/// Destination of the articles submitted by the ingest job.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Submit one article. Returns the processing report when the document
    /// was processed in-process.
    async fn submit(
        &self,
        document: &str,
        options: &ProcessOptions,
        doc_ref: &DocumentRef,
    ) -> Result<Option<ProcessReport>, PhraseError>;
}

/// Posts articles to a running doc-process endpoint.
pub struct HttpDocumentSink {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpDocumentSink {
    pub fn new(client: reqwest::Client, config: &IngestConfig) -> Self {
        HttpDocumentSink {
            client,
            url: format!("{}/api/doc-process/", config.endpoint.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl DocumentSink for HttpDocumentSink {
    async fn submit(
        &self,
        document: &str,
        options: &ProcessOptions,
        doc_ref: &DocumentRef,
    ) -> Result<Option<ProcessReport>, PhraseError> {
        let mut request = self
            .client
            .post(&self.url)
            .query(&[
                ("doc_type", options.doc_type.to_string()),
                ("replace_stop", options.replace_stop.to_string()),
                ("tag_stop", options.tag_stop.to_string()),
                ("tag_highlight", options.tag_highlight.to_string()),
                ("ngram_range", options.ngram_range.to_string()),
                ("doc_id", doc_ref.doc_id.clone()),
                ("sitename", doc_ref.sitename.clone()),
            ])
            .json(&json!({ "document": document }));
        if let Some(key) = &self.api_key {
            request = request.header("x-token", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::CREATED {
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        Err(PhraseError::Upstream {
            status: status.as_u16(),
            message: body,
        })
    }
}

/// Runs the pipeline in-process against the configured graph store.
pub struct DirectDocumentSink {
    processor: Arc<DocumentProcessor>,
}

impl DirectDocumentSink {
    pub fn new(processor: Arc<DocumentProcessor>) -> Self {
        DirectDocumentSink { processor }
    }
}

#[async_trait]
impl DocumentSink for DirectDocumentSink {
    async fn submit(
        &self,
        document: &str,
        options: &ProcessOptions,
        doc_ref: &DocumentRef,
    ) -> Result<Option<ProcessReport>, PhraseError> {
        self.processor
            .process(document, options, Some(doc_ref))
            .await
            .map(Some)
    }
}
