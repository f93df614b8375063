/// Batch jobs and the worker pool they run on
///
/// A job splits its work into units (id ranges, document ids, offset windows,
/// NER files) and hands them to a `WorkerPool`. Every unit runs as its own
/// tokio task and opens its own connections through `Connections`; a unit
/// that errors or panics is logged and counted without stopping its siblings.

pub mod chunk_aggregate;
pub mod ingest;
pub mod ne_search;
pub mod ner_extract;
pub mod progress;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::aggregate::{Aggregator, RetryPolicy};
use crate::config::Config;
use crate::errors::PhraseError;
use crate::graph::{ArangoGraphStore, GraphStore};
use crate::pipeline::{DirectDocumentSink, DocumentProcessor, DocumentSink, Filters, HttpDocumentSink};
use crate::source::{ArticleSource, MySqlArticleSource};
use crate::tracker::Tracker;

/// Worker count: available parallelism minus `reserve`, never below 2.
pub fn default_workers(reserve: usize) -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    available.saturating_sub(reserve).max(2)
}

/// What one successful unit did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitOutcome {
    pub records: usize,
    pub failed_records: usize,
    pub abandoned: usize,
}

/// Totals of a job run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub units: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub records: usize,
    pub failed_records: usize,
    pub abandoned: usize,
}

impl BatchReport {
    fn absorb(&mut self, outcome: UnitOutcome) {
        self.succeeded += 1;
        self.records += outcome.records;
        self.failed_records += outcome.failed_records;
        self.abandoned += outcome.abandoned;
    }

    pub fn log(&self, job: &str) {
        if self.failed > 0 || self.failed_records > 0 || self.abandoned > 0 {
            tracing::warn!(
                job,
                units = self.units,
                succeeded = self.succeeded,
                failed = self.failed,
                records = self.records,
                failed_records = self.failed_records,
                abandoned = self.abandoned,
                "Job finished with failures"
            );
        } else {
            tracing::info!(
                job,
                units = self.units,
                records = self.records,
                "Job finished"
            );
        }
    }
}

pub struct WorkerPool {
    label: String,
    n_jobs: usize,
}

impl WorkerPool {
    pub fn new(label: impl Into<String>, n_jobs: usize) -> Self {
        WorkerPool {
            label: label.into(),
            n_jobs: n_jobs.max(1),
        }
    }

    pub fn n_jobs(&self) -> usize {
        self.n_jobs
    }

    /// Run `task` over every unit with at most `n_jobs` units in flight.
    pub async fn run<U, F, Fut>(&self, units: Vec<U>, task: F) -> BatchReport
    where
        U: fmt::Display,
        F: Fn(U) -> Fut,
        Fut: Future<Output = Result<UnitOutcome, PhraseError>> + Send + 'static,
    {
        let mut report = BatchReport {
            units: units.len(),
            ..Default::default()
        };

        tracing::info!(job = %self.label, units = units.len(), n_jobs = self.n_jobs, "Starting job");

        let pb = ProgressBar::new(units.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40}] {pos}/{len} [{elapsed_precise} / {eta_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb.set_message(self.label.clone());

        // Units are spawned lazily, so at most n_jobs tasks exist at a time
        let mut running = stream::iter(units.into_iter().map(|unit| {
            let name = unit.to_string();
            let handle = tokio::spawn(task(unit));
            async move { (name, handle.await) }
        }))
        .buffer_unordered(self.n_jobs);

        while let Some((name, joined)) = running.next().await {
            match joined {
                Ok(Ok(outcome)) => report.absorb(outcome),
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::error!(job = %self.label, unit = %name, error = %e, "Unit failed");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(job = %self.label, unit = %name, error = %e, "Unit panicked");
                }
            }
            pb.inc(1);
        }

        pb.finish_with_message(format!("{} done", self.label));
        report
    }
}

/// Per-unit connection factory. Every call opens fresh handles.
#[async_trait]
pub trait Connections: Send + Sync {
    async fn graph_store(&self) -> Result<Arc<dyn GraphStore>, PhraseError>;

    async fn article_source(&self) -> Result<Arc<dyn ArticleSource>, PhraseError>;

    async fn tracker(&self) -> Result<Tracker, PhraseError>;

    async fn document_sink(&self) -> Result<Arc<dyn DocumentSink>, PhraseError>;

    fn retry_policy(&self) -> RetryPolicy;

    /// Aggregator over a freshly opened graph store.
    async fn aggregator(&self) -> Result<Aggregator, PhraseError> {
        Ok(Aggregator::new(self.graph_store().await?, self.retry_policy()))
    }
}

/// Connections built from the loaded configuration.
pub struct ConfiguredConnections {
    config: Config,
    /// Graph timeout; fetches URL documents in direct mode.
    client: reqwest::Client,
    /// Posts to doc-process, bounded by `ingest.request_timeout_secs` only.
    sink_client: reqwest::Client,
    /// Set when documents are processed in-process instead of over HTTP.
    direct_filters: Option<Filters>,
}

impl ConfiguredConnections {
    pub fn new(config: Config) -> Result<Self, PhraseError> {
        let client = reqwest::Client::builder()
            .timeout(config.graph.request_timeout())
            .build()
            .map_err(|e| PhraseError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let mut sink_client = reqwest::Client::builder();
        if let Some(timeout) = config.ingest.request_timeout() {
            sink_client = sink_client.timeout(timeout);
        }
        let sink_client = sink_client
            .build()
            .map_err(|e| PhraseError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(ConfiguredConnections {
            config,
            client,
            sink_client,
            direct_filters: None,
        })
    }

    /// Process documents in-process. Snapshots the classification filters
    /// once; every unit shares them.
    pub async fn direct(mut self) -> Result<Self, PhraseError> {
        let store = self.graph_store().await?;
        self.direct_filters = Some(Filters::load(store.as_ref()).await?);
        Ok(self)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[async_trait]
impl Connections for ConfiguredConnections {
    async fn graph_store(&self) -> Result<Arc<dyn GraphStore>, PhraseError> {
        Ok(Arc::new(ArangoGraphStore::new(&self.config.graph)?))
    }

    async fn article_source(&self) -> Result<Arc<dyn ArticleSource>, PhraseError> {
        Ok(Arc::new(MySqlArticleSource::connect(&self.config.source).await?))
    }

    async fn tracker(&self) -> Result<Tracker, PhraseError> {
        Tracker::open(&self.config.tracker.db_path).await
    }

    async fn document_sink(&self) -> Result<Arc<dyn DocumentSink>, PhraseError> {
        match &self.direct_filters {
            Some(filters) => {
                let processor = DocumentProcessor::new(
                    self.aggregator().await?,
                    filters.clone(),
                    self.client.clone(),
                );
                Ok(Arc::new(DirectDocumentSink::new(Arc::new(processor))))
            }
            None => Ok(Arc::new(HttpDocumentSink::new(self.sink_client.clone(), &self.config.ingest))),
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.config.retry)
    }
}
