use anyhow::Result;
use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use phrase_api::aggregate::RetryPolicy;
use phrase_api::config::{Config, SourceConfig};
use phrase_api::graph::{ArangoGraphStore, GraphStore, InMemoryGraphStore};
use phrase_api::jobs::chunk_aggregate::{chunk_aggregate, DocTargets};
use phrase_api::jobs::ingest::{ingest_site, IngestArgs};
use phrase_api::jobs::ne_search::{search_named_entities, DEFAULT_CHUNK_SIZE};
use phrase_api::jobs::ner_extract::extract_named_entities;
use phrase_api::jobs::progress::view_progress;
use phrase_api::jobs::{default_workers, ConfiguredConnections, Connections};
use phrase_api::logging;
use phrase_api::pipeline::{DocumentProcessor, ProcessOptions};
use phrase_api::server::{self, AppState};
use phrase_api::text::ngram::NgramRange;
use phrase_api::tracker::Tracker;

#[derive(Parser)]
#[command(name = "phrase-api", version, about = "News phrase extraction and aggregation pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the doc-process HTTP service
    Serve {
        /// Bind address (host:port), overrides server.bind
        #[arg(long)]
        bind: Option<String>,
        /// Keep the graph in process memory instead of the graph store
        #[arg(long)]
        in_memory: bool,
    },
    /// Create the checkpoint table and exit
    InitTracker,
    /// Send a site's unprocessed articles through doc-process
    Ingest(IngestCommand),
    /// Show processed and failed rows of the article table
    ViewProgress {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Load named entities from a NER file or directory
    #[command(name = "process-NER")]
    ProcessNer {
        #[arg(long = "ner_path")]
        ner_path: PathBuf,
        #[arg(long = "n_jobs", default_value_t = default_workers(4))]
        n_jobs: usize,
    },
    /// Fold staged per-document phrases into the aggregated collection
    #[command(name = "chunk-agg", group(ArgGroup::new("targets").required(true)))]
    ChunkAgg {
        #[arg(long)]
        sitename: String,
        /// Aggregate document ids 0..=maxID
        #[arg(long = "maxID", group = "targets")]
        max_id: Option<i64>,
        /// Comma-separated document ids
        #[arg(long = "IDList", group = "targets", value_delimiter = ',')]
        id_list: Option<Vec<String>>,
        #[arg(long = "n_jobs", default_value_t = default_workers(4))]
        n_jobs: usize,
    },
    /// Tag untagged phrases made only of named entities as suggested-highlight
    #[command(name = "search-NE")]
    SearchNe {
        #[arg(long = "max_records")]
        max_records: u64,
        #[arg(long = "chunk_size", default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,
        #[arg(long = "n_jobs", default_value_t = default_workers(2))]
        n_jobs: usize,
    },
}

/// Article source overrides of the `source` config section.
#[derive(Args)]
struct SourceArgs {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    password: Option<String>,
    #[arg(long)]
    db: Option<String>,
}

impl SourceArgs {
    fn apply(self, source: &mut SourceConfig) {
        if let Some(host) = self.host {
            source.host = host;
        }
        if let Some(port) = self.port {
            source.port = port;
        }
        if let Some(username) = self.username {
            source.username = username;
        }
        if let Some(password) = self.password {
            source.password = password;
        }
        if let Some(db) = self.db {
            source.database = db;
        }
    }
}

#[derive(Args)]
struct IngestCommand {
    #[command(flatten)]
    source: SourceArgs,
    #[arg(long)]
    sitename: String,
    #[arg(long)]
    tag_stop: bool,
    #[arg(long)]
    replace_stop: bool,
    #[arg(long)]
    tag_highlight: bool,
    /// First article id; defaults to the tracker checkpoint
    #[arg(long)]
    min_id: Option<i64>,
    /// Last article id; defaults to the table's maximum
    #[arg(long)]
    max_id: Option<i64>,
    #[arg(long, default_value_t = NgramRange::default())]
    ngram_range: NgramRange,
    #[arg(long, default_value_t = default_workers(0))]
    n_jobs: usize,
    /// Process documents in-process instead of posting to doc-process
    #[arg(long)]
    direct: bool,
}

async fn run_serve(config: &Config, bind: Option<String>, in_memory: bool) -> Result<()> {
    let store: Arc<dyn GraphStore> = if in_memory {
        tracing::warn!("Serving from an in-memory graph; nothing is persisted");
        Arc::new(InMemoryGraphStore::new())
    } else {
        Arc::new(ArangoGraphStore::new(&config.graph)?)
    };

    let client = reqwest::Client::builder()
        .timeout(config.graph.request_timeout())
        .build()?;
    let processor = DocumentProcessor::load(store, RetryPolicy::from(&config.retry), client).await?;

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    server::serve(AppState::new(processor), &bind).await?;
    Ok(())
}

async fn run_ingest(mut config: Config, cmd: IngestCommand) -> Result<()> {
    cmd.source.apply(&mut config.source);
    let args = IngestArgs {
        sitename: cmd.sitename,
        host: config.source.host.clone(),
        min_id: cmd.min_id,
        max_id: cmd.max_id,
        range_width: config.ingest.range_width,
        options: ProcessOptions {
            replace_stop: cmd.replace_stop,
            tag_stop: cmd.tag_stop,
            tag_highlight: cmd.tag_highlight,
            ngram_range: cmd.ngram_range,
            ..ProcessOptions::default()
        },
        n_jobs: cmd.n_jobs,
    };

    let connections = ConfiguredConnections::new(config)?;
    let connections = if cmd.direct {
        connections.direct().await?
    } else {
        connections
    };
    let connections: Arc<dyn Connections> = Arc::new(connections);

    let report = ingest_site(connections, args).await?;
    report.log("ingest");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
        Config::default()
    });

    logging::init_logging(&config);

    match cli.command {
        Commands::Serve { bind, in_memory } => {
            run_serve(&config, bind, in_memory).await?;
        }
        Commands::InitTracker => {
            let tracker = Tracker::open(&config.tracker.db_path).await?;
            tracker.init().await?;
            tracing::info!(db_path = %config.tracker.db_path, "Tracker table ready");
        }
        Commands::Ingest(cmd) => {
            run_ingest(config, cmd).await?;
        }
        Commands::ViewProgress { source } => {
            let mut config = config;
            source.apply(&mut config.source);
            let connections = ConfiguredConnections::new(config)?;
            view_progress(&connections).await?;
        }
        Commands::ProcessNer { ner_path, n_jobs } => {
            let connections: Arc<dyn Connections> = Arc::new(ConfiguredConnections::new(config)?);
            let report = extract_named_entities(connections, &ner_path, n_jobs).await?;
            report.log("process-NER");
        }
        Commands::ChunkAgg { sitename, max_id, id_list, n_jobs } => {
            let targets = match (max_id, id_list) {
                (Some(max_id), _) => DocTargets::MaxId(max_id),
                (None, Some(ids)) => DocTargets::IdList(ids),
                (None, None) => anyhow::bail!("either --maxID or --IDList is required"),
            };
            let connections: Arc<dyn Connections> = Arc::new(ConfiguredConnections::new(config)?);
            let report = chunk_aggregate(connections, sitename, targets, n_jobs).await?;
            report.log("chunk-agg");
        }
        Commands::SearchNe { max_records, chunk_size, n_jobs } => {
            let connections: Arc<dyn Connections> = Arc::new(ConfiguredConnections::new(config)?);
            let report = search_named_entities(connections, max_records, chunk_size, n_jobs).await?;
            report.log("search-NE");
        }
    }

    Ok(())
}
