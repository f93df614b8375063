/// Configuration management using figment
///
/// Loads configuration with this precedence (highest wins):
/// 1. Defaults (hardcoded)
/// 2. TOML file: phrase-api.toml (in working directory)
/// 3. Environment variables: prefixed PHRASE_API_, `__` separates sections
///    (e.g., PHRASE_API_GRAPH__HOST=arango.local)

use figment::{
    Figment,
    providers::{Env, Format, Toml, Serialized},
};
use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlConnectOptions;
use std::time::Duration;
use crate::errors::PhraseError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional file path for log output (in addition to stderr)
    #[serde(default)]
    pub log_file: Option<String>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            log_file: None,
            server: ServerConfig::default(),
            graph: GraphConfig::default(),
            source: SourceConfig::default(),
            tracker: TrackerConfig::default(),
            ingest: IngestConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// HTTP service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the doc-process service binds to (host:port).
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:80".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { bind: default_bind() }
    }
}

/// ArangoDB connection and collection names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_graph_host")]
    pub host: String,
    #[serde(default = "default_graph_port")]
    pub port: u16,
    #[serde(default = "default_graph_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_graph_database")]
    pub database: String,

    /// Aggregated phrase vertices (fetched by the data-fetcher endpoint).
    #[serde(default = "default_phrase_collection")]
    pub phrase_collection: String,
    /// Per-document staging records, folded in by chunk-agg.
    #[serde(default = "default_doc_phrase_collection")]
    pub doc_phrase_collection: String,
    /// Per-document staged phrase edges, folded in by chunk-agg.
    #[serde(default = "default_doc_edge_collection")]
    pub doc_edge_collection: String,
    #[serde(default = "default_edge_collection")]
    pub edge_collection: String,
    #[serde(default = "default_word_collection")]
    pub word_collection: String,
    #[serde(default = "default_word_edge_collection")]
    pub word_edge_collection: String,
    #[serde(default = "default_ner_collection")]
    pub ner_collection: String,
    #[serde(default = "default_stop_collection")]
    pub stop_collection: String,
    #[serde(default = "default_repeated_stops_collection")]
    pub repeated_stops_collection: String,
    #[serde(default = "default_repeated_ne_collection")]
    pub repeated_ne_collection: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_graph_host() -> String { "127.0.0.1".to_string() }
fn default_graph_port() -> u16 { 8529 }
fn default_graph_username() -> String { "root".to_string() }
fn default_graph_database() -> String { "phrases".to_string() }
fn default_phrase_collection() -> String { "agg_phrases".to_string() }
fn default_doc_phrase_collection() -> String { "doc_phrases".to_string() }
fn default_doc_edge_collection() -> String { "doc_phrase_edges".to_string() }
fn default_edge_collection() -> String { "phrase_edges".to_string() }
fn default_word_collection() -> String { "words".to_string() }
fn default_word_edge_collection() -> String { "word_edges".to_string() }
fn default_ner_collection() -> String { "named_entities".to_string() }
fn default_stop_collection() -> String { "stop_words".to_string() }
fn default_repeated_stops_collection() -> String { "repeated_stops".to_string() }
fn default_repeated_ne_collection() -> String { "repeated_ne".to_string() }
fn default_request_timeout_secs() -> u64 { 60 }

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            host: default_graph_host(),
            port: default_graph_port(),
            username: default_graph_username(),
            password: String::new(),
            database: default_graph_database(),
            phrase_collection: default_phrase_collection(),
            doc_phrase_collection: default_doc_phrase_collection(),
            doc_edge_collection: default_doc_edge_collection(),
            edge_collection: default_edge_collection(),
            word_collection: default_word_collection(),
            word_edge_collection: default_word_edge_collection(),
            ner_collection: default_ner_collection(),
            stop_collection: default_stop_collection(),
            repeated_stops_collection: default_repeated_stops_collection(),
            repeated_ne_collection: default_repeated_ne_collection(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl GraphConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// MySQL article source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_host")]
    pub host: String,
    #[serde(default = "default_source_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: String,
    /// Articles table; must be a plain SQL identifier.
    #[serde(default = "default_source_table")]
    pub table: String,
}

fn default_source_host() -> String { "127.0.0.1".to_string() }
fn default_source_port() -> u16 { 3306 }
fn default_source_table() -> String { "newsstudio_contents".to_string() }

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            host: default_source_host(),
            port: default_source_port(),
            username: String::new(),
            password: String::new(),
            database: String::new(),
            table: default_source_table(),
        }
    }
}

impl SourceConfig {
    /// Connection options with utf8mb4 charset. Credentials are passed as
    /// fields, never spliced into a URL.
    pub fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(&self.database)
            .charset("utf8mb4")
    }
}

/// SQLite checkpoint store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Supports the sqlite:// URI scheme.
    #[serde(default = "default_tracker_path")]
    pub db_path: String,
}

fn default_tracker_path() -> String {
    "sqlite://tracker.db".to_string()
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig { db_path: default_tracker_path() }
    }
}

/// Ingest job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Base URL of the doc-process service.
    #[serde(default = "default_ingest_endpoint")]
    pub endpoint: String,
    /// Sent as the x-token header when set.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Width of the id ranges handed to each worker.
    #[serde(default = "default_range_width")]
    pub range_width: i64,
    /// Timeout of one doc-process call in seconds. Unset waits as long as the
    /// service takes; a document can need minutes of edge upserts.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_ingest_endpoint() -> String { "http://127.0.0.1:80".to_string() }
fn default_range_width() -> i64 { 100 }

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            endpoint: default_ingest_endpoint(),
            api_key: None,
            range_width: default_range_width(),
            request_timeout_secs: None,
        }
    }
}

impl IngestConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Upsert retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 { 10 }
fn default_backoff_ms() -> u64 { 100 }

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, TOML file, and environment variables
    ///
    /// Environment variables override TOML file values.
    /// Example: PHRASE_API_RETRY__MAX_ATTEMPTS=2 overrides retry.max_attempts
    pub fn load() -> Result<Config, PhraseError> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("phrase-api.toml"))
            .merge(Env::prefixed("PHRASE_API_").split("__"))
            .extract()
            .map_err(|e| PhraseError::Config(format!("Failed to load config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_file, None);
        assert_eq!(config.tracker.db_path, "sqlite://tracker.db");
        assert_eq!(config.retry.max_attempts, 10);
        assert_eq!(config.ingest.range_width, 100);
        assert_eq!(config.source.port, 3306);
        assert_eq!(config.ingest.request_timeout(), None);
    }

    #[test]
    fn test_source_options_keep_special_characters_out_of_the_address() {
        let source = SourceConfig {
            host: "db.local".to_string(),
            port: 3307,
            username: "reader@news".to_string(),
            password: "pa#ss/1?x=%40".to_string(),
            database: "news".to_string(),
            ..Default::default()
        };
        let options = source.connect_options();
        assert_eq!(options.get_host(), "db.local");
        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_username(), "reader@news");
        assert_eq!(options.get_database(), Some("news"));
        assert_eq!(options.get_charset(), "utf8mb4");
    }

    #[test]
    fn test_env_overrides_nested_sections() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("PHRASE_API_GRAPH__HOST", "arango.internal");
            jail.set_env("PHRASE_API_RETRY__MAX_ATTEMPTS", "2");
            jail.set_env("PHRASE_API_INGEST__REQUEST_TIMEOUT_SECS", "600");
            let config = Config::load().expect("config should load");
            assert_eq!(config.graph.host, "arango.internal");
            assert_eq!(config.retry.max_attempts, 2);
            assert_eq!(config.graph.base_url(), "http://arango.internal:8529");
            assert_eq!(config.ingest.request_timeout(), Some(Duration::from_secs(600)));
            Ok(())
        });
    }
}
