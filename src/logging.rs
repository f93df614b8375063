/// Structured logging setup using tracing
///
/// Writes to stderr. Auto-detects format: human-readable with ANSI colors when
/// stderr is a terminal, structured JSON when piped/redirected (worker logs of
/// long batch jobs are usually shipped somewhere).

use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::sync::Mutex;
use tracing_subscriber::{
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};
use crate::config::Config;

/// Initialize tracing subscriber with stderr output and an optional log file
///
/// Log level from config.log_level (default: info)
/// RUST_LOG env var can override at runtime
pub fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let file_layer = config.log_file.as_deref().and_then(file_layer);

    if std::io::stderr().is_terminal() {
        tracing_subscriber::registry()
            .with(file_layer)
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(file_layer)
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
            )
            .init();
    }
}

/// Plain-text layer appending to `path`. Returns None (with a note on stderr)
/// when the file cannot be opened, so logging still comes up.
fn file_layer(path: &str) -> Option<Box<dyn Layer<Registry> + Send + Sync>> {
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .boxed(),
        ),
        Err(e) => {
            eprintln!("Cannot open log file '{}' ({}), logging to stderr only", path, e);
            None
        }
    }
}
