/// Domain-specific error types for phrase-api
///
/// `PhraseError` is the crate-wide error. Graph store failures keep their own
/// type (`GraphError`, see `graph`) so the aggregator can tell transient
/// conflicts from hard failures before deciding whether to retry.

use crate::graph::GraphError;

#[derive(Debug, thiserror::Error)]
pub enum PhraseError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>
    },

    #[error("Not found: {what}")]
    NotFound {
        what: String
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Graph store error: {0}")]
    Graph(#[from] GraphError),

    #[error("Upstream error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for PhraseError {
    fn from(e: sqlx::Error) -> Self {
        PhraseError::Storage(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for PhraseError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        PhraseError::Storage(format!("Migration failed: {}", e))
    }
}

impl From<reqwest::Error> for PhraseError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => PhraseError::Upstream {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => PhraseError::Internal(format!("HTTP request failed: {}", e)),
        }
    }
}

impl From<regex::Error> for PhraseError {
    fn from(e: regex::Error) -> Self {
        PhraseError::Internal(format!("Pattern compilation failed: {}", e))
    }
}

impl PhraseError {
    /// Helper to create validation errors with field names
    ///
    /// Example:
    /// ```
    /// use phrase_api::errors::PhraseError;
    /// let err = PhraseError::validation("ngram_range", "Expected two numbers");
    /// ```
    pub fn validation(field: &str, message: &str) -> Self {
        PhraseError::Validation {
            message: message.to_string(),
            field: Some(field.to_string()),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        PhraseError::NotFound { what: what.into() }
    }
}
