/// SQLite checkpoint store
///
/// One row per (sitename, host) holding the highest article id processed so
/// far. The checkpoint only ever moves forward: writes with a smaller id are
/// ignored inside the upsert itself, so concurrent workers cannot regress it.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};

use crate::errors::PhraseError;

#[derive(Clone)]
pub struct Tracker {
    pool: SqlitePool,
}

impl Tracker {
    /// Open (or create) the tracker database at `db_path`.
    ///
    /// Accepts plain paths, `sqlite://` URIs and `:memory:`.
    pub async fn open(db_path: &str) -> Result<Self, PhraseError> {
        let path = db_path.strip_prefix("sqlite://").unwrap_or(db_path);
        let in_memory = path.ends_with(":memory:");

        let mut opts = path
            .parse::<SqliteConnectOptions>()
            .map_err(|e| PhraseError::Storage(format!("Invalid tracker db_path '{}': {}", db_path, e)))?
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Normal);
        if !in_memory {
            opts = opts.journal_mode(SqliteJournalMode::Wal);
        }

        // A single connection serializes checkpoint writes from all workers
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| PhraseError::Storage(format!("Failed to open tracker database: {}", e)))?;

        Ok(Tracker { pool })
    }

    /// Create the tracker schema if it does not exist yet.
    pub async fn init(&self) -> Result<(), PhraseError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Last processed article id, 0 when the site was never ingested.
    pub async fn get_last_id(&self, sitename: &str, host: &str) -> Result<i64, PhraseError> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT article_id FROM tracker WHERE sitename = ? AND host = ?",
        )
        .bind(sitename)
        .bind(host)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id.unwrap_or(0))
    }

    /// Record `article_id` as processed. Only moves the checkpoint forward.
    pub async fn set_last_id(&self, sitename: &str, host: &str, article_id: i64) -> Result<(), PhraseError> {
        sqlx::query(
            "INSERT INTO tracker (sitename, host, article_id) VALUES (?, ?, ?) \
             ON CONFLICT(sitename, host) DO UPDATE SET article_id = excluded.article_id \
             WHERE excluded.article_id > tracker.article_id",
        )
        .bind(sitename)
        .bind(host)
        .bind(article_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
