/// MySQL-backed article source
///
/// The table name comes from configuration and cannot be bound as a query
/// parameter, so it is validated as a plain identifier before being spliced
/// into SQL.

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};

use super::{Article, ArticleSource, IdRange, ProcStatus, ProgressCounts};
use crate::config::SourceConfig;
use crate::errors::PhraseError;

/// Accept `[A-Za-z_][A-Za-z0-9_]*` only.
pub fn validate_identifier(name: &str) -> Result<(), PhraseError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(PhraseError::validation(
            "table",
            &format!("Invalid table name '{}'", name),
        ))
    }
}

pub struct MySqlArticleSource {
    pool: MySqlPool,
    table: String,
}

impl MySqlArticleSource {
    pub async fn connect(config: &SourceConfig) -> Result<Self, PhraseError> {
        validate_identifier(&config.table)?;

        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .connect_with(config.connect_options())
            .await
            .map_err(|e| {
                PhraseError::Storage(format!(
                    "Failed to connect to article source {}:{}: {}",
                    config.host, config.port, e
                ))
            })?;

        Ok(MySqlArticleSource {
            pool,
            table: config.table.clone(),
        })
    }
}

#[async_trait]
impl ArticleSource for MySqlArticleSource {
    async fn max_id(&self) -> Result<i64, PhraseError> {
        let sql = format!(
            "SELECT CAST(COALESCE(MAX(newsstudio_id), 0) AS SIGNED) FROM {}",
            self.table
        );
        let max: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(max)
    }

    async fn pending_articles(&self, range: IdRange) -> Result<Vec<Article>, PhraseError> {
        let sql = format!(
            "SELECT CAST(newsstudio_id AS SIGNED), content FROM {} \
             WHERE newsstudio_id BETWEEN ? AND ? \
             AND (proc_status IS NULL OR proc_status <> 1) \
             ORDER BY newsstudio_id",
            self.table
        );
        let rows: Vec<(i64, Option<String>)> = sqlx::query_as(&sql)
            .bind(range.start)
            .bind(range.end)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, content)| Article { id, content })
            .collect())
    }

    async fn mark_status(&self, id: i64, status: ProcStatus) -> Result<(), PhraseError> {
        let sql = format!("UPDATE {} SET proc_status = ? WHERE newsstudio_id = ?", self.table);
        sqlx::query(&sql)
            .bind(status.code())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn progress(&self) -> Result<ProgressCounts, PhraseError> {
        let sql = format!(
            "SELECT \
               CAST(COUNT(DISTINCT newsstudio_id) AS SIGNED), \
               CAST(COUNT(DISTINCT CASE WHEN proc_status = 1 THEN newsstudio_id END) AS SIGNED), \
               CAST(COUNT(DISTINCT CASE WHEN proc_status = 2 THEN newsstudio_id END) AS SIGNED) \
             FROM {}",
            self.table
        );
        let (total, processed, failed): (i64, i64, i64) =
            sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(ProgressCounts {
            total: total.max(0) as u64,
            processed: processed.max(0) as u64,
            failed: failed.max(0) as u64,
        })
    }
}
