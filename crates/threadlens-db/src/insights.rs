//! Insight row storage with pgvector embeddings.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres};
use tracing::debug;

use threadlens_core::{Error, InsightRepository, Result, StoredInsightRow};

/// PostgreSQL implementation of InsightRepository.
#[derive(Clone)]
pub struct PgInsightRepository {
    pool: Pool<Postgres>,
}

impl PgInsightRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InsightRepository for PgInsightRepository {
    /// One transaction per batch: either every row lands or none does.
    async fn insert_batch(&self, rows: &[StoredInsightRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        for row in rows {
            sqlx::query(
                "INSERT INTO insight (id, source_url, aspect, sentiment, text, embedding, metadata, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(row.id)
            .bind(&row.source_url)
            .bind(&row.aspect)
            .bind(row.sentiment.as_str())
            .bind(&row.text)
            .bind(&row.embedding)
            .bind(&row.metadata)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "insights",
            op = "insert_batch",
            rows = rows.len(),
            "Stored insight batch"
        );
        Ok(rows.len())
    }
}
