//! Job repository implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use threadlens_core::{
    apply_transition, Error, Job, JobRepository, JobStage, JobStatus, JobTransition, NewJob,
    Result,
};

const JOB_COLUMNS: &str = "id, task_handle, source_url, max_items, status, stage, \
     progress_percent, total_items, processed_items, insight_count, error, \
     created_at, started_at, completed_at";

/// PostgreSQL implementation of JobRepository.
#[derive(Clone)]
pub struct PgJobRepository {
    pool: Pool<Postgres>,
    notify: Arc<Notify>,
}

impl PgJobRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Create a repository sharing an existing notify handle.
    pub fn with_notify(pool: Pool<Postgres>, notify: Arc<Notify>) -> Self {
        Self { pool, notify }
    }

    fn parse_job_row(row: &PgRow) -> Result<Job> {
        let status: String = row.try_get("status").map_err(Error::Database)?;
        let status = JobStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("unknown job status in store: {}", status)))?;
        let stage: Option<String> = row.try_get("stage").map_err(Error::Database)?;

        Ok(Job {
            id: row.try_get("id").map_err(Error::Database)?,
            task_handle: row.try_get("task_handle").map_err(Error::Database)?,
            source_url: row.try_get("source_url").map_err(Error::Database)?,
            max_items: row.try_get("max_items").map_err(Error::Database)?,
            status,
            stage: stage.as_deref().and_then(JobStage::parse),
            progress_percent: row.try_get("progress_percent").map_err(Error::Database)?,
            total_items: row.try_get("total_items").map_err(Error::Database)?,
            processed_items: row.try_get("processed_items").map_err(Error::Database)?,
            insight_count: row.try_get("insight_count").map_err(Error::Database)?,
            error: row.try_get("error").map_err(Error::Database)?,
            created_at: row.try_get("created_at").map_err(Error::Database)?,
            started_at: row.try_get("started_at").map_err(Error::Database)?,
            completed_at: row.try_get("completed_at").map_err(Error::Database)?,
        })
    }

    /// Persist every mutable column of `job`.
    async fn write_job(tx: &mut Transaction<'_, Postgres>, job: &Job) -> Result<()> {
        sqlx::query(
            "UPDATE scrape_job
             SET status = $2, stage = $3, progress_percent = $4, total_items = $5,
                 processed_items = $6, insight_count = $7, error = $8,
                 started_at = $9, completed_at = $10
             WHERE id = $1",
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.stage.map(|s| s.as_str()))
        .bind(job.progress_percent)
        .bind(job.total_items)
        .bind(job.processed_items)
        .bind(job.insight_count)
        .bind(job.error.as_deref())
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn fetch_one_by(&self, column: &str, value: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scrape_job WHERE {column} = $1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_job_row).transpose()
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn create(&self, request: NewJob) -> Result<Job> {
        let job = Job::new(&request, Utc::now());

        let inserted = sqlx::query(&format!(
            "INSERT INTO scrape_job (id, task_handle, source_url, max_items, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO NOTHING
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job.id)
        .bind(job.task_handle)
        .bind(&job.source_url)
        .bind(job.max_items)
        .bind(job.status.as_str())
        .bind(job.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match inserted {
            Some(row) => {
                self.notify.notify_one();
                Self::parse_job_row(&row)
            }
            None => {
                debug!(job_id = %request.id, "Job already exists, returning existing record");
                self.fetch_one_by("id", request.id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("job {}", request.id)))
            }
        }
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // SKIP LOCKED keeps concurrent slots from claiming the same row.
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scrape_job
             WHERE status = 'pending'
             ORDER BY created_at ASC
             LIMIT 1
             FOR UPDATE SKIP LOCKED"
        ))
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut job = Self::parse_job_row(&row)?;
        apply_transition(&mut job, JobTransition::Start, Utc::now())?;
        Self::write_job(&mut tx, &job).await?;
        tx.commit().await.map_err(Error::Database)?;

        Ok(Some(job))
    }

    async fn transition(&self, job_id: Uuid, transition: JobTransition) -> Result<Job> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scrape_job WHERE id = $1 FOR UPDATE"
        ))
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;

        let mut job = Self::parse_job_row(&row)?;
        // A rejected transition drops the transaction, rolling back the lock.
        apply_transition(&mut job, transition, Utc::now())?;
        Self::write_job(&mut tx, &job).await?;
        tx.commit().await.map_err(Error::Database)?;

        Ok(job)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        self.fetch_one_by("id", job_id).await
    }

    async fn get_by_task_handle(&self, task_handle: Uuid) -> Result<Option<Job>> {
        self.fetch_one_by("task_handle", task_handle).await
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM scrape_job WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(count.0)
    }

    fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}
