//! In-process repositories for tests and local runs without PostgreSQL.
//!
//! Semantics match the Postgres repositories: claims are FIFO by creation,
//! every status change goes through `apply_transition`, and creation is
//! idempotent on job id.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use threadlens_core::{
    apply_transition, Error, InsightRepository, Job, JobRepository, JobStatus, JobTransition,
    NewJob, Result, StoredInsightRow,
};

/// Job store backed by a mutex-guarded vector kept in creation order.
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: Mutex<Vec<Job>>,
    notify: Arc<Notify>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored job.
    pub async fn all(&self) -> Vec<Job> {
        self.jobs.lock().await.clone()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, request: NewJob) -> Result<Job> {
        let mut jobs = self.jobs.lock().await;
        if let Some(existing) = jobs.iter().find(|j| j.id == request.id) {
            return Ok(existing.clone());
        }
        let job = Job::new(&request, Utc::now());
        jobs.push(job.clone());
        drop(jobs);

        self.notify.notify_one();
        Ok(job)
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.iter_mut().find(|j| j.status == JobStatus::Pending) else {
            return Ok(None);
        };
        apply_transition(job, JobTransition::Start, Utc::now())?;
        Ok(Some(job.clone()))
    }

    async fn transition(&self, job_id: Uuid, transition: JobTransition) -> Result<Job> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;

        // Work on a copy so a rejected transition leaves the record untouched.
        let mut updated = job.clone();
        apply_transition(&mut updated, transition, Utc::now())?;
        *job = updated.clone();
        Ok(updated)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn get_by_task_handle(&self, task_handle: Uuid) -> Result<Option<Job>> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.iter().find(|j| j.task_handle == task_handle).cloned())
    }

    async fn pending_count(&self) -> Result<i64> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.iter().filter(|j| j.status == JobStatus::Pending).count() as i64)
    }

    fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}

/// Insight store that keeps rows in memory.
#[derive(Default)]
pub struct InMemoryInsightRepository {
    rows: Mutex<Vec<StoredInsightRow>>,
}

impl InMemoryInsightRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored row, in insertion order.
    pub async fn rows(&self) -> Vec<StoredInsightRow> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl InsightRepository for InMemoryInsightRepository {
    async fn insert_batch(&self, rows: &[StoredInsightRow]) -> Result<usize> {
        self.rows.lock().await.extend_from_slice(rows);
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadlens_core::{new_v7, JobStage, Sentiment, Vector};

    fn new_job(url: &str) -> NewJob {
        NewJob {
            id: new_v7(),
            task_handle: new_v7(),
            source_url: url.to_string(),
            max_items: 100,
        }
    }

    #[tokio::test]
    async fn test_create_is_idempotent_on_id() {
        let repo = InMemoryJobRepository::new();
        let request = new_job("https://www.reddit.com/r/a/comments/1/x");

        let first = repo.create(request.clone()).await.unwrap();
        let mut again = request.clone();
        again.task_handle = new_v7();
        let second = repo.create(again).await.unwrap();

        assert_eq!(first.task_handle, second.task_handle);
        assert_eq!(repo.all().await.len(), 1);
        assert_eq!(repo.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_claim_is_fifo_and_exclusive() {
        let repo = InMemoryJobRepository::new();
        let a = repo.create(new_job("https://reddit.com/a")).await.unwrap();
        let b = repo.create(new_job("https://reddit.com/b")).await.unwrap();

        let first = repo.claim_next().await.unwrap().unwrap();
        let second = repo.claim_next().await.unwrap().unwrap();
        assert_eq!(first.id, a.id);
        assert_eq!(second.id, b.id);
        assert_eq!(first.status, JobStatus::Started);
        assert!(repo.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_transition_leaves_record_untouched() {
        let repo = InMemoryJobRepository::new();
        let job = repo.create(new_job("https://reddit.com/a")).await.unwrap();
        repo.claim_next().await.unwrap();
        repo.transition(job.id, JobTransition::BeginProcessing { total_items: 4 })
            .await
            .unwrap();
        repo.transition(
            job.id,
            JobTransition::Checkpoint {
                processed_items: 3,
                stage: JobStage::Analyzing,
                percent: 75,
            },
        )
        .await
        .unwrap();

        let err = repo
            .transition(
                job.id,
                JobTransition::Checkpoint {
                    processed_items: 2,
                    stage: JobStage::Analyzing,
                    percent: 50,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));

        let stored = repo.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.processed_items, 3);
        assert_eq!(stored.progress_percent, 75);
    }

    #[tokio::test]
    async fn test_transition_unknown_job_is_not_found() {
        let repo = InMemoryJobRepository::new();
        let err = repo
            .transition(Uuid::nil(), JobTransition::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_lookup_by_task_handle() {
        let repo = InMemoryJobRepository::new();
        let job = repo.create(new_job("https://reddit.com/a")).await.unwrap();
        let found = repo.get_by_task_handle(job.task_handle).await.unwrap();
        assert_eq!(found.map(|j| j.id), Some(job.id));
        assert!(repo.get_by_task_handle(new_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insight_store_keeps_insertion_order() {
        let store = InMemoryInsightRepository::new();
        let row = |url: &str| StoredInsightRow {
            id: new_v7(),
            source_url: url.to_string(),
            aspect: "price".into(),
            sentiment: Sentiment::Neutral,
            text: "fine".into(),
            embedding: Vector::from(vec![0.0, 1.0]),
            metadata: serde_json::json!({}),
        };
        let acked = store
            .insert_batch(&[row("https://a"), row("https://a"), row("https://b")])
            .await
            .unwrap();
        assert_eq!(acked, 3);
        let urls: Vec<String> = store.rows().await.into_iter().map(|r| r.source_url).collect();
        assert_eq!(urls, vec!["https://a", "https://a", "https://b"]);
    }
}
