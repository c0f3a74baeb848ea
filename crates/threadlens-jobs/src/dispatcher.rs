//! Job submission and status lookup.

use std::sync::Arc;

use reqwest::Url;
use tracing::info;
use uuid::Uuid;

use threadlens_core::defaults::{ALLOWED_THREAD_HOSTS, MAX_ITEMS_DEFAULT, MAX_ITEMS_LIMIT};
use threadlens_core::{new_v7, Error, JobRepository, JobStatus, NewJob, Result, TaskStatus};

use crate::fetcher::{is_thread_host, upgrade_scheme};

/// A request to analyze one thread.
#[derive(Debug, Clone, Default)]
pub struct SubmitJob {
    pub source_url: String,
    pub max_items: Option<i64>,
    /// Caller-chosen id; resubmitting the same id returns the existing job.
    pub job_id: Option<Uuid>,
}

/// What the submitter gets back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub job_id: Uuid,
    pub task_handle: Uuid,
    pub status: JobStatus,
}

/// Validates submissions, records them as pending jobs and answers status
/// queries. Worker slots are woken through the job store's notifier.
#[derive(Clone)]
pub struct JobDispatcher {
    jobs: Arc<dyn JobRepository>,
    allowed_hosts: Vec<String>,
}

impl JobDispatcher {
    pub fn new(jobs: Arc<dyn JobRepository>) -> Self {
        Self {
            jobs,
            allowed_hosts: ALLOWED_THREAD_HOSTS.iter().map(|h| h.to_string()).collect(),
        }
    }

    /// Replace the accepted thread hosts (subdomains of each are accepted too).
    pub fn with_allowed_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Validate and enqueue a job. Returns without waiting for any work.
    pub async fn submit(&self, request: SubmitJob) -> Result<Submission> {
        let source_url = sanitize_thread_url(&request.source_url, &self.allowed_hosts)?;
        let max_items = request.max_items.unwrap_or(MAX_ITEMS_DEFAULT);
        if !(1..=MAX_ITEMS_LIMIT).contains(&max_items) {
            return Err(Error::InvalidInput(format!(
                "max_items must be between 1 and {}, got {}",
                MAX_ITEMS_LIMIT, max_items
            )));
        }

        let job = self
            .jobs
            .create(NewJob {
                id: request.job_id.unwrap_or_else(new_v7),
                task_handle: new_v7(),
                source_url,
                max_items,
            })
            .await?;

        info!(
            subsystem = "jobs",
            component = "dispatcher",
            op = "submit",
            job_id = %job.id,
            task_handle = %job.task_handle,
            status = job.status.as_str(),
            "Job submitted"
        );

        Ok(Submission {
            job_id: job.id,
            task_handle: job.task_handle,
            status: job.status,
        })
    }

    /// Poller view of a job by its task handle.
    pub async fn status(&self, task_handle: Uuid) -> Result<Option<TaskStatus>> {
        Ok(self
            .jobs
            .get_by_task_handle(task_handle)
            .await?
            .as_ref()
            .map(TaskStatus::from))
    }

    /// Poller view of a job by its id.
    pub async fn status_by_job_id(&self, job_id: Uuid) -> Result<Option<TaskStatus>> {
        Ok(self.jobs.get(job_id).await?.as_ref().map(TaskStatus::from))
    }

    pub async fn pending_count(&self) -> Result<i64> {
        self.jobs.pending_count().await
    }
}

/// Validate a submitted thread URL and strip query and fragment.
pub fn sanitize_thread_url(raw: &str, allowed_hosts: &[String]) -> Result<String> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| Error::InvalidInput(format!("Invalid URL '{}': {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidInput(format!(
            "Unsupported URL scheme '{}'",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidInput(format!("URL has no host: {}", raw)))?;
    if !is_thread_host(host, allowed_hosts) {
        return Err(Error::InvalidInput(format!(
            "Host '{}' is not a supported discussion site",
            host
        )));
    }

    url.set_query(None);
    url.set_fragment(None);
    upgrade_scheme(&mut url);
    Ok(url.to_string())
}
