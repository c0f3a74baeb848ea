//! Route handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use threadlens_core::{Job, JobRepository, TaskStatus};
use threadlens_jobs::SubmitJob;

use crate::error::ApiError;
use crate::{ApiDoc, AppState};

/// Body of `POST /api/v1/scrape`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ScrapeRequest {
    /// Discussion thread URL.
    pub source_url: String,
    /// Maximum comments to analyze (1-10000, default 1000).
    #[serde(default)]
    pub max_items: Option<i64>,
    /// Optional caller-chosen job id; resubmitting it returns the same job.
    #[serde(default)]
    pub job_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScrapeAccepted {
    pub task_handle: Uuid,
    pub job_id: Uuid,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub pending_jobs: i64,
}

/// Queue a thread for analysis.
#[utoipa::path(
    post,
    path = "/api/v1/scrape",
    request_body = ScrapeRequest,
    responses(
        (status = 202, description = "Job queued", body = ScrapeAccepted),
        (status = 400, description = "Invalid URL or max_items")
    ),
    tag = "Scrape"
)]
pub async fn submit_scrape(
    State(state): State<AppState>,
    Json(body): Json<ScrapeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let submission = state
        .dispatcher
        .submit(SubmitJob {
            source_url: body.source_url.clone(),
            max_items: body.max_items,
            job_id: body.job_id,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ScrapeAccepted {
            task_handle: submission.task_handle,
            job_id: submission.job_id,
            status: submission.status.external().to_string(),
            message: format!("Analysis queued for {}", body.source_url.trim()),
        }),
    ))
}

/// Poll a job by the handle returned at submission.
#[utoipa::path(
    get,
    path = "/api/v1/scrape/status/{task_handle}",
    params(("task_handle" = Uuid, Path, description = "Handle returned by POST /api/v1/scrape")),
    responses(
        (status = 200, description = "Current job status", body = TaskStatus),
        (status = 404, description = "Unknown task handle")
    ),
    tag = "Scrape"
)]
pub async fn scrape_status(
    State(state): State<AppState>,
    Path(task_handle): Path<Uuid>,
) -> Result<Json<TaskStatus>, ApiError> {
    state
        .dispatcher
        .status(task_handle)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Task {} not found", task_handle)))
}

/// Full job record.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job record", body = Job),
        (status = 404, description = "Job not found")
    ),
    tag = "Jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, ApiError> {
    let job = state
        .jobs
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))?;
    Ok(Json(job))
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let pending_jobs = state.dispatcher.pending_count().await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        pending_jobs,
    }))
}

pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
