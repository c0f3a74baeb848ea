//! # threadlens-api
//!
//! HTTP surface for threadlens: thread submission, status polling, job
//! lookup, health, and the OpenAPI document.

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use threadlens_core::{
    Job, JobProgress, JobRepository, JobResultSummary, JobStage, JobStatus, TaskStatus,
};
use threadlens_jobs::JobDispatcher;

pub use error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: JobDispatcher,
    pub jobs: Arc<dyn JobRepository>,
}

impl AppState {
    pub fn new(jobs: Arc<dyn JobRepository>) -> Self {
        Self {
            dispatcher: JobDispatcher::new(jobs.clone()),
            jobs,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: JobDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ThreadLens API",
        description = "Aspect-based sentiment analysis of discussion threads"
    ),
    paths(
        handlers::submit_scrape,
        handlers::scrape_status,
        handlers::get_job,
        handlers::health
    ),
    components(schemas(
        handlers::ScrapeRequest,
        handlers::ScrapeAccepted,
        handlers::HealthResponse,
        TaskStatus,
        JobProgress,
        JobResultSummary,
        Job,
        JobStatus,
        JobStage
    )),
    tags(
        (name = "Scrape", description = "Thread submission and polling"),
        (name = "Jobs", description = "Job records"),
        (name = "Health", description = "Liveness")
    )
)]
pub struct ApiDoc;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/scrape", post(handlers::submit_scrape))
        .route(
            "/api/v1/scrape/status/:task_handle",
            get(handlers::scrape_status),
        )
        .route("/api/v1/jobs/:id", get(handlers::get_job))
        .route("/api-docs/openapi.json", get(handlers::openapi_json))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT]),
        )
        .with_state(state)
}
