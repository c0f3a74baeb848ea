use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use threadlens_core::defaults::{SERVER_HOST, SERVER_PORT};
use threadlens_core::{InsightRepository, JobRepository};
use threadlens_db::{Database, InMemoryInsightRepository, InMemoryJobRepository, PoolConfig};
use threadlens_inference::{AspectSentimentAnalyzer, OpenAIBackend};
use threadlens_jobs::{
    PersistenceBatcher, ThreadAnalysisHandler, ThreadFetcher, WorkerBuilder, WorkerConfig,
};

use threadlens_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "threadlens=info,tower_http=info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "threadlens_api=info,threadlens_jobs=info,threadlens_db=info,threadlens_inference=info,tower_http=info"
            .into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("threadlens-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let host = std::env::var("HOST").unwrap_or_else(|_| SERVER_HOST.to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(SERVER_PORT);

    // Stores
    let (jobs, insights): (Arc<dyn JobRepository>, Arc<dyn InsightRepository>) =
        match std::env::var("DATABASE_URL") {
            Ok(url) => {
                let db = Database::connect_with_config(&url, PoolConfig::from_env()).await?;
                db.migrate().await?;
                info!(subsystem = "api", component = "startup", "Database ready");
                (Arc::new(db.jobs.clone()), Arc::new(db.insights.clone()))
            }
            Err(_) => {
                warn!(
                    subsystem = "api",
                    component = "startup",
                    "DATABASE_URL not set; using in-memory stores, nothing survives a restart"
                );
                (
                    Arc::new(InMemoryJobRepository::new()),
                    Arc::new(InMemoryInsightRepository::new()),
                )
            }
        };

    // Worker pool
    let openai = Arc::new(OpenAIBackend::from_env()?);
    let analyzer = Arc::new(AspectSentimentAnalyzer::new(openai.clone())?);
    let batcher = PersistenceBatcher::new(openai.clone(), insights)
        .with_batch_size(PersistenceBatcher::batch_size_from_env());
    let handler = ThreadAnalysisHandler::new(
        Arc::new(ThreadFetcher::from_env()?),
        analyzer,
        Arc::new(batcher),
    );
    let worker = WorkerBuilder::new(jobs.clone())
        .with_config(WorkerConfig::from_env())
        .with_handler(handler)
        .build()?;
    let worker_handle = worker.start();

    let app = router(AppState::new(jobs));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, draining workers");
    worker_handle.shutdown()?;
    worker_handle.join().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
