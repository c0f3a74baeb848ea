//! # threadlens-jobs
//!
//! Thread analysis pipeline for threadlens.
//!
//! This crate provides:
//! - Submission and status lookup ([`JobDispatcher`])
//! - Upstream fetch with rate-limit and network retry ([`ThreadFetcher`])
//! - Depth-first flattening of comment trees ([`extractor::flatten`])
//! - Batched embedding and persistence ([`PersistenceBatcher`])
//! - A bounded worker pool with progress events ([`JobWorker`])
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use threadlens_jobs::{JobDispatcher, SubmitJob, ThreadAnalysisHandler, WorkerBuilder, WorkerConfig};
//!
//! let handler = ThreadAnalysisHandler::new(fetcher, analyzer, batcher);
//! let worker = WorkerBuilder::new(jobs.clone())
//!     .with_config(WorkerConfig::from_env())
//!     .with_handler(handler)
//!     .build()?;
//! let handle = worker.start();
//!
//! let dispatcher = JobDispatcher::new(jobs);
//! let submission = dispatcher
//!     .submit(SubmitJob { source_url: url.into(), ..Default::default() })
//!     .await?;
//!
//! handle.shutdown()?;
//! handle.join().await;
//! ```

pub mod batcher;
pub mod dispatcher;
pub mod extractor;
pub mod fetcher;
pub mod handler;
pub mod pipeline;
pub mod worker;

// Re-export core types
pub use threadlens_core::*;

pub use batcher::PersistenceBatcher;
pub use dispatcher::{sanitize_thread_url, JobDispatcher, SubmitJob, Submission};
pub use extractor::{flatten, Extraction};
pub use fetcher::{FetcherConfig, ThreadFetcher};
pub use handler::{JobContext, JobHandler, JobResult};
pub use pipeline::ThreadAnalysisHandler;
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
