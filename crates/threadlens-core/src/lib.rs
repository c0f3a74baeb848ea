//! # threadlens-core
//!
//! Core types, traits, and the job state machine shared by the threadlens
//! crates.
//!
//! A job fetches one discussion thread, flattens its reply tree, analyzes
//! each comment, and stores the resulting insights with embeddings. This
//! crate defines the records involved ([`Job`], [`CommentItem`],
//! [`Insight`], [`StoredInsightRow`]), the single transition function
//! ([`apply_transition`]) that guards every job status change, and the
//! repository/backend traits the other crates implement.

pub mod defaults;
pub mod error;
pub mod job_state;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, FetchErrorKind, Result};
pub use job_state::{apply_transition, JobTransition};
pub use models::*;
pub use traits::*;
pub use uuid_utils::new_v7;
