//! Error types for threadlens.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using threadlens' Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a thread fetch gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Upstream kept answering 429 until the retry budget ran out.
    RateLimited,
    /// Connection, timeout or transport failure on the final attempt.
    Network,
    /// Non-success status other than 429; never retried.
    BadStatus(u16),
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchErrorKind::RateLimited => write!(f, "rate limited"),
            FetchErrorKind::Network => write!(f, "network"),
            FetchErrorKind::BadStatus(code) => write!(f, "bad status {}", code),
        }
    }
}

/// Core error type for threadlens operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Thread fetch failed
    #[error("Fetch error ({kind}): {message}")]
    Fetch {
        kind: FetchErrorKind,
        message: String,
    },

    /// Upstream payload could not be decoded at all
    #[error("Parse error: {0}")]
    Parse(String),

    /// Content analysis failed for an item
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// A persistence batch failed; `stored` rows were acknowledged before it
    #[error("Persistence error after {stored} stored rows: {message}")]
    Persistence { stored: usize, message: String },

    /// Job state machine rejected a transition
    #[error("Invalid transition for job {job_id}: {reason}")]
    InvalidTransition { job_id: Uuid, reason: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed outside the fetch retry loop
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a fetch failure.
    pub fn fetch(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Error::Fetch {
            kind,
            message: message.into(),
        }
    }

    /// The fetch failure kind, if this is a fetch error.
    pub fn fetch_kind(&self) -> Option<FetchErrorKind> {
        match self {
            Error::Fetch { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
