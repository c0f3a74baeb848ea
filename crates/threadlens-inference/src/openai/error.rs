//! OpenAI-specific error handling.

use threadlens_core::Error;

/// OpenAI-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    AuthenticationError,
    RateLimitExceeded,
    ModelNotFound,
    ContextLengthExceeded,
    ServerError,
    Unknown,
}

impl OpenAIErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401, _) => Self::AuthenticationError,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError)
    }
}

/// Which call failed; selects the error variant for non-config failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIOperation {
    Embedding,
    Generation,
}

/// Convert an OpenAI error to a threadlens Error.
pub fn to_threadlens_error(code: OpenAIErrorCode, op: OpenAIOperation, message: &str) -> Error {
    let wrap = |msg: String| match op {
        OpenAIOperation::Embedding => Error::Embedding(msg),
        OpenAIOperation::Generation => Error::Inference(msg),
    };
    match code {
        OpenAIErrorCode::AuthenticationError => {
            Error::Config(format!("Authentication failed: {}", message))
        }
        OpenAIErrorCode::ModelNotFound => Error::Config(format!("Model not found: {}", message)),
        OpenAIErrorCode::RateLimitExceeded => wrap(format!("Rate limit exceeded: {}", message)),
        OpenAIErrorCode::ContextLengthExceeded => wrap(format!("Context too long: {}", message)),
        OpenAIErrorCode::ServerError => wrap(format!("Server error: {}", message)),
        OpenAIErrorCode::Unknown => wrap(message.to_string()),
    }
}
