//! OpenAI API request and response types.

use serde::{Deserialize, Serialize};

// =============================================================================
// EMBEDDING TYPES
// =============================================================================

#[derive(Debug, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingResponse {
    pub data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingData {
    pub embedding: Vec<f32>,
    pub index: usize,
}

// =============================================================================
// CHAT COMPLETION TYPES
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Error response from an OpenAI-compatible API.
#[derive(Debug, Deserialize)]
pub struct OpenAIErrorResponse {
    pub error: OpenAIError,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIError {
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: String,
}

impl OpenAIErrorResponse {
    /// Placeholder for bodies that are not a JSON error envelope.
    pub fn unknown() -> Self {
        Self {
            error: OpenAIError {
                message: "Unknown error".to_string(),
                error_type: "unknown".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_request_omits_empty_format() {
        let req = EmbeddingRequest {
            model: "m".into(),
            input: vec!["a".into()],
            encoding_format: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("encoding_format").is_none());
    }

    #[test]
    fn test_error_response_without_type() {
        let body: OpenAIErrorResponse =
            serde_json::from_str(r#"{"error":{"message":"slow down"}}"#).unwrap();
        assert_eq!(body.error.message, "slow down");
        assert_eq!(body.error.error_type, "");
    }
}
