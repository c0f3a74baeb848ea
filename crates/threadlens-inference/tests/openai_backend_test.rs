//! Integration tests for the OpenAI-compatible backend and the analyzer
//! running on top of it, against a wiremock server.

use std::sync::Arc;
use std::time::Duration;

use threadlens_core::{AnalysisBackend, EmbeddingBackend, Error, GenerationBackend, Sentiment};
use threadlens_inference::{AspectSentimentAnalyzer, OpenAIBackend, OpenAIConfig};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> OpenAIConfig {
    OpenAIConfig {
        base_url: server.uri(),
        api_key: Some("test-key".to_string()),
        embed_model: "test-embed".to_string(),
        gen_model: "test-gen".to_string(),
        embed_dimension: 3,
        timeout_seconds: 10,
        max_retries: 2,
        retry_base_delay: Duration::from_millis(10),
    }
}

fn chat_answer(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn test_embeddings_sorted_by_index() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {"embedding": [0.0, 1.0, 0.0], "index": 1},
                {"embedding": [1.0, 0.0, 0.0], "index": 0}
            ],
            "model": "test-embed",
            "usage": {"prompt_tokens": 2, "total_tokens": 2}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = OpenAIBackend::new(config_for(&server)).unwrap();
    let vectors = backend
        .embed_texts(&["a: first".to_string(), "b: second".to_string()])
        .await
        .unwrap();

    assert_eq!(vectors[0].as_slice(), &[1.0, 0.0, 0.0]);
    assert_eq!(vectors[1].as_slice(), &[0.0, 1.0, 0.0]);
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": {"message": "slow down", "type": "rate_limit_exceeded"}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_answer("positive")))
        .mount(&server)
        .await;

    let backend = OpenAIBackend::new(config_for(&server)).unwrap();
    let answer = backend.generate("hello").await.unwrap();
    assert_eq!(answer, "positive");
}

#[tokio::test]
async fn test_auth_failure_is_config_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {"message": "bad key", "type": "invalid_api_key"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = OpenAIBackend::new(config_for(&server)).unwrap();
    let err = backend.embed_texts(&["x".to_string()]).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_analyzer_over_openai_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("List at most"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_answer(r#"["battery life", "screen"]"#)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("toward \\\"battery life\\\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_answer("Negative")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("toward \\\"screen\\\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_answer("positive")))
        .mount(&server)
        .await;

    let backend = Arc::new(OpenAIBackend::new(config_for(&server)).unwrap());
    let analyzer = AspectSentimentAnalyzer::new(backend).unwrap();

    let insights = analyzer
        .analyze("Battery life is a joke but the screen is gorgeous.")
        .await
        .unwrap();

    assert_eq!(insights.len(), 2);
    assert_eq!(insights[0].aspect, "battery life");
    assert_eq!(insights[0].sentiment, Sentiment::Negative);
    assert_eq!(insights[1].aspect, "screen");
    assert_eq!(insights[1].sentiment, Sentiment::Positive);
    assert_eq!(
        insights[0].excerpt,
        "Battery life is a joke but the screen is gorgeous."
    );
}

#[tokio::test]
async fn test_analyzer_general_aspect_when_none_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_answer("[]")))
        .expect(1)
        .mount(&server)
        .await;

    let backend = Arc::new(OpenAIBackend::new(config_for(&server)).unwrap());
    let analyzer = AspectSentimentAnalyzer::new(backend).unwrap();

    let insights = analyzer
        .analyze("Honestly the best thing I have bought this year")
        .await
        .unwrap();

    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].aspect, "general");
    assert_eq!(insights[0].sentiment, Sentiment::Positive);
}
