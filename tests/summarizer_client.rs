mod helpers;

use precis::summarizer::{MAX_SUMMARY_CHARS, OllamaClient, SummarizeError};
use serde_json::json;
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
};

async fn client(server: &MockServer) -> OllamaClient {
    OllamaClient::new(helpers::ollama_config(&server.uri())).unwrap()
}

#[tokio::test]
async fn test_summarize_sends_fixed_options() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "gemma3:1b",
            "stream": false,
            "options": {"num_predict": 400, "num_ctx": 4096}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gemma3:1b",
            "response": "  The council approved the budget.  ",
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let summary = client(&server)
        .await
        .summarize("Some long article text.", Some("English"))
        .await
        .unwrap();
    assert_eq!(summary, "The council approved the budget.");
}

#[tokio::test]
async fn test_summarize_trims_overlong_output() {
    let server = MockServer::start().await;
    let sentence = "This sentence is exactly fifty characters long ok. ";
    let generated = sentence.repeat(40);

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": generated })))
        .mount(&server)
        .await;

    let summary = client(&server).await.summarize("text", None).await.unwrap();
    assert!(summary.chars().count() <= MAX_SUMMARY_CHARS);
    assert!(summary.ends_with('.'));
}

#[tokio::test]
async fn test_timeouts_are_retried_then_reported() {
    let server = MockServer::start().await;

    // Slower than the configured 500ms read timeout.
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "response": "late" }))
                .set_delay(Duration::from_secs(2)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .summarize("text", None)
        .await
        .unwrap_err();
    match err {
        SummarizeError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected exhausted retries, got {other}"),
    }
}

#[tokio::test]
async fn test_non_timeout_errors_fail_immediately() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .summarize("text", None)
        .await
        .unwrap_err();
    match err {
        SummarizeError::Status { status, body } => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "model not loaded");
        }
        other => panic!("expected status error, got {other}"),
    }
}

#[tokio::test]
async fn test_summarize_text_uses_requested_model() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({ "model": "llama3:8b" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "Short." })))
        .expect(1)
        .mount(&server)
        .await;

    let summary = client(&server)
        .await
        .summarize_text("Some text", Some("llama3:8b"), Some(100), "de")
        .await
        .unwrap();
    assert_eq!(summary, "Short.");
}

#[tokio::test]
async fn test_list_models_and_health() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "gemma3:1b", "modified_at": "2025-01-01T00:00:00Z", "size": 815319791, "digest": "abc"},
                {"name": "llama3:8b"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client(&server).await;
    let models = client.list_models().await.unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].name, "gemma3:1b");
    assert_eq!(models[0].size, Some(815319791));
    assert!(models[1].digest.is_none());
    assert!(client.check_health().await);
}

#[tokio::test]
async fn test_health_fails_when_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(!client(&server).await.check_health().await);
}
