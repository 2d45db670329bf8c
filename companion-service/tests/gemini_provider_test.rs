//! Gemini provider and health assistant against a mocked Gemini API.

use companion_service::models::UrgencyLevel;
use companion_service::services::assistant::{AssistantError, HealthAssistant};
use companion_service::services::providers::gemini::{GeminiConfig, GeminiTextProvider};
use companion_service::services::providers::{GenerationParams, ProviderError, TextProvider};
use secrecy::Secret;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

fn provider(server: &MockServer, timeout: Duration) -> GeminiTextProvider {
    GeminiTextProvider::new(GeminiConfig {
        api_key: Secret::new("test-api-key".to_string()),
        model: "gemini-2.0-flash".to_string(),
        api_base: format!("{}/v1beta", server.uri()),
        timeout,
    })
    .unwrap()
}

fn candidate(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

#[tokio::test]
async fn sends_prompt_key_and_decoding_config() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-api-key"))
        .and(body_partial_json(json!({
            "contents": [{"role": "user", "parts": [{"text": "hello"}]}],
            "generationConfig": {"topK": 40, "responseMimeType": "application/json"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate("world")))
        .expect(1)
        .mount(&server)
        .await;

    let params = GenerationParams {
        temperature: Some(0.3),
        top_p: Some(0.8),
        top_k: Some(40),
        response_mime_type: Some("application/json".to_string()),
    };

    let text = provider(&server, Duration::from_secs(5))
        .generate("hello", &params)
        .await
        .unwrap();
    assert_eq!(text, "world");
}

#[tokio::test]
async fn multi_part_candidates_are_concatenated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]}}]
        })))
        .mount(&server)
        .await;

    let text = provider(&server, Duration::from_secs(5))
        .generate("x", &GenerationParams::default())
        .await
        .unwrap();
    assert_eq!(text, r#"{"a":1}"#);
}

#[tokio::test]
async fn error_status_is_rejected_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let err = provider(&server, Duration::from_secs(5))
        .generate("x", &GenerationParams::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProviderError::Rejected {
            status: 500,
            body: "internal".to_string()
        }
    );
}

#[tokio::test]
async fn slow_reply_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(candidate("late"))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let err = provider(&server, Duration::from_millis(100))
        .generate("x", &GenerationParams::default())
        .await
        .unwrap_err();
    assert_eq!(err, ProviderError::Timeout);
}

#[tokio::test]
async fn blocked_and_empty_replies_are_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [],
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&server)
        .await;

    let err = provider(&server, Duration::from_secs(5))
        .generate("x", &GenerationParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::MalformedResponse(ref m) if m.contains("SAFETY")));
}

#[tokio::test]
async fn safety_finish_reason_is_content_filtered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        })))
        .mount(&server)
        .await;

    let err = provider(&server, Duration::from_secs(5))
        .generate("x", &GenerationParams::default())
        .await
        .unwrap_err();
    assert_eq!(err, ProviderError::ContentFiltered);
}

#[tokio::test]
async fn missing_api_key_fails_without_network() {
    let server = MockServer::start().await;

    let provider = GeminiTextProvider::new(GeminiConfig {
        api_key: Secret::new(String::new()),
        model: "gemini-2.0-flash".to_string(),
        api_base: format!("{}/v1beta", server.uri()),
        timeout: Duration::from_secs(5),
    })
    .unwrap();

    let err = provider
        .generate("x", &GenerationParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::NotConfigured(_)));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn assistant_parses_gemini_json_reply() {
    let server = MockServer::start().await;
    let assessment = json!({
        "urgency_level": "EMERGENCY",
        "initial_assessment": "Possible stroke",
        "recommended_actions": ["Call emergency services"],
        "lifestyle_recommendations": [],
        "warning_signs": ["Slurred speech"]
    });
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_partial_json(json!({
            "generationConfig": {"topK": 40, "responseMimeType": "application/json"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate(&assessment.to_string())))
        .expect(1)
        .mount(&server)
        .await;

    let assistant = HealthAssistant::new(Arc::new(provider(&server, Duration::from_secs(5))));
    let result = assistant
        .analyze_symptoms(&["face drooping".to_string()], None)
        .await
        .unwrap();

    assert_eq!(result.urgency_level, UrgencyLevel::Emergency);
    assert_eq!(result.warning_signs, vec!["Slurred speech"]);
    assert!(result.lifestyle_recommendations.is_empty());
}

#[tokio::test]
async fn assistant_maps_gateway_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
        .mount(&server)
        .await;

    let assistant = HealthAssistant::new(Arc::new(provider(&server, Duration::from_secs(5))));
    let err = assistant.generate_follow_up(&[]).await.unwrap_err();

    assert_eq!(
        err,
        AssistantError::UpstreamRejected {
            status: 429,
            body: "quota".to_string()
        }
    );
}
