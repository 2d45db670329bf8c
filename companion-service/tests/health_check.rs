//! Spawns the real application on a random port and talks to it over HTTP.

use companion_service::config::CompanionConfig;
use companion_service::startup::Application;
use reqwest::Client;
use std::time::Duration;

/// Spawn the application on a random port and return the port number.
async fn spawn_app() -> u16 {
    std::env::set_var("ENVIRONMENT", "test");
    std::env::set_var("APP__PORT", "0"); // Random port
    std::env::set_var("APP__HOST", "127.0.0.1");
    std::env::set_var("GOOGLE_API_KEY", "test-api-key");
    std::env::set_var("GEMINI_API_BASE", "http://127.0.0.1:1/v1beta");
    std::env::set_var("GOOGLE_FIT_INTERACTIVE_AUTH", "false");
    std::env::set_var("GOOGLE_FIT_TOKEN_PATH", "/nonexistent/companion-test/token.json");
    std::env::set_var("UPSTREAM_TIMEOUT_SECS", "2");

    let config = CompanionConfig::load().expect("Failed to load config");
    let app = Application::build(config)
        .await
        .expect("Failed to build application");

    let port = app.port();

    tokio::spawn(async move {
        let _ = app.run_until_stopped().await;
    });

    // Wait for server to start
    tokio::time::sleep(Duration::from_millis(100)).await;

    port
}

#[tokio::test]
async fn health_check_returns_ok() {
    let port = spawn_app().await;
    let client = Client::new();

    let response = client
        .get(format!("http://127.0.0.1:{}/health", port))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "companion-service");
}

#[tokio::test]
async fn health_data_degrades_to_empty_without_credentials() {
    let port = spawn_app().await;
    let client = Client::new();

    let response = client
        .get(format!("http://127.0.0.1:{}/api/health_data/7", port))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body, serde_json::json!({"health_data": []}));
}

#[tokio::test]
async fn metrics_endpoint_exposes_request_counters() {
    let port = spawn_app().await;
    let client = Client::new();

    client
        .get(format!("http://127.0.0.1:{}/health", port))
        .send()
        .await
        .expect("Failed to send request");

    let body = client
        .get(format!("http://127.0.0.1:{}/metrics", port))
        .send()
        .await
        .expect("Failed to send request")
        .text()
        .await
        .expect("Failed to read body");

    assert!(body.contains("http_requests_total"));
}

#[tokio::test]
async fn unreachable_ai_provider_is_bad_gateway() {
    let port = spawn_app().await;
    let client = Client::new();

    let response = client
        .post(format!("http://127.0.0.1:{}/api/analyze_symptoms", port))
        .json(&serde_json::json!({"symptoms": ["headache"]}))
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status().as_u16(), 502);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert!(body["detail"].is_string());
}
