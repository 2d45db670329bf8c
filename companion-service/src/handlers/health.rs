use axum::Json;
use serde_json::{json, Value};

/// Liveness probe. The service holds no connections of its own, so being
/// able to answer is the whole check.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "companion-service",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
