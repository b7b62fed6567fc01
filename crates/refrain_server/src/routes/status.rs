//! Liveness endpoint.

use axum::Json;
use serde_json::{Value, json};
use std::time::Instant;

/// GET /status
pub async fn status() -> Json<Value> {
    let start = Instant::now();

    Json(json!({
        "status_code": 200,
        "response_time": start.elapsed().as_millis() as u64,
    }))
}
