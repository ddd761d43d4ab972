//! Gateway webhook endpoint.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::info;

use crate::services::correlator::CallbackCorrelator;

#[derive(Clone)]
pub struct CallbackState {
    pub correlator: Arc<CallbackCorrelator>,
}

/// POST /api/payments/mpesa/callback
///
/// The gateway disables integrations that answer slowly or with errors, so
/// this handler acknowledges `200 ok` whatever processing found. Outcomes
/// are observable in logs and the callback audit table.
pub async fn handle_callback(
    State(state): State<CallbackState>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let payload =
        serde_json::from_str::<JsonValue>(&body).unwrap_or_else(|_| json!({ "raw": body }));
    let header_map = headers_to_json(&headers);

    let outcome = state.correlator.process(&payload, &header_map).await;
    info!(outcome = ?outcome, "callback acknowledged");
    (StatusCode::OK, "ok")
}

fn headers_to_json(headers: &HeaderMap) -> JsonValue {
    let map: serde_json::Map<String, JsonValue> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                JsonValue::String(String::from_utf8_lossy(value.as_bytes()).to_string()),
            )
        })
        .collect();
    JsonValue::Object(map)
}
