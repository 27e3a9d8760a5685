//! Proxy-local diagnostic routes. These never contact the target.

use std::time::Instant;

use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::http::response::headers_to_json;
use crate::http::server::AppState;
use crate::observability::metrics;

pub const HEALTH_PATH: &str = "/__proxy_health";
pub const TEST_HEADERS_PATH: &str = "/__test_headers";

/// `GET /__proxy_health`
pub async fn proxy_health(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let start = Instant::now();
    let body = json!({
        "status": "ok",
        "target": state.config.target_url.as_str(),
        "headerCount": state.config.headers.len(),
        "configuredHeaders": state.config.headers.to_json(),
        "requestHeaders": headers_to_json(&headers),
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    });
    metrics::record_request("GET", 200, "diagnostic", start);
    Json(body)
}

/// `GET /__test_headers`
///
/// `forwardedHeaders` maps each configured display name to the value the
/// request carries after the overlay, or `null` when absent.
pub async fn test_headers(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let start = Instant::now();
    let forwarded: serde_json::Map<String, Value> = state
        .config
        .headers
        .iter()
        .map(|(display, _)| {
            let value = headers
                .get(display)
                .map(|v| Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()))
                .unwrap_or(Value::Null);
            (display.to_string(), value)
        })
        .collect();

    let body = json!({
        "received": true,
        "headers": headers_to_json(&headers),
        "forwardedHeaders": forwarded,
    });
    metrics::record_request("GET", 200, "diagnostic", start);
    Json(body)
}
