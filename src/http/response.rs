//! Response helpers shared by forwarding and diagnostics.
//!
//! # Responsibilities
//! - Decide which headers are connection-scoped and must not be relayed
//! - Render the error page returned when the target can't be reached
//! - Render header maps as JSON for the diagnostic routes

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use url::Url;

/// Connection-scoped headers, never copied between hops.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// HTML error page naming the target and the underlying failure.
pub fn proxy_error_page(status: StatusCode, target: &Url, message: &str) -> Response {
    let html = format!(
        "<h1>Proxy Error</h1>\n\
         <p>Error connecting to target: {}</p>\n\
         <p>{}</p>\n\
         <p>Check if the target URL is correct and accessible.</p>\n",
        escape_html(target.as_str()),
        escape_html(message),
    );

    let mut response = Response::new(Body::from(html));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

/// Header map as a JSON object; repeated headers are joined with `, `.
pub fn headers_to_json(headers: &HeaderMap) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        map.insert(name.as_str().to_string(), serde_json::Value::String(joined));
    }
    serde_json::Value::Object(map)
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
