//! Per-request middleware: header overlay and CORS.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::server::AppState;
use crate::overlay::OverlayHeaders;

const BASE_ALLOWED_HEADERS: &[&str] = &[
    "Content-Type",
    "Authorization",
    "X-Requested-With",
    "X-Custom-Header-Proxy",
];
const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS, PATCH";

/// Apply the session's header overlay to the inbound request.
///
/// Runs before routing, so both forwarding and the diagnostic routes see
/// the overlaid header set.
pub async fn overlay_headers(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    state.config.headers.apply(request.headers_mut());
    next.run(request).await
}

/// Permissive CORS headers for every response, preflight answered locally.
pub async fn cors(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    let preflight = request.method() == Method::OPTIONS
        && request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);

    let mut response = if preflight {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };
    state.cors.decorate(response.headers_mut());
    response
}

/// Precomputed CORS header values for one session.
#[derive(Debug, Clone)]
pub struct CorsHeaders {
    allow_headers: HeaderValue,
}

impl CorsHeaders {
    /// Allow the base header list plus every configured overlay name.
    pub fn for_overlay(overlay: &OverlayHeaders) -> Self {
        let mut names: Vec<&str> = BASE_ALLOWED_HEADERS.to_vec();
        for name in overlay.display_names() {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name);
            }
        }

        let allow_headers = HeaderValue::from_str(&names.join(", "))
            .unwrap_or_else(|_| HeaderValue::from_static("*"));
        Self { allow_headers }
    }

    pub fn decorate(&self, headers: &mut HeaderMap) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
        headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, HeaderValue::from_static("*"));
    }
}
