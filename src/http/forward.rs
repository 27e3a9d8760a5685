//! Forwarding of proxied requests to the target origin.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the target (path prefix + path, query kept)
//! - Copy end-to-end headers; the client derives `Host` and framing itself
//! - Relay the target's status, headers and streamed body
//! - Classify failures into gateway errors
//!
//! # Design Decisions
//! - Target certificates are not verified; self-signed local targets must work
//! - Redirects are followed by the client, the final response is relayed
//! - Request bodies are buffered (bounded) so redirects can replay them

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode, Uri},
    response::Response,
};
use http_body_util::LengthLimitError;
use thiserror::Error;
use url::Url;

use crate::config::ServerSettings;
use crate::http::response::is_hop_by_hop;

/// Per-request forwarding failures. Never affect the session.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error("Timed out waiting for target: {0}")]
    Timeout(String),

    #[error("Could not connect to target: {0}")]
    Connect(String),

    #[error("Target request failed: {0}")]
    Upstream(String),
}

impl ForwardError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        let message = error_chain(&err);
        if err.is_timeout() {
            ForwardError::Timeout(message)
        } else if err.is_connect() {
            ForwardError::Connect(message)
        } else {
            ForwardError::Upstream(message)
        }
    }

    /// Status returned to the caller for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ForwardError::BodyRead(_) => StatusCode::BAD_REQUEST,
            ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::Connect(_) | ForwardError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Whether reading a body stopped at the buffering limit. Bodies without a
/// declared length only hit the limit while being read.
fn exceeds_length_limit(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

/// Sends requests to one fixed target origin.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    target: Url,
    max_body_bytes: usize,
}

impl Forwarder {
    pub fn new(target: Url, settings: &ServerSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(settings.max_redirects))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            target,
            max_body_bytes: settings.max_body_bytes,
        })
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Target URL for an inbound request URI.
    ///
    /// The target's own path acts as a prefix; the inbound query string
    /// replaces the target's.
    pub fn target_for(&self, uri: &Uri) -> Url {
        let mut url = self.target.clone();
        let prefix = self.target.path().trim_end_matches('/');
        url.set_path(&format!("{}{}", prefix, uri.path()));
        url.set_query(uri.query());
        url.set_fragment(None);
        url
    }

    /// Forward `request` and relay the target's response.
    pub async fn forward(&self, request: Request<Body>) -> Result<Response, ForwardError> {
        let (parts, body) = request.into_parts();

        let declared_len = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared_len.is_some_and(|len| len > self.max_body_bytes) {
            return Err(ForwardError::BodyTooLarge { limit: self.max_body_bytes });
        }

        let bytes = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| {
                if exceeds_length_limit(&e) {
                    ForwardError::BodyTooLarge { limit: self.max_body_bytes }
                } else {
                    ForwardError::BodyRead(e.to_string())
                }
            })?;

        let mut headers = HeaderMap::with_capacity(parts.headers.len());
        for (name, value) in parts.headers.iter() {
            if name == header::HOST || name == header::CONTENT_LENGTH || is_hop_by_hop(name) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        let url = self.target_for(&parts.uri);
        tracing::debug!(method = %parts.method, url = %url, "Forwarding to target");

        let mut outgoing = self.client.request(parts.method, url).headers(headers);
        if !bytes.is_empty() {
            outgoing = outgoing.body(bytes);
        }
        let upstream = outgoing.send().await.map_err(ForwardError::from_reqwest)?;

        let status = upstream.status();
        let mut relayed_headers = HeaderMap::with_capacity(upstream.headers().len());
        for (name, value) in upstream.headers() {
            if !is_hop_by_hop(name) {
                relayed_headers.append(name.clone(), value.clone());
            }
        }

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = relayed_headers;
        Ok(response)
    }
}
