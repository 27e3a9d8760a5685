//! Start-request validation.
//!
//! # Responsibilities
//! - Check the target URL is absolute and forwardable (http/https with host)
//! - Check the port range
//! - Delegate header rows to the overlay engine
//!
//! # Design Decisions
//! - Pure function: ProxyRequest → Result<ProxyConfig, ValidationError>
//! - Runs before any socket is touched
//! - First failure wins; the caller shows one message at a time

use thiserror::Error;
use url::Url;

use crate::config::schema::{ProxyConfig, ProxyRequest};
use crate::overlay::{self, HeaderError};

/// Rejections raised before a session is created.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Target URL is required")]
    MissingTargetUrl,

    #[error("Please enter a valid URL (e.g., https://example.com): {reason}")]
    InvalidTargetUrl { url: String, reason: String },

    #[error("Target URL must be an http(s) URL with a host: {0}")]
    UnsupportedTarget(String),

    #[error("Invalid port number {0}. Please enter a valid port between 1-65535.")]
    InvalidPort(u32),

    #[error(transparent)]
    Header(#[from] HeaderError),
}

/// Validate a raw request into an immutable session config.
pub fn validate_request(request: &ProxyRequest) -> Result<ProxyConfig, ValidationError> {
    let target_url = parse_target(&request.target_url)?;
    let port = validate_port(request.port)?;
    let headers = overlay::validate(request.headers.iter().cloned())?;

    Ok(ProxyConfig {
        target_url,
        port,
        headers,
    })
}

/// Accept ports 1–65535.
pub fn validate_port(port: u32) -> Result<u16, ValidationError> {
    match u16::try_from(port) {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(ValidationError::InvalidPort(port)),
    }
}

fn parse_target(raw: &str) -> Result<Url, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::MissingTargetUrl);
    }

    let url = Url::parse(raw).map_err(|e| ValidationError::InvalidTargetUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    let forwardable = matches!(url.scheme(), "http" | "https")
        && url.host_str().is_some_and(|h| !h.is_empty());
    if !forwardable {
        return Err(ValidationError::UnsupportedTarget(raw.to_string()));
    }

    Ok(url)
}
