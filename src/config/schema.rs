//! Configuration schema definitions.
//!
//! Two layers live here: the raw [`ProxyRequest`] exactly as a user entered
//! it, and the validated [`ProxyConfig`] a session runs with. Runtime knobs
//! that are not part of a start command sit in [`ServerSettings`] and
//! [`ObservabilityConfig`].

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::overlay::{HeaderRow, OverlayHeaders};

/// Root of the TOML configuration file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Start parameters for the proxy session.
    pub proxy: ProxyRequest,

    /// Forwarding and lifecycle settings.
    pub server: ServerSettings,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Unvalidated start/restart parameters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProxyRequest {
    /// Target origin, e.g. `https://example.com`.
    pub target_url: String,

    /// Local port to listen on (checked against 1–65535 on validation).
    pub port: u32,

    /// Header rows, in the order given. In TOML this is a table.
    #[serde(deserialize_with = "header_table", serialize_with = "header_table_out")]
    pub headers: Vec<HeaderRow>,
}

impl Default for ProxyRequest {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            port: 8080,
            headers: Vec::new(),
        }
    }
}

impl ProxyRequest {
    /// Build a request from a target, a port and any key/value mapping.
    pub fn new<I, R>(target_url: impl Into<String>, port: u32, headers: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<HeaderRow>,
    {
        Self {
            target_url: target_url.into(),
            port,
            headers: headers.into_iter().map(Into::into).collect(),
        }
    }
}

fn header_table<'de, D>(deserializer: D) -> Result<Vec<HeaderRow>, D::Error>
where
    D: Deserializer<'de>,
{
    let table = IndexMap::<String, String>::deserialize(deserializer)?;
    Ok(table.into_iter().map(HeaderRow::from).collect())
}

#[allow(clippy::ptr_arg)]
fn header_table_out<S>(rows: &Vec<HeaderRow>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let table: IndexMap<&str, &str> = rows
        .iter()
        .map(|r| (r.key.as_str(), r.value.as_str()))
        .collect();
    table.serialize(serializer)
}

/// Validated session configuration. Immutable while a session runs.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub target_url: Url,
    pub port: u16,
    pub headers: OverlayHeaders,
}

/// Forwarding and lifecycle settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Connect timeout towards the target, in seconds.
    pub connect_timeout_secs: u64,

    /// Whole-request timeout towards the target, in seconds.
    pub request_timeout_secs: u64,

    /// Redirects followed before the last response is relayed.
    pub max_redirects: usize,

    /// Largest request body buffered for forwarding.
    pub max_body_bytes: usize,

    /// Pause between releasing the old listener and binding the new one.
    pub restart_grace_ms: u64,

    /// How long in-flight requests may drain on stop before being dropped.
    pub shutdown_drain_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            request_timeout_secs: 60,
            max_redirects: 10,
            max_body_bytes: 10 * 1024 * 1024, // 10MB
            restart_grace_ms: 500,
            shutdown_drain_ms: 2000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Prometheus scrape address; metrics are only exported when set.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "header_proxy=info,tower_http=info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_address: None,
        }
    }
}
