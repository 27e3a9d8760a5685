//! Session states and the events reported to the caller.

use serde::Serialize;

/// Where the single proxy session currently is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Restarting,
    Error(String),
}

impl SessionState {
    /// Status name as reported in `proxy-status` events.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Stopped => "stopped",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Restarting => "restarting",
            SessionState::Error(_) => "error",
        }
    }

    /// No session exists and a `start` would be accepted.
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Error(_))
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Error(message) => write!(f, "error: {}", message),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Payload of a `proxy-status` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
}

/// Payload of a `port-check-result` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortCheckEvent {
    pub success: bool,
    pub message: String,
}

/// Event emitted to the caller after every transition or port action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum ProxyEvent {
    #[serde(rename = "proxy-status")]
    Status(StatusEvent),

    #[serde(rename = "port-check-result")]
    PortCheck(PortCheckEvent),
}

impl ProxyEvent {
    pub fn status(status: &'static str, message: impl Into<String>, proxy_url: Option<String>) -> Self {
        ProxyEvent::Status(StatusEvent {
            status,
            message: message.into(),
            proxy_url,
        })
    }

    pub fn port_check(success: bool, message: impl Into<String>) -> Self {
        ProxyEvent::PortCheck(PortCheckEvent {
            success,
            message: message.into(),
        })
    }
}
