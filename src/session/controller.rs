//! The proxy session controller.
//!
//! # Responsibilities
//! - Own the single proxy session and its server
//! - Validate requests before any socket is touched
//! - Serialize start/stop/restart so they never overlap
//! - Report every transition as a [`ProxyEvent`] and on the state watch
//!
//! # Transitions
//! ```text
//! Stopped ──start──▶ Starting ──bound──▶ Running
//!                       └──bind error──▶ Error ──▶ Stopped
//! Running ──stop──▶ Stopping ──closed──▶ Stopped
//! Running ──restart──▶ Restarting ──closed, grace, bound──▶ Running
//!                                         └──error──▶ Error ──▶ Stopped
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{validate_request, ProxyRequest, ServerSettings, ValidationError};
use crate::http::{ListeningInfo, ProxyServer, ServerError};
use crate::net::{self, BindError, PortAvailability, PortCheckError, ProcessError};
use crate::observability::metrics;
use crate::session::state::{ProxyEvent, SessionState};

/// Command rejections returned to Rust callers. The same failure is also
/// reported as an `error` status event.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Proxy server is already running")]
    AlreadyRunning,

    #[error("No proxy server is running")]
    NotRunning,

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Snapshot of the running session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: Uuid,
    pub target_url: String,
    pub port: u16,
    pub local_addr: SocketAddr,
    pub proxy_url: String,
    pub header_count: usize,
}

struct ProxySession {
    id: Uuid,
    server: ProxyServer,
    info: ListeningInfo,
}

/// Coordinates the single proxy session.
///
/// Commands take `&self`; they queue on an internal lock so a stop or
/// restart always completes before the next command looks at the session.
pub struct ProxyController {
    settings: ServerSettings,
    session: Mutex<Option<ProxySession>>,
    state: watch::Sender<SessionState>,
    events: mpsc::UnboundedSender<ProxyEvent>,
}

impl ProxyController {
    /// Create an idle controller and the receiving end of its event stream.
    pub fn new(settings: ServerSettings) -> (Self, mpsc::UnboundedReceiver<ProxyEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SessionState::Stopped);
        let controller = Self {
            settings,
            session: Mutex::new(None),
            state,
            events,
        };
        (controller, rx)
    }

    /// Start a session for `request`.
    pub async fn start(&self, request: &ProxyRequest) -> Result<ListeningInfo, ControllerError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            tracing::warn!("Start rejected, a session is already running");
            self.emit(ProxyEvent::status(
                "error",
                ControllerError::AlreadyRunning.to_string(),
                None,
            ));
            return Err(ControllerError::AlreadyRunning);
        }

        let config = match validate_request(request) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Start rejected by validation");
                self.fail(e.to_string());
                return Err(e.into());
            }
        };

        self.transition(SessionState::Starting, "Starting proxy server...", None);
        let started = self.launch(config).await?;
        let info = started.info.clone();
        *session = Some(started);
        Ok(info)
    }

    /// Stop the running session and wait until its port is released.
    pub async fn stop(&self) -> Result<(), ControllerError> {
        let mut session = self.session.lock().await;
        let Some(current) = session.take() else {
            tracing::debug!("Stop requested with no running session");
            self.emit(ProxyEvent::status(
                "error",
                ControllerError::NotRunning.to_string(),
                None,
            ));
            return Err(ControllerError::NotRunning);
        };

        self.transition(SessionState::Stopping, "Stopping proxy server...", None);
        Self::shutdown(current).await;
        self.transition(SessionState::Stopped, "Proxy server stopped", None);
        Ok(())
    }

    /// Replace the running session with one for `request`.
    ///
    /// The request is validated first; when invalid the running session is
    /// left untouched. With no running session this behaves as a start.
    /// Requests in flight on the old session are dropped once the drain
    /// deadline passes.
    pub async fn restart(&self, request: &ProxyRequest) -> Result<ListeningInfo, ControllerError> {
        let mut session = self.session.lock().await;

        let config = match validate_request(request) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Restart rejected by validation");
                if session.is_some() {
                    self.emit(ProxyEvent::status("error", e.to_string(), None));
                } else {
                    self.fail(e.to_string());
                }
                return Err(e.into());
            }
        };

        self.transition(SessionState::Restarting, "Restarting proxy server...", None);
        if let Some(current) = session.take() {
            Self::shutdown(current).await;
            tokio::time::sleep(Duration::from_millis(self.settings.restart_grace_ms)).await;
        }

        let started = self.launch(config).await?;
        let info = started.info.clone();
        *session = Some(started);
        Ok(info)
    }

    /// Forcefully kill `pid`, reported as a `port-check-result` event.
    pub async fn kill_port_process(&self, port: u32, pid: u32) -> Result<(), ProcessError> {
        tracing::info!(port, pid, "Killing process occupying port");
        match net::terminate_process(pid) {
            Ok(()) => {
                self.emit(ProxyEvent::port_check(true, "Process killed successfully"));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(port, pid, error = %e, "Failed to kill process");
                self.emit(ProxyEvent::port_check(false, format!("Failed to kill process: {}", e)));
                Err(e)
            }
        }
    }

    pub async fn check_port_availability(&self, port: u32) -> Result<PortAvailability, PortCheckError> {
        net::check_port_availability(port).await
    }

    pub fn local_ip(&self) -> String {
        net::local_ipv4().to_string()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Details of the running session, if any.
    pub async fn session_info(&self) -> Option<SessionInfo> {
        let session = self.session.lock().await;
        session.as_ref().map(|s| {
            let config = s.server.config();
            SessionInfo {
                id: s.id,
                target_url: config.target_url.to_string(),
                port: config.port,
                local_addr: s.info.local_addr,
                proxy_url: s.info.proxy_url.clone(),
                header_count: config.headers.len(),
            }
        })
    }

    async fn launch(&self, config: crate::config::ProxyConfig) -> Result<ProxySession, ControllerError> {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("session", session_id = %id, port = config.port);
        let mut server = ProxyServer::new(id, Arc::new(config), self.settings.clone());

        match server.start().instrument(span).await {
            Ok(info) => {
                self.transition(
                    SessionState::Running,
                    format!("Proxy server started at {}", info.proxy_url),
                    Some(info.proxy_url.clone()),
                );
                Ok(ProxySession { id, server, info })
            }
            Err(e) => {
                tracing::error!(session_id = %id, error = %e, "Failed to start proxy server");
                self.fail(start_failure_message(&e));
                Err(e.into())
            }
        }
    }

    async fn shutdown(mut session: ProxySession) {
        let span = tracing::info_span!("session", session_id = %session.id);
        session.server.stop().instrument(span).await;
    }

    /// Report a failed start and fall back to `Stopped`. Watchers see the
    /// `Error` state before the reset; no session exists afterwards.
    fn fail(&self, message: String) {
        self.transition(SessionState::Error(message.clone()), message, None);
        self.state.send_replace(SessionState::Stopped);
    }

    fn transition(&self, state: SessionState, message: impl Into<String>, proxy_url: Option<String>) {
        let message = message.into();
        let status = state.as_str();
        tracing::info!(status, message = %message, "Session transition");
        metrics::record_transition(status);
        self.state.send_replace(state);
        self.emit(ProxyEvent::status(status, message, proxy_url));
    }

    fn emit(&self, event: ProxyEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Event receiver dropped");
        }
    }
}

fn start_failure_message(err: &ServerError) -> String {
    match err {
        ServerError::Bind(bind @ BindError::PortInUse { .. }) => bind.to_string(),
        other => format!("Server error: {}", other),
    }
}
