//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Create the Axum router: diagnostic routes plus catch-all forwarding
//! - Wire up middleware (request ID, tracing, CORS, header overlay)
//! - Bind the listener and serve until stopped
//! - Stop with a bounded drain, then release the socket
//!
//! # States
//! ```text
//! Created ──start() ok──▶ Listening ──stop()──▶ Closed
//!    │                                            ▲
//!    ├── start() bind error: stays Created        │
//!    └────────────────────stop()──────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware as axum_middleware,
    response::Response,
    routing::get,
    Router,
};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::config::{ProxyConfig, ServerSettings};
use crate::http::diagnostics::{self, HEALTH_PATH, TEST_HEADERS_PATH};
use crate::http::forward::Forwarder;
use crate::http::middleware::{cors, overlay_headers, CorsHeaders};
use crate::http::response::proxy_error_page;
use crate::lifecycle::Shutdown;
use crate::net::{bind_listener, proxy_url, BindError};
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub session_id: Uuid,
    pub config: Arc<ProxyConfig>,
    pub forwarder: Forwarder,
    pub cors: Arc<CorsHeaders>,
}

/// Lifecycle of one proxy server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Created,
    Listening,
    Closed,
}

/// Where a started server can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningInfo {
    /// Socket address actually bound (`0.0.0.0:port`).
    pub local_addr: SocketAddr,
    /// URL reachable from other devices on the LAN.
    pub proxy_url: String,
}

/// Failures starting a server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("Invalid target URL: {0}")]
    InvalidTarget(String),

    #[error("Failed to build forwarding client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Server cannot start from state {0:?}")]
    NotStartable(ServerState),
}

struct RunningServer {
    shutdown: Shutdown,
    task: JoinHandle<std::io::Result<()>>,
    info: ListeningInfo,
}

/// Reverse proxy server for one session.
pub struct ProxyServer {
    id: Uuid,
    config: Arc<ProxyConfig>,
    settings: ServerSettings,
    state: ServerState,
    running: Option<RunningServer>,
}

impl ProxyServer {
    /// Create a server in the `Created` state. Nothing is bound yet.
    pub fn new(id: Uuid, config: Arc<ProxyConfig>, settings: ServerSettings) -> Self {
        Self {
            id,
            config,
            settings,
            state: ServerState::Created,
            running: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn config(&self) -> &Arc<ProxyConfig> {
        &self.config
    }

    /// Listening details while `Listening`.
    pub fn info(&self) -> Option<&ListeningInfo> {
        self.running.as_ref().map(|r| &r.info)
    }

    /// Bind the port and start serving.
    pub async fn start(&mut self) -> Result<ListeningInfo, ServerError> {
        if self.state != ServerState::Created {
            return Err(ServerError::NotStartable(self.state));
        }

        let target = &self.config.target_url;
        if target.cannot_be_a_base() || target.host_str().is_none() {
            return Err(ServerError::InvalidTarget(target.to_string()));
        }

        let forwarder = Forwarder::new(target.clone(), &self.settings).map_err(ServerError::Client)?;
        let state = AppState {
            session_id: self.id,
            config: self.config.clone(),
            forwarder,
            cors: Arc::new(CorsHeaders::for_overlay(&self.config.headers)),
        };

        let port = self.config.port;
        let listener = bind_listener(port).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| BindError::Io { port, source })?;

        let router = build_router(state);
        let shutdown = Shutdown::new();
        let signal = shutdown.signalled();
        let session_id = self.id;
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await;
            tracing::info!(session_id = %session_id, "HTTP server stopped");
            result
        });

        let info = ListeningInfo {
            local_addr,
            proxy_url: proxy_url(local_addr.port()),
        };
        tracing::info!(
            session_id = %self.id,
            address = %local_addr,
            proxy_url = %info.proxy_url,
            target = %self.config.target_url,
            header_count = self.config.headers.len(),
            "Proxy server listening"
        );

        self.running = Some(RunningServer {
            shutdown,
            task,
            info: info.clone(),
        });
        self.state = ServerState::Listening;
        Ok(info)
    }

    /// Stop accepting, let in-flight requests drain, release the socket.
    ///
    /// Requests still running after `shutdown_drain_ms` are dropped. Calling
    /// this on a closed server does nothing.
    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.shutdown.trigger();
            let drain = Duration::from_millis(self.settings.shutdown_drain_ms);
            let mut task = running.task;

            match tokio::time::timeout(drain, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => tracing::warn!(session_id = %self.id, error = %e, "Server exited with error"),
                Ok(Err(e)) => tracing::warn!(session_id = %self.id, error = %e, "Server task failed"),
                Err(_) => {
                    tracing::warn!(
                        session_id = %self.id,
                        drain_ms = self.settings.shutdown_drain_ms,
                        "Drain deadline passed, dropping remaining connections"
                    );
                    task.abort();
                    let _ = task.await;
                }
            }
        }
        self.state = ServerState::Closed;
    }
}

impl Drop for ProxyServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.shutdown.trigger();
            running.task.abort();
        }
    }
}

/// Build the Axum router with all middleware layers.
fn build_router(state: AppState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(diagnostics::proxy_health).fallback(forward_handler))
        .route(TEST_HEADERS_PATH, get(diagnostics::test_headers).fallback(forward_handler))
        .fallback(forward_handler)
        .layer(axum_middleware::from_fn_with_state(state.clone(), overlay_headers))
        .layer(axum_middleware::from_fn_with_state(state.clone(), cors))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

/// Catch-all handler: forward to the target, map failures to gateway errors.
async fn forward_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    match state.forwarder.forward(request).await {
        Ok(response) => {
            let status = response.status();
            tracing::debug!(
                session_id = %state.session_id,
                method = %method,
                path = %path,
                status = %status,
                "Relayed target response"
            );
            metrics::record_request(&method, status.as_u16(), "forwarded", start);
            response
        }
        Err(e) => {
            let status = e.status();
            tracing::warn!(
                session_id = %state.session_id,
                method = %method,
                path = %path,
                target = %state.forwarder.target(),
                error = %e,
                "Forwarding failed"
            );
            metrics::record_request(&method, status.as_u16(), "error", start);
            proxy_error_page(status, state.forwarder.target(), &e.to_string())
        }
    }
}
