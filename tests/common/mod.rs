//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Bytes,
    http::{HeaderMap, Method, Uri},
    response::Redirect,
    routing::get,
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use header_proxy::config::ServerSettings;
use header_proxy::http::ListeningInfo;
use header_proxy::{ProxyController, ProxyEvent, ProxyRequest};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;

/// Echo app: answers every request with what it received as JSON.
///
/// `label` is returned in every response so tests can tell targets apart.
/// `GET /redirect` answers with a redirect to `/landed`.
fn echo_router(label: &'static str) -> Router {
    Router::new()
        .route("/redirect", get(|| async { Redirect::temporary("/landed") }))
        .fallback(move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| async move {
            let header_json: serde_json::Map<String, Value> = headers
                .keys()
                .map(|name| {
                    let joined = headers
                        .get_all(name)
                        .iter()
                        .map(|v| v.to_str().unwrap_or_default().to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    (name.as_str().to_string(), Value::String(joined))
                })
                .collect();
            Json(json!({
                "target": label,
                "method": method.as_str(),
                "path": uri.path(),
                "query": uri.query(),
                "headers": header_json,
                "body": String::from_utf8_lossy(&body),
            }))
        })
}

/// Start a plain HTTP echo target on an ephemeral port.
pub async fn start_echo_target(label: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = echo_router(label);

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Start an HTTPS echo target using a self-signed certificate for
/// `localhost` / `127.0.0.1`.
pub async fn start_tls_echo_target(label: &'static str) -> SocketAddr {
    let config = RustlsConfig::from_pem(
        include_bytes!("../fixtures/self_signed.crt").to_vec(),
        include_bytes!("../fixtures/self_signed.key").to_vec(),
    )
    .await
    .unwrap();

    let handle = axum_server::Handle::new();
    let server = axum_server::bind_rustls(SocketAddr::from(([127, 0, 0, 1], 0)), config)
        .handle(handle.clone());
    let app = echo_router(label);
    tokio::spawn(async move {
        let _ = server.serve(app.into_make_service()).await;
    });

    handle.listening().await.unwrap()
}

/// A port nothing is listening on right now.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Settings with short delays so lifecycle tests stay fast.
pub fn test_settings() -> ServerSettings {
    ServerSettings {
        connect_timeout_secs: 2,
        request_timeout_secs: 5,
        restart_grace_ms: 100,
        shutdown_drain_ms: 500,
        ..ServerSettings::default()
    }
}

/// Client that never goes through an environment proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

pub struct RunningProxy {
    pub controller: ProxyController,
    pub events: UnboundedReceiver<ProxyEvent>,
    pub info: ListeningInfo,
    pub port: u16,
}

impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }
}

/// Start a controller-owned session in front of `target`.
pub async fn start_proxy(target: &str, headers: &[(&str, &str)]) -> RunningProxy {
    start_proxy_with(test_settings(), target, headers).await
}

pub async fn start_proxy_with(
    settings: ServerSettings,
    target: &str,
    headers: &[(&str, &str)],
) -> RunningProxy {
    let port = free_port();
    let (controller, events) = ProxyController::new(settings);
    let request = ProxyRequest::new(target, port as u32, headers.iter().copied());
    let info = controller.start(&request).await.unwrap();
    RunningProxy {
        controller,
        events,
        info,
        port,
    }
}

/// Drain all events currently queued.
pub fn drain_events(events: &mut UnboundedReceiver<ProxyEvent>) -> Vec<ProxyEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Status names of the queued `proxy-status` events, in order.
pub fn statuses(events: &mut UnboundedReceiver<ProxyEvent>) -> Vec<&'static str> {
    drain_events(events)
        .into_iter()
        .filter_map(|e| match e {
            ProxyEvent::Status(s) => Some(s.status),
            ProxyEvent::PortCheck(_) => None,
        })
        .collect()
}
