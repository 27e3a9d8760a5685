//! TCP listener binding for the proxy.
//!
//! # Responsibilities
//! - Bind the configured port on all IPv4 interfaces
//! - Classify bind failures so callers can tell a busy port apart

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};

use thiserror::Error;
use tokio::net::TcpListener;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum BindError {
    /// Another socket already owns the port.
    #[error("Port {port} is already in use. Please choose a different port.")]
    PortInUse { port: u16 },

    /// The OS refused the bind (privileged port, sandbox).
    #[error("Permission denied binding port {port}")]
    PermissionDenied { port: u16 },

    /// Any other OS-level failure.
    #[error("Server error on port {port}: {source}")]
    Io {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

impl BindError {
    fn from_io(port: u16, err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::AddrInUse => BindError::PortInUse { port },
            ErrorKind::PermissionDenied => BindError::PermissionDenied { port },
            _ => BindError::Io { port, source: err },
        }
    }
}

/// Address the proxy listens on for `port`.
pub fn listen_addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

/// Bind a listener on `0.0.0.0:port`.
pub async fn bind_listener(port: u16) -> Result<TcpListener, BindError> {
    let listener = TcpListener::bind(listen_addr(port))
        .await
        .map_err(|e| BindError::from_io(port, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| BindError::from_io(port, e))?;

    tracing::info!(address = %local_addr, "Listener bound");
    Ok(listener)
}
