//! Port occupancy checks and owner termination.
//!
//! # Responsibilities
//! - Tell whether a TCP port is free on all local interfaces
//! - Identify the process listening on a busy port (best effort)
//! - Forcefully terminate a process on explicit user request
//!
//! # Design Decisions
//! - Checks never leave a socket behind: the test listener or stream is
//!   dropped before returning
//! - Owner lookup failing is not an error, it just yields `None`
//! - Socket and process tables are read on the blocking pool
//! - Termination is never triggered by the proxy itself

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use netstat2::{iterate_sockets_info, AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo, TcpState};
use serde::Serialize;
use sysinfo::{Pid, System};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use crate::config::validate_port;

const CONNECT_CHECK_TIMEOUT: Duration = Duration::from_millis(500);

/// Process found listening on a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub command_line: String,
}

/// Outcome of a single availability check. Never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortAvailability {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupying_process: Option<ProcessInfo>,
}

/// Port check errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortCheckError {
    #[error("Invalid port number")]
    InvalidPort(u32),
}

/// Termination failures.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Permission denied killing process {0}")]
    PermissionDenied(u32),

    #[error("No such process {0}")]
    NoSuchProcess(u32),

    #[error("Refusing to kill process {0}")]
    Refused(u32),

    #[error("Failed to kill process {pid}: {message}")]
    Os { pid: u32, message: String },
}

/// Whether nothing is bound to `port` on any local IPv4 interface.
pub async fn is_port_free(port: u16) -> bool {
    match TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await {
        Ok(listener) => {
            drop(listener);
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => false,
        Err(e) => {
            // Bind refused for another reason (privileged port); ask whoever
            // may be listening instead.
            tracing::debug!(port, error = %e, "Bind check failed, falling back to a connect check");
            !connect_check(port).await
        }
    }
}

async fn connect_check(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    matches!(
        tokio::time::timeout(CONNECT_CHECK_TIMEOUT, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Look up the process listening on `port`.
pub async fn find_owning_process(port: u16) -> Option<ProcessInfo> {
    match tokio::task::spawn_blocking(move || lookup_owner(port)).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(port, error = %e, "Process lookup task failed");
            None
        }
    }
}

fn lookup_owner(port: u16) -> Option<ProcessInfo> {
    let af = AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6;
    let sockets = match iterate_sockets_info(af, ProtocolFlags::TCP) {
        Ok(sockets) => sockets,
        Err(e) => {
            tracing::debug!(port, error = %e, "Socket table unavailable");
            return None;
        }
    };

    let pid = sockets
        .filter_map(Result::ok)
        .filter(|info| match &info.protocol_socket_info {
            ProtocolSocketInfo::Tcp(tcp) => tcp.local_port == port && matches!(tcp.state, TcpState::Listen),
            ProtocolSocketInfo::Udp(_) => false,
        })
        .find_map(|info| info.associated_pids.first().copied())?;

    let mut sys = System::new();
    sys.refresh_processes();
    let info = match sys.process(Pid::from_u32(pid)) {
        Some(process) => ProcessInfo {
            pid,
            name: process.name().to_string(),
            command_line: process.cmd().join(" "),
        },
        None => ProcessInfo {
            pid,
            name: "?".to_string(),
            command_line: String::new(),
        },
    };
    Some(info)
}

/// Check `port` and, when busy, try to name its owner.
pub async fn check_port_availability(port: u32) -> Result<PortAvailability, PortCheckError> {
    let port = validate_port(port).map_err(|_| PortCheckError::InvalidPort(port))?;

    if is_port_free(port).await {
        return Ok(PortAvailability {
            available: true,
            occupying_process: None,
        });
    }

    let occupying_process = find_owning_process(port).await;
    tracing::debug!(port, owner = ?occupying_process, "Port is occupied");
    Ok(PortAvailability {
        available: false,
        occupying_process,
    })
}

/// Forcefully terminate `pid`. Irreversible.
pub fn terminate_process(pid: u32) -> Result<(), ProcessError> {
    if pid == 0 || pid == std::process::id() {
        return Err(ProcessError::Refused(pid));
    }
    tracing::warn!(pid, "Terminating process");
    kill(pid)
}

#[cfg(unix)]
fn kill(pid: u32) -> Result<(), ProcessError> {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};

    let raw = i32::try_from(pid).map_err(|_| ProcessError::NoSuchProcess(pid))?;
    signal::kill(nix::unistd::Pid::from_raw(raw), Signal::SIGKILL).map_err(|errno| match errno {
        Errno::EPERM => ProcessError::PermissionDenied(pid),
        Errno::ESRCH => ProcessError::NoSuchProcess(pid),
        other => ProcessError::Os {
            pid,
            message: other.desc().to_string(),
        },
    })
}

#[cfg(not(unix))]
fn kill(pid: u32) -> Result<(), ProcessError> {
    let mut sys = System::new();
    sys.refresh_processes();
    match sys.process(Pid::from_u32(pid)) {
        Some(process) if process.kill() => Ok(()),
        Some(_) => Err(ProcessError::PermissionDenied(pid)),
        None => Err(ProcessError::NoSuchProcess(pid)),
    }
}
