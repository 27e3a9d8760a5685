//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Start request
//!     → port_check.rs (optional: is the port free? who owns it?)
//!     → listener.rs (bind 0.0.0.0:port, classify failures)
//!     → local_ip.rs (LAN address for the reported proxy URL)
//!     → Hand the bound listener to the HTTP layer
//! ```
//!
//! # Design Decisions
//! - Port checks only inform the caller; a start is never blocked on them
//! - Killing a port owner is an explicit user action, never automatic

pub mod listener;
pub mod local_ip;
pub mod port_check;

pub use listener::{bind_listener, listen_addr, BindError};
pub use local_ip::{local_ipv4, proxy_url};
pub use port_check::{
    check_port_availability, find_owning_process, is_port_free, terminate_process, PortAvailability,
    PortCheckError, ProcessError, ProcessInfo,
};
