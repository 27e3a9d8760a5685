//! Proxy session subsystem.
//!
//! # Data Flow
//! ```text
//! Caller command (start / stop / restart / kill-port)
//!     → controller.rs (validate, serialize, own the session)
//!     → http::ProxyServer (bind, serve, drain)
//!     → state.rs (SessionState watch + ProxyEvent stream back to the caller)
//! ```

pub mod controller;
pub mod state;

pub use controller::{ControllerError, ProxyController, SessionInfo};
pub use state::{PortCheckEvent, ProxyEvent, SessionState, StatusEvent};
