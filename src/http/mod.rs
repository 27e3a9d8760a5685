//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (bound by net::listener)
//!     → server.rs (Axum setup, request ID, trace span)
//!     → middleware.rs (CORS wrapper, header overlay)
//!     → diagnostics.rs (/__proxy_health, /__test_headers)
//!       or forward.rs (send to target, relay response)
//!     → response.rs (error page on forwarding failure)
//!     → Send to client
//! ```

pub mod diagnostics;
pub mod forward;
pub mod middleware;
pub mod response;
pub mod server;

pub use forward::{ForwardError, Forwarder};
pub use server::{ListeningInfo, ProxyServer, ServerError, ServerState};
