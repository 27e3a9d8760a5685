//! Header overlay reverse proxy library.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod overlay;
pub mod session;

pub use config::{ProxyConfig, ProxyRequest, ServerSettings};
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
pub use overlay::{HeaderRow, OverlayHeaders};
pub use session::{ProxyController, ProxyEvent, SessionState};
