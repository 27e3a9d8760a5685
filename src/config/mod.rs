//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! CLI flags / TOML file / controller caller
//!     → loader.rs (parse & deserialize, file only)
//!     → ProxyRequest (raw user input)
//!     → validation.rs (URL, port, header rows)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc with the running proxy server
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → caller issues restart(new ProxyRequest)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a session runs; changes require a restart
//! - All file fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{AppConfig, LogFormat, ObservabilityConfig, ProxyConfig, ProxyRequest, ServerSettings};
pub use validation::{validate_port, validate_request, ValidationError};
pub use watcher::ConfigWatcher;
