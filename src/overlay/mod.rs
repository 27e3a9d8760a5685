//! Header overlay subsystem.
//!
//! # Data Flow
//! ```text
//! form rows / CLI flags / TOML table
//!     → HeaderRow (raw key/value, blanks allowed)
//!     → validate() (trim, pair check, token check, dedupe)
//!     → OverlayHeaders (immutable, shared for the session)
//!     → apply() on every inbound request's HeaderMap
//! ```
//!
//! # Design Decisions
//! - Header names compare case-insensitively (`HeaderName` is lowercase)
//! - A row blank on both sides is a placeholder and is dropped
//! - A row blank on exactly one side is an error, never silently fixed
//! - `apply` only touches the per-request map, so it is safe to call from
//!   any number of concurrent handlers

pub mod headers;

pub use headers::{validate, HeaderError, HeaderRow, OverlayHeaders, PROXY_MARKER_HEADER};
