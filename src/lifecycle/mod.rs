//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     stop()/restart()/signal → trigger → server stops accepting
//!     → in-flight requests drain (bounded) → listener released
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT (Ctrl-C) → CLI stops the running session
//! ```
//!
//! # Design Decisions
//! - One coordinator per proxy server, so a restart never signals the new one
//! - Drain has a deadline: remaining connections are dropped after it

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
