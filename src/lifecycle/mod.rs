//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → server stops accepting → drain → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Startup is ordered in main: config, logging, metrics, handler stack,
//!   listener
//! - A handler stack that fails to build never binds a listener

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
