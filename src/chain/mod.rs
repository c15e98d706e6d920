//! Middleware chain composition.
//!
//! # Data Flow
//! ```text
//! ordered names + descriptor table
//!     → builder.rs (validate names, expand nested chains, detect cycles)
//!     → factory.rs (descriptor + next handler → middleware)
//!     → BoxHandler (outermost middleware, ends at the terminal)
//! ```
//!
//! # Design Decisions
//! - Every name is checked before anything is constructed
//! - Composition folds right-to-left so the first name sees the request first
//! - The composed handler has the same call contract as the terminal

pub mod builder;
pub mod error;
pub mod factory;
pub mod handler;

pub use builder::ChainBuilder;
pub use error::{ChainBuildError, MiddlewareError};
pub use factory::MiddlewareFactory;
pub use handler::{handler_fn, BoxHandler};
