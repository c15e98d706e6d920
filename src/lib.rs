//! Conditional branching router.
//!
//! A compiled request predicate selects, per request, between an alternate
//! middleware chain and the default continuation. Evaluation failures fall
//! back to the default continuation.

// Core
pub mod branching;
pub mod chain;
pub mod expression;
pub mod middleware;

// Gateway
pub mod config;
pub mod http;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use branching::{Branching, BranchingError, Decision};
pub use chain::{handler_fn, BoxHandler, ChainBuilder, MiddlewareFactory};
pub use config::GatewayConfig;
pub use expression::Predicate;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use middleware::BuiltinMiddlewares;
