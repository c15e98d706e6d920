//! Middleware construction seam.

use crate::chain::error::MiddlewareError;
use crate::chain::handler::BoxHandler;
use crate::config::schema::MiddlewareConfig;

/// Turns a named descriptor into a middleware wrapping `next`.
///
/// The chain builder calls this once per link, innermost first. It never
/// sees `chain` descriptors; those are expanded by the builder.
pub trait MiddlewareFactory: Send + Sync {
    fn create(
        &self,
        name: &str,
        config: &MiddlewareConfig,
        next: BoxHandler,
    ) -> Result<BoxHandler, MiddlewareError>;
}
