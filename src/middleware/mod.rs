//! Built-in middlewares.
//!
//! Every middleware is a tower `Service` holding the next handler. Config is
//! validated when the middleware is created; the request path only reads it.

pub mod headers;
pub mod path;
pub mod rate_limit;

use crate::branching::Branching;
use crate::chain::{BoxHandler, MiddlewareError, MiddlewareFactory};
use crate::config::schema::MiddlewareConfig;

pub use headers::Headers;
pub use path::{AddPrefix, ReplacePath, StripPrefix};
pub use rate_limit::RateLimit;

/// Factory for the middleware kinds that can appear in configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinMiddlewares;

impl MiddlewareFactory for BuiltinMiddlewares {
    fn create(
        &self,
        name: &str,
        config: &MiddlewareConfig,
        next: BoxHandler,
    ) -> Result<BoxHandler, MiddlewareError> {
        match config {
            MiddlewareConfig::Headers(cfg) => Headers::new(cfg, next).map(BoxHandler::new),
            MiddlewareConfig::StripPrefix(cfg) => StripPrefix::new(cfg, next).map(BoxHandler::new),
            MiddlewareConfig::AddPrefix(cfg) => AddPrefix::new(cfg, next).map(BoxHandler::new),
            MiddlewareConfig::ReplacePath(cfg) => ReplacePath::new(cfg, next).map(BoxHandler::new),
            MiddlewareConfig::RateLimit(cfg) => RateLimit::new(name, cfg, next).map(BoxHandler::new),
            MiddlewareConfig::Branching(spec) => Branching::new(name, spec, next, self)
                .map(Branching::into_handler)
                .map_err(|e| MiddlewareError::Branching(Box::new(e))),
            MiddlewareConfig::Chain(_) => Err(MiddlewareError::Unsupported { kind: config.kind() }),
        }
    }
}
