//! Chain construction errors.

use thiserror::Error;

use crate::branching::BranchingError;

/// Failure to compose a middleware chain. Fatal at construction.
#[derive(Debug, Error)]
pub enum ChainBuildError {
    #[error("no middleware defined for: {}", .names.join(", "))]
    MissingDescriptor { names: Vec<String> },

    #[error("middleware chain cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("middleware chain expands to more than {limit} links")]
    TooLong { limit: usize },

    #[error("middleware {name:?}: {source}")]
    Middleware {
        name: String,
        #[source]
        source: MiddlewareError,
    },
}

/// A descriptor the factory could not turn into a middleware.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("invalid rate: {0}")]
    InvalidRate(&'static str),

    #[error("{kind} descriptors must be expanded by the chain builder")]
    Unsupported { kind: &'static str },

    #[error("nested branching: {0}")]
    Branching(#[source] Box<BranchingError>),
}
