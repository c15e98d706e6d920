//! Predicate language.
//!
//! # Data Flow
//! ```text
//! Predicate source (config)
//!     → lexer.rs (tokens)
//!     → parser.rs (syntax + operator/field checks)
//!     → accessor.rs (selector → closed field registry)
//!     → Predicate (immutable evaluation plan)
//!
//! Per request:
//!     Predicate::evaluate(&Request)
//!     → evaluator.rs (read fields, compare, short-circuit)
//!     → Ok(bool) | Err(EvaluationError)
//! ```
//!
//! # Design Decisions
//! - Compiled once at construction, shared read-only afterwards
//! - No loops, calls or mutation: cost is linear in expression size
//! - Request bodies are never read
//! - Absent or mistyped fields surface as typed errors, never panics

pub mod accessor;
pub mod ast;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod parser;

use std::fmt;

use axum::http::Request;

pub use error::{CompileError, EvaluationError};

use crate::expression::ast::Expr;

/// Longest accepted predicate source, in bytes.
pub const MAX_SOURCE_LEN: usize = 4096;

/// A compiled boolean expression over request fields.
#[derive(Debug, Clone)]
pub struct Predicate {
    source: String,
    root: Expr,
}

impl Predicate {
    /// Compile `source` into an evaluation plan.
    pub fn compile(source: &str) -> Result<Self, CompileError> {
        if source.len() > MAX_SOURCE_LEN {
            return Err(CompileError::TooLong {
                len: source.len(),
                max: MAX_SOURCE_LEN,
            });
        }
        let tokens = lexer::tokenize(source)?;
        let root = parser::parse(tokens)?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// The source text this predicate was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against a request. The body is not touched.
    pub fn evaluate<B>(&self, req: &Request<B>) -> Result<bool, EvaluationError> {
        self.root.eval(req)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
