//! Evaluation of a compiled [`Expr`] against a request.
//!
//! # Design Decisions
//! - `and`/`or` short-circuit left to right; a skipped operand cannot fail
//! - Text fields compared with numbers or booleans are converted strictly
//! - `is empty` treats absent fields as empty instead of failing

use std::cmp::Ordering;

use axum::http::Request;

use crate::expression::accessor::{Accessor, FieldValue};
use crate::expression::ast::{CompareOp, Expr, Literal};
use crate::expression::error::EvaluationError;

impl Expr {
    /// Evaluate this expression against `req`.
    pub fn eval<B>(&self, req: &Request<B>) -> Result<bool, EvaluationError> {
        match self {
            Expr::Const(value) => Ok(*value),
            Expr::And(lhs, rhs) => Ok(lhs.eval(req)? && rhs.eval(req)?),
            Expr::Or(lhs, rhs) => Ok(lhs.eval(req)? || rhs.eval(req)?),
            Expr::Not(inner) => inner.eval(req).map(|value| !value),
            Expr::Compare { field, op, literal } => {
                let value = field.read(req)?;
                compare(field, &value, *op, literal)
            }
            Expr::Contains {
                field,
                needle,
                negated,
            } => {
                let found = match field.read(req)? {
                    FieldValue::Text(text) => text.contains(needle.as_str()),
                    FieldValue::List(values) => values.iter().any(|v| v == needle),
                    FieldValue::Number(n) => return Err(mismatch(field, "text or list", n)),
                };
                Ok(found != *negated)
            }
            Expr::Matches {
                field,
                pattern,
                negated,
            } => match field.read(req)? {
                FieldValue::Text(text) => Ok(pattern.is_match(&text) != *negated),
                FieldValue::List(values) => Err(mismatch(field, "single value", values.join(","))),
                FieldValue::Number(n) => Err(mismatch(field, "text", n)),
            },
            Expr::IsEmpty { field, negated } => {
                let empty = match field.read(req) {
                    Ok(FieldValue::Text(text)) => text.is_empty(),
                    Ok(FieldValue::List(values)) => values.is_empty(),
                    Ok(FieldValue::Number(_)) => false,
                    Err(EvaluationError::MissingField { .. })
                    | Err(EvaluationError::IndexOutOfRange { .. }) => true,
                    Err(other) => return Err(other),
                };
                Ok(empty != *negated)
            }
        }
    }
}

fn compare(
    field: &Accessor,
    value: &FieldValue<'_>,
    op: CompareOp,
    literal: &Literal,
) -> Result<bool, EvaluationError> {
    let ordering = match (value, literal) {
        (FieldValue::Text(text), Literal::Str(expected)) => (**text).cmp(expected.as_str()),
        (FieldValue::Text(text), Literal::Number(expected)) => {
            let actual = text
                .trim()
                .parse::<f64>()
                .map_err(|_| mismatch(field, "number", text))?;
            return Ok(compare_numbers(actual, *expected, op));
        }
        (FieldValue::Text(text), Literal::Bool(expected)) => {
            let actual = parse_bool(text).ok_or_else(|| mismatch(field, "boolean", text))?;
            actual.cmp(expected)
        }
        (FieldValue::Number(actual), Literal::Number(expected)) => {
            return Ok(compare_numbers(*actual, *expected, op));
        }
        (FieldValue::Number(_), _) => return Err(mismatch(field, "number", literal)),
        (FieldValue::List(values), _) => {
            return Err(mismatch(field, "single value", values.join(",")))
        }
    };
    Ok(holds(ordering, op))
}

fn holds(ordering: Ordering, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    }
}

/// Exact IEEE comparison; a field and a literal written the same way parse
/// to the same value.
fn compare_numbers(actual: f64, expected: f64, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => actual == expected,
        CompareOp::Ne => actual != expected,
        CompareOp::Lt => actual < expected,
        CompareOp::Le => actual <= expected,
        CompareOp::Gt => actual > expected,
        CompareOp::Ge => actual >= expected,
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn mismatch(field: &Accessor, expected: &'static str, found: impl ToString) -> EvaluationError {
    EvaluationError::TypeMismatch {
        field: field.to_string(),
        expected,
        found: found.to_string(),
    }
}
