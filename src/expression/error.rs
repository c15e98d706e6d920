//! Predicate compile and evaluation errors.

use thiserror::Error;

/// Errors raised while compiling predicate source text.
///
/// Positions are byte offsets into the source.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// The source contains no expression.
    #[error("empty expression")]
    Empty,

    /// The source exceeds the accepted length.
    #[error("expression is {len} bytes long, limit is {max}")]
    TooLong { len: usize, max: usize },

    /// A character that cannot start any token.
    #[error("unexpected character {found:?} at {pos}")]
    UnexpectedChar { found: char, pos: usize },

    /// A string literal without its closing quote.
    #[error("unterminated string starting at {pos}")]
    UnterminatedString { pos: usize },

    /// An escape sequence not supported in double-quoted strings.
    #[error("invalid escape sequence \\{found} at {pos}")]
    InvalidEscape { found: char, pos: usize },

    /// A numeric literal that does not parse.
    #[error("invalid number {text:?} at {pos}")]
    InvalidNumber { text: String, pos: usize },

    /// The parser expected something else at this point.
    #[error("expected {expected} at {pos}, found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
        pos: usize,
    },

    /// Parentheses or negations nested past the depth limit.
    #[error("expression nests deeper than {max} levels")]
    TooDeep { max: usize },

    /// A selector that is not part of the request field registry.
    #[error("unknown field {selector:?}")]
    UnknownField { selector: String },

    /// A header key that is not a valid HTTP header name.
    #[error("invalid header name {name:?}")]
    InvalidHeaderName { name: String },

    /// An operator applied to a field kind or literal it does not support.
    #[error("operator {operator} is not supported on {field} ({reason})")]
    UnsupportedOperator {
        operator: String,
        field: String,
        reason: &'static str,
    },

    /// A `matches` pattern the regex engine rejects.
    #[error("invalid regular expression {pattern:?}: {message}")]
    InvalidRegex { pattern: String, message: String },
}

/// Errors raised while evaluating a compiled predicate against a request.
///
/// Every variant names the field in canonical selector form.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    /// The request does not carry the referenced field.
    #[error("field {field} is missing")]
    MissingField { field: String },

    /// A multi-valued field has fewer values than the index requires.
    #[error("index {index} out of range for {field} ({len} values)")]
    IndexOutOfRange {
        field: String,
        index: usize,
        len: usize,
    },

    /// The field value cannot be compared with the literal.
    #[error("{field} value {found:?} is not a {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: String,
    },

    /// A header value that is not visible ASCII.
    #[error("{field} has a value that is not valid text")]
    InvalidEncoding { field: String },
}
