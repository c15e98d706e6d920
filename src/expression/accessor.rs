//! Request field registry.
//!
//! # Responsibilities
//! - Resolve selector paths (`Header["X"][0]`, `URL.Path`, ...) to accessors
//! - Read field values from a live request without touching the body
//!
//! # Design Decisions
//! - The registry is a closed enum: unknown selectors fail at compile time
//! - Header and query selectors without an index are multi-valued lists
//! - An absent list reads as empty; an absent indexed value is an error

use std::borrow::Cow;
use std::fmt;

use axum::http::{header, HeaderName, Request};

use crate::expression::error::{CompileError, EvaluationError};

/// One step of a selector path as written in the source.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// `Name` or `.Name`
    Name(String),
    /// `["key"]`
    Key(String),
    /// `[0]` or `.0`
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Name(name) => f.write_str(name),
            Segment::Key(key) => write!(f, "[{key:?}]"),
            Segment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Shape of the value an accessor produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    List,
}

/// A value read from the request.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'r> {
    Text(Cow<'r, str>),
    Number(f64),
    List(Vec<Cow<'r, str>>),
}

/// A resolved, validated request field.
#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    Method,
    Path,
    RawQuery,
    Host,
    Proto,
    ContentLength,
    Header { name: HeaderName, index: Option<usize> },
    Query { key: String, index: Option<usize> },
}

impl Accessor {
    /// Resolve a selector path against the registry.
    pub fn resolve(segments: &[Segment]) -> Result<Self, CompileError> {
        let unknown = || CompileError::UnknownField {
            selector: render(segments),
        };

        let (root, rest) = match segments.split_first() {
            Some((Segment::Name(root), rest)) => (root.as_str(), rest),
            _ => return Err(unknown()),
        };

        match (root, rest) {
            ("Method", []) => Ok(Accessor::Method),
            ("Path", []) => Ok(Accessor::Path),
            ("RawQuery", []) => Ok(Accessor::RawQuery),
            ("Host", []) => Ok(Accessor::Host),
            ("Proto", []) => Ok(Accessor::Proto),
            ("ContentLength", []) => Ok(Accessor::ContentLength),
            ("URL", [Segment::Name(field)]) => match field.as_str() {
                "Path" => Ok(Accessor::Path),
                "RawQuery" => Ok(Accessor::RawQuery),
                _ => Err(unknown()),
            },
            ("Header", [key, tail @ ..]) => {
                let key = map_key(key).ok_or_else(unknown)?;
                let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                    CompileError::InvalidHeaderName {
                        name: key.to_string(),
                    }
                })?;
                let index = index_tail(tail).ok_or_else(unknown)?;
                Ok(Accessor::Header { name, index })
            }
            ("Query", [key, tail @ ..]) => {
                let key = map_key(key).ok_or_else(unknown)?;
                let index = index_tail(tail).ok_or_else(unknown)?;
                Ok(Accessor::Query {
                    key: key.to_string(),
                    index,
                })
            }
            _ => Err(unknown()),
        }
    }

    /// The kind of value this accessor yields.
    pub fn kind(&self) -> FieldKind {
        match self {
            Accessor::ContentLength => FieldKind::Number,
            Accessor::Header { index: None, .. } | Accessor::Query { index: None, .. } => {
                FieldKind::List
            }
            _ => FieldKind::Text,
        }
    }

    /// Read the field from `req`.
    pub fn read<'r, B>(&self, req: &'r Request<B>) -> Result<FieldValue<'r>, EvaluationError> {
        match self {
            Accessor::Method => Ok(FieldValue::Text(Cow::Borrowed(req.method().as_str()))),
            Accessor::Path => Ok(FieldValue::Text(Cow::Borrowed(req.uri().path()))),
            Accessor::RawQuery => Ok(FieldValue::Text(Cow::Borrowed(
                req.uri().query().unwrap_or_default(),
            ))),
            Accessor::Proto => Ok(FieldValue::Text(Cow::Owned(format!("{:?}", req.version())))),
            Accessor::Host => {
                if let Some(authority) = req.uri().authority() {
                    return Ok(FieldValue::Text(Cow::Borrowed(authority.as_str())));
                }
                match req.headers().get(header::HOST) {
                    Some(value) => value
                        .to_str()
                        .map(|host| FieldValue::Text(Cow::Borrowed(host)))
                        .map_err(|_| self.invalid_encoding()),
                    None => Err(self.missing()),
                }
            }
            Accessor::ContentLength => {
                let value = req
                    .headers()
                    .get(header::CONTENT_LENGTH)
                    .ok_or_else(|| self.missing())?;
                let text = value.to_str().map_err(|_| self.invalid_encoding())?;
                text.trim()
                    .parse::<u64>()
                    .map(|len| FieldValue::Number(len as f64))
                    .map_err(|_| EvaluationError::TypeMismatch {
                        field: self.to_string(),
                        expected: "number",
                        found: text.to_string(),
                    })
            }
            Accessor::Header { name, index } => {
                let values = req
                    .headers()
                    .get_all(name)
                    .iter()
                    .map(|value| value.to_str().map(Cow::Borrowed))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| self.invalid_encoding())?;
                self.select(values, *index)
            }
            Accessor::Query { key, index } => {
                let query = req.uri().query().unwrap_or_default();
                let values = url::form_urlencoded::parse(query.as_bytes())
                    .filter(|(k, _)| k == key)
                    .map(|(_, v)| v)
                    .collect::<Vec<_>>();
                self.select(values, *index)
            }
        }
    }

    fn select<'r>(
        &self,
        mut values: Vec<Cow<'r, str>>,
        index: Option<usize>,
    ) -> Result<FieldValue<'r>, EvaluationError> {
        let Some(index) = index else {
            return Ok(FieldValue::List(values));
        };
        if values.is_empty() {
            return Err(self.missing());
        }
        if index >= values.len() {
            return Err(EvaluationError::IndexOutOfRange {
                field: self.to_string(),
                index,
                len: values.len(),
            });
        }
        Ok(FieldValue::Text(values.swap_remove(index)))
    }

    fn missing(&self) -> EvaluationError {
        EvaluationError::MissingField {
            field: self.to_string(),
        }
    }

    fn invalid_encoding(&self) -> EvaluationError {
        EvaluationError::InvalidEncoding {
            field: self.to_string(),
        }
    }
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Method => f.write_str("Method"),
            Accessor::Path => f.write_str("Path"),
            Accessor::RawQuery => f.write_str("RawQuery"),
            Accessor::Host => f.write_str("Host"),
            Accessor::Proto => f.write_str("Proto"),
            Accessor::ContentLength => f.write_str("ContentLength"),
            Accessor::Header { name, index } => {
                write!(f, "Header[{:?}]", name.as_str())?;
                if let Some(index) = index {
                    write!(f, "[{index}]")?;
                }
                Ok(())
            }
            Accessor::Query { key, index } => {
                write!(f, "Query[{key:?}]")?;
                if let Some(index) = index {
                    write!(f, "[{index}]")?;
                }
                Ok(())
            }
        }
    }
}

/// `Header["X"]` and `Header.X` both name the map key `X`.
fn map_key(segment: &Segment) -> Option<&str> {
    match segment {
        Segment::Key(key) | Segment::Name(key) => Some(key.as_str()),
        Segment::Index(_) => None,
    }
}

fn index_tail(tail: &[Segment]) -> Option<Option<usize>> {
    match tail {
        [] => Some(None),
        [Segment::Index(index)] => Some(Some(*index)),
        _ => None,
    }
}

fn render(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Name(name) if i > 0 => {
                out.push('.');
                out.push_str(name);
            }
            other => out.push_str(&other.to_string()),
        }
    }
    out
}
