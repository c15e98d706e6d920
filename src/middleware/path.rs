//! Path rewriting middlewares.
//!
//! All three keep the query string and rewrite only the path component.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderName, HeaderValue, Request, Uri};
use axum::response::Response;
use tower::util::Oneshot;
use tower::{Service, ServiceExt};

use crate::chain::{BoxHandler, MiddlewareError};
use crate::config::schema::{AddPrefixConfig, ReplacePathConfig, StripPrefixConfig};

/// Prefix removed by [`StripPrefix`].
pub static X_FORWARDED_PREFIX: HeaderName = HeaderName::from_static("x-forwarded-prefix");

/// Path before [`ReplacePath`] rewrote it.
pub static X_REPLACED_PATH: HeaderName = HeaderName::from_static("x-replaced-path");

/// Removes the first matching prefix from the request path.
#[derive(Clone)]
pub struct StripPrefix {
    next: BoxHandler,
    prefixes: Arc<[String]>,
}

impl StripPrefix {
    pub fn new(config: &StripPrefixConfig, next: BoxHandler) -> Result<Self, MiddlewareError> {
        if config.prefixes.is_empty() {
            return Err(MiddlewareError::InvalidPath {
                path: String::new(),
                reason: "at least one prefix is required",
            });
        }
        for prefix in &config.prefixes {
            check_rooted(prefix)?;
        }
        Ok(Self {
            next,
            prefixes: config.prefixes.clone().into(),
        })
    }
}

impl Service<Request<Body>> for StripPrefix {
    type Response = Response;
    type Error = Infallible;
    type Future = Oneshot<BoxHandler, Request<Body>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let path = req.uri().path();
        let matched = self
            .prefixes
            .iter()
            .find(|prefix| path.starts_with(prefix.as_str()))
            .map(|prefix| {
                let rest = &path[prefix.len()..];
                let stripped = if rest.starts_with('/') {
                    rest.to_string()
                } else {
                    format!("/{rest}")
                };
                (prefix.clone(), stripped)
            });

        if let Some((prefix, stripped)) = matched {
            if set_path(&mut req, &stripped) {
                if let Ok(value) = HeaderValue::try_from(prefix) {
                    req.headers_mut().insert(X_FORWARDED_PREFIX.clone(), value);
                }
            }
        }

        self.next.clone().oneshot(req)
    }
}

/// Prepends a fixed prefix to the request path.
#[derive(Clone)]
pub struct AddPrefix {
    next: BoxHandler,
    prefix: Arc<str>,
}

impl AddPrefix {
    pub fn new(config: &AddPrefixConfig, next: BoxHandler) -> Result<Self, MiddlewareError> {
        check_rooted(&config.prefix)?;
        Ok(Self {
            next,
            prefix: config.prefix.trim_end_matches('/').into(),
        })
    }
}

impl Service<Request<Body>> for AddPrefix {
    type Response = Response;
    type Error = Infallible;
    type Future = Oneshot<BoxHandler, Request<Body>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let path = format!("{}{}", self.prefix, req.uri().path());
        set_path(&mut req, &path);
        self.next.clone().oneshot(req)
    }
}

/// Replaces the request path, keeping the original in `X-Replaced-Path`.
#[derive(Clone)]
pub struct ReplacePath {
    next: BoxHandler,
    path: Arc<str>,
}

impl ReplacePath {
    pub fn new(config: &ReplacePathConfig, next: BoxHandler) -> Result<Self, MiddlewareError> {
        check_rooted(&config.path)?;
        if PathAndQuery::try_from(config.path.as_str()).is_err() {
            return Err(MiddlewareError::InvalidPath {
                path: config.path.clone(),
                reason: "not a valid URI path",
            });
        }
        Ok(Self {
            next,
            path: config.path.as_str().into(),
        })
    }
}

impl Service<Request<Body>> for ReplacePath {
    type Response = Response;
    type Error = Infallible;
    type Future = Oneshot<BoxHandler, Request<Body>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let original = HeaderValue::try_from(req.uri().path());
        if set_path(&mut req, &self.path) {
            if let Ok(value) = original {
                req.headers_mut().insert(X_REPLACED_PATH.clone(), value);
            }
        }
        self.next.clone().oneshot(req)
    }
}

fn check_rooted(path: &str) -> Result<(), MiddlewareError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(MiddlewareError::InvalidPath {
            path: path.to_string(),
            reason: "must start with '/'",
        })
    }
}

/// Swap the path of `req`, keeping scheme, authority and query.
/// Returns false (and leaves the request alone) if the result is not a URI.
fn set_path<B>(req: &mut Request<B>, path: &str) -> bool {
    let path_and_query = match req.uri().query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };

    let mut parts = req.uri().clone().into_parts();
    parts.path_and_query = match PathAndQuery::try_from(path_and_query) {
        Ok(pq) => Some(pq),
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Rewritten path is not a valid URI");
            return false;
        }
    };

    match Uri::from_parts(parts) {
        Ok(uri) => {
            *req.uri_mut() = uri;
            true
        }
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Failed to rebuild request URI");
            false
        }
    }
}
