//! Custom request and response headers.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use axum::response::Response;
use futures_util::future::BoxFuture;
use tower::{Service, ServiceExt};

use crate::chain::{BoxHandler, MiddlewareError};
use crate::config::schema::HeadersConfig;

/// `None` removes the header.
type Rule = (HeaderName, Option<HeaderValue>);

/// Sets request headers before the continuation and response headers after.
#[derive(Clone)]
pub struct Headers {
    next: BoxHandler,
    request: Arc<[Rule]>,
    response: Arc<[Rule]>,
}

impl Headers {
    pub fn new(config: &HeadersConfig, next: BoxHandler) -> Result<Self, MiddlewareError> {
        Ok(Self {
            next,
            request: parse_rules(&config.custom_request_headers)?.into(),
            response: parse_rules(&config.custom_response_headers)?.into(),
        })
    }
}

fn parse_rules(headers: &BTreeMap<String, String>) -> Result<Vec<Rule>, MiddlewareError> {
    headers
        .iter()
        .map(|(name, value)| {
            let header = HeaderName::try_from(name.as_str()).map_err(|e| {
                MiddlewareError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            if value.is_empty() {
                return Ok((header, None));
            }
            let value = HeaderValue::try_from(value.as_str()).map_err(|e| {
                MiddlewareError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            Ok((header, Some(value)))
        })
        .collect()
}

fn apply(rules: &[Rule], headers: &mut HeaderMap) {
    for (name, value) in rules {
        match value {
            Some(value) => {
                headers.insert(name.clone(), value.clone());
            }
            None => {
                headers.remove(name);
            }
        }
    }
}

impl Service<Request<Body>> for Headers {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        apply(&self.request, req.headers_mut());
        let response_rules = self.response.clone();
        let next = self.next.clone();

        Box::pin(async move {
            let mut response = next.oneshot(req).await?;
            apply(&response_rules, response.headers_mut());
            Ok(response)
        })
    }
}
