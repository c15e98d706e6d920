//! Forwarding to the upstream service.
//!
//! The forwarder is the terminal handler of the gateway: whatever the
//! branches decide, requests that are not short-circuited end up here.

use std::sync::Arc;

use axum::body::Body;
use axum::http::uri::{Authority, Scheme};
use axum::http::{Request, StatusCode, Uri, Version};
use axum::response::{IntoResponse, Response};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use url::Url;

use crate::chain::{handler_fn, BoxHandler};
use crate::http::request::request_id;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Streams requests to a fixed `http` origin.
#[derive(Clone)]
pub struct Upstream {
    client: Client<HttpConnector, Body>,
    authority: Authority,
    base_path: Arc<str>,
}

impl Upstream {
    pub fn new(url: &str) -> Result<Self, UpstreamError> {
        let invalid = |reason: String| UpstreamError::InvalidUrl {
            url: url.to_string(),
            reason,
        };

        let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
        if parsed.scheme() != "http" {
            return Err(invalid(format!("unsupported scheme {:?}", parsed.scheme())));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| invalid("missing host".to_string()))?;
        let authority = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority = Authority::try_from(authority).map_err(|e| invalid(e.to_string()))?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            client,
            authority,
            base_path: parsed.path().trim_end_matches('/').into(),
        })
    }

    /// Forward `request`, answering `502 Bad Gateway` if the upstream fails.
    pub async fn forward(&self, request: Request<Body>) -> Response {
        let request_id = request_id(&request).to_string();
        let (mut parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri = Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(format!("{}{}", self.base_path, path_and_query))
            .build();
        parts.uri = match uri {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream URI");
                return (StatusCode::BAD_GATEWAY, "Invalid upstream URI").into_response();
            }
        };
        // The pooled connections speak HTTP/1.1 regardless of the client side.
        parts.version = Version::HTTP_11;

        tracing::debug!(request_id = %request_id, uri = %parts.uri, "Forwarding request");

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => {
                let (parts, body) = response.into_parts();
                Response::from_parts(parts, Body::new(body))
            }
            Err(e) => {
                tracing::error!(
                    request_id = %request_id,
                    upstream = %self.authority,
                    error = %e,
                    "Upstream error"
                );
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
        }
    }

    pub fn into_handler(self) -> BoxHandler {
        handler_fn(move |request: Request<Body>| {
            let upstream = self.clone();
            async move { upstream.forward(request).await }
        })
    }
}
