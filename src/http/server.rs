//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Stack the configured branching routers over the upstream forwarder
//! - Wire up middleware (request ID, tracing, timeout, metrics)
//! - Bind server to listener and drain on shutdown

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::Request,
    middleware::{self, Next},
    response::Response,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::branching::{Branching, BranchingError};
use crate::chain::{BoxHandler, MiddlewareFactory};
use crate::config::schema::{BranchConfig, GatewayConfig};
use crate::http::request::{request_id, UuidRequestId, X_REQUEST_ID};
use crate::http::upstream::{Upstream, UpstreamError};
use crate::middleware::BuiltinMiddlewares;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Branching(#[from] BranchingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wrap `terminal` in one branching router per entry. The first entry is
/// outermost; each router's default continuation is the next one.
pub fn stack_branches(
    branches: &[BranchConfig],
    terminal: BoxHandler,
    factory: &dyn MiddlewareFactory,
) -> Result<BoxHandler, BranchingError> {
    branches.iter().rev().try_fold(terminal, |next, branch| {
        Branching::new(branch.name.as_str(), &branch.spec, next, factory)
            .map(Branching::into_handler)
    })
}

/// HTTP server for the branching gateway.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
}

impl GatewayServer {
    /// Build the full handler stack. Fails if any branch or the upstream is
    /// invalid; nothing is served in that case.
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        let upstream = Upstream::new(&config.upstream.url)?;
        let handler = stack_branches(&config.branches, upstream.into_handler(), &BuiltinMiddlewares)?;

        tracing::info!(
            branches = config.branches.len(),
            upstream = %config.upstream.url,
            "Handler stack built"
        );

        let router = Self::build_router(&config, handler);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, handler: BoxHandler) -> Router {
        Router::new()
            .fallback_service(handler)
            .layer(middleware::from_fn(track_metrics))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id(request),
                )
            }))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID.clone()))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID.clone(), UuidRequestId))
    }

    /// The assembled router, for embedding or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            branches = self.config.branches.len(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

async fn track_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let response = next.run(request).await;
    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_invalid_branch_prevents_startup() {
        let config = GatewayConfig {
            branches: vec![BranchConfig {
                name: "x".into(),
                spec: crate::config::BranchSpec {
                    condition: "true".into(),
                    chain: Some(vec!["ghost".into()]),
                    middlewares: Default::default(),
                },
            }],
            ..Default::default()
        };
        assert!(matches!(GatewayServer::new(config), Err(ServerError::Branching(_))));
    }

    #[tokio::test]
    async fn test_short_circuit_branch_and_request_id() {
        let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream = closed.local_addr().unwrap();
        drop(closed);

        let config = parse_config(&format!(
            r#"
            [upstream]
            url = "http://{upstream}"

            [[branches]]
            name = "limited"
            condition = 'Header["X-Tier"][0] == "free"'

            [branches.middlewares.limit.rate_limit]
            average = 1
            burst = 1
            "#
        ))
        .unwrap();
        let router = GatewayServer::new(config)
            .unwrap_or_else(|e| panic!("{e}"))
            .router();

        let request = || {
            Request::get("/")
                .header("X-Tier", "free")
                .header("x-request-id", "fixed-id")
                .body(Body::empty())
                .unwrap()
        };

        // First request passes the limiter and fails at the (absent) upstream.
        let _ = router.clone().oneshot(request()).await.unwrap();
        let limited = router.oneshot(request()).await.unwrap();
        assert_eq!(limited.status(), 429);
        assert_eq!(limited.headers()["x-request-id"], "fixed-id");
    }
}
