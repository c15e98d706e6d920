//! Conditional branching router.
//!
//! # Data Flow
//! ```text
//! Construction:
//!     BranchSpec { condition, chain, middlewares } + next handler
//!     → Predicate::compile(condition)
//!     → ChainBuilder::build(chain, terminal = next)
//!     → Branching (immutable, shared via Arc)
//!
//! Per request:
//!     evaluate predicate
//!     → true:  alternate chain (which ends at next)
//!     → false: next
//!     → error: next, plus a warning and an `error` decision count
//! ```
//!
//! # Design Decisions
//! - A broken condition never fails a request; it falls back to `next`
//! - The request is moved into the selected handler, never buffered
//! - No locks on the request path

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use thiserror::Error;
use tower::util::{BoxCloneSyncService, Oneshot};
use tower::{Service, ServiceExt};

use crate::chain::{BoxHandler, ChainBuildError, ChainBuilder, MiddlewareFactory};
use crate::config::schema::BranchSpec;
use crate::expression::{CompileError, EvaluationError, Predicate};
use crate::observability::metrics::DecisionCounters;

/// Construction failure of a branching router.
#[derive(Debug, Error)]
pub enum BranchingError {
    #[error("router {router:?}: invalid condition `{condition}`: {source}")]
    Compile {
        router: String,
        condition: String,
        #[source]
        source: CompileError,
    },

    #[error("router {router:?}: {source}")]
    Chain {
        router: String,
        #[source]
        source: ChainBuildError,
    },
}

/// Verdict for a single request.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Condition held: take the alternate chain.
    Branch,
    /// Condition did not hold: continue with `next`.
    Default,
    /// Condition could not be evaluated: continue with `next`.
    FailOpen(EvaluationError),
}

/// Routes each request to an alternate middleware chain or to the default
/// continuation depending on a compiled condition.
#[derive(Clone)]
pub struct Branching {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    predicate: Predicate,
    branch: BoxHandler,
    next: BoxHandler,
    counters: DecisionCounters,
}

impl Branching {
    /// Compile the condition and compose the alternate chain around `next`.
    pub fn new(
        name: impl Into<String>,
        spec: &BranchSpec,
        next: BoxHandler,
        factory: &dyn MiddlewareFactory,
    ) -> Result<Self, BranchingError> {
        let name = name.into();

        let predicate =
            Predicate::compile(&spec.condition).map_err(|source| BranchingError::Compile {
                router: name.clone(),
                condition: spec.condition.clone(),
                source,
            })?;

        let order = spec.chain_order();
        let branch = ChainBuilder::new(&spec.middlewares, factory)
            .build(&order, next.clone())
            .map_err(|source| BranchingError::Chain {
                router: name.clone(),
                source,
            })?;

        tracing::info!(
            router = %name,
            condition = %predicate,
            chain = ?order,
            "Branching router created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                counters: DecisionCounters::new(&name),
                name,
                predicate,
                branch,
                next,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn condition(&self) -> &str {
        self.inner.predicate.source()
    }

    /// Evaluate the condition for `req`, recording the outcome.
    pub fn decide<B>(&self, req: &Request<B>) -> Decision {
        let inner = &*self.inner;
        match inner.predicate.evaluate(req) {
            Ok(true) => {
                inner.counters.branch.increment(1);
                tracing::trace!(router = %inner.name, "Condition matched, taking branch");
                Decision::Branch
            }
            Ok(false) => {
                inner.counters.default.increment(1);
                tracing::trace!(router = %inner.name, "Condition not matched");
                Decision::Default
            }
            Err(error) => {
                inner.counters.error.increment(1);
                tracing::warn!(
                    router = %inner.name,
                    condition = %inner.predicate,
                    error = %error,
                    "Condition evaluation failed, continuing with default chain"
                );
                Decision::FailOpen(error)
            }
        }
    }

    /// Erase into a [`BoxHandler`] so it can continue another chain.
    pub fn into_handler(self) -> BoxHandler {
        BoxCloneSyncService::new(self)
    }
}

impl Service<Request<Body>> for Branching {
    type Response = Response;
    type Error = Infallible;
    type Future = Oneshot<BoxHandler, Request<Body>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = match self.decide(&req) {
            Decision::Branch => self.inner.branch.clone(),
            Decision::Default | Decision::FailOpen(_) => self.inner.next.clone(),
        };
        handler.oneshot(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::handler_fn;
    use crate::config::schema::{HeadersConfig, MiddlewareConfig};
    use crate::middleware::BuiltinMiddlewares;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn default_handler(calls: Arc<AtomicUsize>) -> BoxHandler {
        handler_fn(move |_req: Request<Body>| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Response::builder()
                    .header("chain", "default")
                    .body(Body::from("ok"))
                    .unwrap()
            }
        })
    }

    fn spec(condition: &str) -> BranchSpec {
        let headers = HeadersConfig {
            custom_response_headers: BTreeMap::from([("chain".to_string(), "foo".to_string())]),
            ..Default::default()
        };
        BranchSpec {
            condition: condition.to_string(),
            chain: Some(vec!["tag".to_string()]),
            middlewares: BTreeMap::from([("tag".to_string(), MiddlewareConfig::Headers(headers))]),
        }
    }

    fn request(foo: Option<&str>) -> Request<Body> {
        let mut builder = Request::get("http://localhost/");
        if let Some(value) = foo {
            builder = builder.header("Foo", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn router(condition: &str, calls: Arc<AtomicUsize>) -> Branching {
        Branching::new("test", &spec(condition), default_handler(calls), &BuiltinMiddlewares)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn test_decisions() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = router(r#"Header["Foo"][0] == "bar""#, calls);

        assert_eq!(router.decide(&request(Some("bar"))), Decision::Branch);
        assert_eq!(router.decide(&request(Some("notbar"))), Decision::Default);
        assert!(matches!(
            router.decide(&request(None)),
            Decision::FailOpen(EvaluationError::MissingField { .. })
        ));
        assert_eq!(router.name(), "test");
        assert_eq!(router.condition(), r#"Header["Foo"][0] == "bar""#);
    }

    #[tokio::test]
    async fn test_branch_chain_ends_at_next() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = router(r#"Header["Foo"][0] == "bar""#, calls.clone());

        let response = router.oneshot(request(Some("bar"))).await.unwrap();
        // The branch overrides the header set by `next`.
        assert_eq!(response.headers()["chain"], "foo");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fail_open_matches_default() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = router(r#"Header["Foo"][0] == "bar""#, calls.clone());

        let defaulted = router.clone().oneshot(request(Some("notbar"))).await.unwrap();
        let failed = router.oneshot(request(None)).await.unwrap();

        assert_eq!(defaulted.status(), failed.status());
        assert_eq!(failed.status(), 200);
        assert_eq!(failed.headers()["chain"], "default");
        assert_eq!(defaulted.headers()["chain"], "default");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalid_condition_names_router_and_condition() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = Branching::new("bad", &spec(r#"Header["Foo"][0] =="#), default_handler(calls), &BuiltinMiddlewares);
        let Err(err) = result else {
            panic!("expected a compile error");
        };
        assert!(matches!(err, BranchingError::Compile { ref router, .. } if router == "bad"));
        assert!(err.to_string().contains(r#"`Header["Foo"][0] ==`"#));
    }

    #[test]
    fn test_unknown_chain_name_fails_construction() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut spec = spec("true");
        spec.chain = Some(vec!["tag".to_string(), "ghost".to_string()]);
        let result = Branching::new("r", &spec, default_handler(calls), &BuiltinMiddlewares);
        let Err(err) = result else {
            panic!("expected a chain error");
        };
        assert!(matches!(
            err,
            BranchingError::Chain {
                source: ChainBuildError::MissingDescriptor { .. },
                ..
            }
        ));
    }
}
