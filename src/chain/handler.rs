//! Type-erased request handlers.

use std::convert::Infallible;
use std::future::Future;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use tower::util::{service_fn, BoxCloneSyncService};

/// A cloneable, shareable handler: a middleware chain, a router or a terminal.
///
/// Errors are turned into responses by whoever produces them, so the error
/// type is [`Infallible`] and the handler plugs straight into axum.
pub type BoxHandler = BoxCloneSyncService<Request<Body>, Response, Infallible>;

/// Wrap an async function as a [`BoxHandler`].
pub fn handler_fn<F, Fut>(f: F) -> BoxHandler
where
    F: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    BoxCloneSyncService::new(service_fn(move |req: Request<Body>| {
        let fut = f(req);
        async move { Ok::<_, Infallible>(fut.await) }
    }))
}
