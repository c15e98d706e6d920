//! Right-to-left chain composition.

use std::collections::BTreeMap;

use crate::chain::error::ChainBuildError;
use crate::chain::factory::MiddlewareFactory;
use crate::chain::handler::BoxHandler;
use crate::config::schema::MiddlewareConfig;

/// Upper bound on links after nested chains are expanded.
pub const MAX_CHAIN_LINKS: usize = 1024;

/// Composes named middleware descriptors around a terminal handler.
pub struct ChainBuilder<'a> {
    descriptors: &'a BTreeMap<String, MiddlewareConfig>,
    factory: &'a dyn MiddlewareFactory,
}

impl<'a> ChainBuilder<'a> {
    pub fn new(
        descriptors: &'a BTreeMap<String, MiddlewareConfig>,
        factory: &'a dyn MiddlewareFactory,
    ) -> Self {
        Self {
            descriptors,
            factory,
        }
    }

    /// Build `names` around `terminal`. The first name receives the request
    /// first; the last one calls `terminal`.
    ///
    /// All names are resolved before any middleware is created, so a bad
    /// reference never leaves a half-built chain behind.
    pub fn build(
        &self,
        names: &[String],
        terminal: BoxHandler,
    ) -> Result<BoxHandler, ChainBuildError> {
        let mut links = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        self.expand(names, &mut Vec::new(), &mut links, &mut missing)?;

        if !missing.is_empty() {
            return Err(ChainBuildError::MissingDescriptor { names: missing });
        }

        let mut handler = terminal;
        for (name, config) in links.into_iter().rev() {
            handler = self
                .factory
                .create(&name, config, handler)
                .map_err(|source| ChainBuildError::Middleware {
                    name: name.clone(),
                    source,
                })?;
            tracing::debug!(middleware = %name, kind = config.kind(), "Linked middleware");
        }

        Ok(handler)
    }

    /// Flatten `names` into concrete links, expanding `chain` descriptors in
    /// place. `stack` holds the chain names currently being expanded.
    fn expand(
        &self,
        names: &[String],
        stack: &mut Vec<String>,
        links: &mut Vec<(String, &'a MiddlewareConfig)>,
        missing: &mut Vec<String>,
    ) -> Result<(), ChainBuildError> {
        let descriptors: &'a BTreeMap<String, MiddlewareConfig> = self.descriptors;

        for name in names {
            let Some(config) = descriptors.get(name) else {
                if !missing.contains(name) {
                    missing.push(name.clone());
                }
                continue;
            };

            match config {
                MiddlewareConfig::Chain(chain) => {
                    if stack.contains(name) {
                        let mut path = stack.clone();
                        path.push(name.clone());
                        return Err(ChainBuildError::Cycle { path });
                    }
                    stack.push(name.clone());
                    self.expand(&chain.middlewares, stack, links, missing)?;
                    stack.pop();
                }
                other => {
                    if links.len() == MAX_CHAIN_LINKS {
                        return Err(ChainBuildError::TooLong {
                            limit: MAX_CHAIN_LINKS,
                        });
                    }
                    links.push((name.clone(), other));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::error::MiddlewareError;
    use crate::chain::handler::handler_fn;
    use crate::config::schema::{AddPrefixConfig, ChainConfig};
    use axum::body::Body;
    use axum::http::{HeaderValue, Request};
    use axum::response::Response;
    use tower::ServiceExt;

    /// Appends its own name to `x-order` on the way in.
    struct Tagging;

    impl MiddlewareFactory for Tagging {
        fn create(
            &self,
            name: &str,
            _config: &MiddlewareConfig,
            next: BoxHandler,
        ) -> Result<BoxHandler, MiddlewareError> {
            if name == "broken" {
                return Err(MiddlewareError::InvalidRate("average must be positive"));
            }
            let name = name.to_string();
            Ok(handler_fn(move |mut req: Request<Body>| {
                let next = next.clone();
                let name = name.clone();
                async move {
                    let seen = match req.headers().get("x-order").and_then(|v| v.to_str().ok()) {
                        Some(prev) => format!("{prev},{name}"),
                        None => name,
                    };
                    req.headers_mut()
                        .insert("x-order", HeaderValue::from_str(&seen).unwrap());
                    next.oneshot(req).await.unwrap()
                }
            }))
        }
    }

    fn terminal() -> BoxHandler {
        handler_fn(|req: Request<Body>| async move {
            let order = req
                .headers()
                .get("x-order")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            Response::new(Body::from(order))
        })
    }

    fn simple() -> MiddlewareConfig {
        MiddlewareConfig::AddPrefix(AddPrefixConfig {
            prefix: "/p".into(),
        })
    }

    fn chain_of(names: &[&str]) -> MiddlewareConfig {
        MiddlewareConfig::Chain(ChainConfig {
            middlewares: names.iter().map(|n| n.to_string()).collect(),
        })
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|n| n.to_string()).collect()
    }

    async fn order_seen(handler: BoxHandler) -> String {
        let response = handler
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_invocation_follows_name_order() {
        let descriptors = BTreeMap::from([
            ("a".to_string(), simple()),
            ("b".to_string(), simple()),
            ("c".to_string(), simple()),
        ]);
        let handler = ChainBuilder::new(&descriptors, &Tagging)
            .build(&names(&["b", "a", "c"]), terminal())
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(order_seen(handler).await, "b,a,c");
    }

    #[tokio::test]
    async fn test_empty_chain_is_terminal() {
        let descriptors = BTreeMap::new();
        let handler = ChainBuilder::new(&descriptors, &Tagging)
            .build(&[], terminal())
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(order_seen(handler).await, "");
    }

    #[tokio::test]
    async fn test_nested_chain_expands_in_place() {
        let descriptors = BTreeMap::from([
            ("a".to_string(), simple()),
            ("b".to_string(), simple()),
            ("c".to_string(), simple()),
            ("group".to_string(), chain_of(&["b", "c"])),
        ]);
        let handler = ChainBuilder::new(&descriptors, &Tagging)
            .build(&names(&["group", "a"]), terminal())
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(order_seen(handler).await, "b,c,a");
    }

    #[test]
    fn test_all_missing_names_reported() {
        let descriptors = BTreeMap::from([
            ("a".to_string(), simple()),
            ("group".to_string(), chain_of(&["phantom"])),
        ]);
        let result = ChainBuilder::new(&descriptors, &Tagging)
            .build(&names(&["a", "ghost", "group", "ghost"]), terminal());
        let Err(err) = result else {
            panic!("expected missing descriptors");
        };
        match err {
            ChainBuildError::MissingDescriptor { names } => {
                assert_eq!(names, vec!["ghost", "phantom"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_is_rejected() {
        let descriptors = BTreeMap::from([
            ("x".to_string(), chain_of(&["y"])),
            ("y".to_string(), chain_of(&["x"])),
        ]);
        let result = ChainBuilder::new(&descriptors, &Tagging).build(&names(&["x"]), terminal());
        let Err(err) = result else {
            panic!("expected a cycle");
        };
        match err {
            ChainBuildError::Cycle { path } => assert_eq!(path, vec!["x", "y", "x"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_repeated_nesting_is_bounded() {
        let mut descriptors = BTreeMap::from([("leaf".to_string(), simple())]);
        let mut prev = "leaf".to_string();
        for level in 0..19 {
            let name = format!("level{level}");
            descriptors.insert(name.clone(), chain_of(&[prev.as_str(), prev.as_str()]));
            prev = name;
        }
        let result = ChainBuilder::new(&descriptors, &Tagging).build(&names(&[prev.as_str()]), terminal());
        let Err(err) = result else {
            panic!("expected the expansion to be rejected");
        };
        assert!(matches!(err, ChainBuildError::TooLong { limit: MAX_CHAIN_LINKS }));
    }

    #[tokio::test]
    async fn test_repeated_reference_within_limit() {
        let descriptors = BTreeMap::from([
            ("a".to_string(), simple()),
            ("twice".to_string(), chain_of(&["a", "a"])),
        ]);
        let handler = ChainBuilder::new(&descriptors, &Tagging)
            .build(&names(&["twice", "twice"]), terminal())
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(order_seen(handler).await, "a,a,a,a");
    }

    #[test]
    fn test_factory_failure_names_middleware() {
        let descriptors = BTreeMap::from([
            ("a".to_string(), simple()),
            ("broken".to_string(), simple()),
        ]);
        let result = ChainBuilder::new(&descriptors, &Tagging)
            .build(&names(&["a", "broken"]), terminal());
        let Err(err) = result else {
            panic!("expected factory failure");
        };
        assert!(matches!(err, ChainBuildError::Middleware { ref name, .. } if name == "broken"));
        assert!(err.to_string().contains("broken"));
    }
}
