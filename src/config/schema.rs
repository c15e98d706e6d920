//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the branching gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Where requests go when no branch diverts them.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Branching routers, outermost first.
    pub branches: Vec<BranchConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream the default continuation forwards to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL, scheme `http` (e.g., "http://127.0.0.1:3000").
    pub url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`.
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A named branching router.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BranchConfig {
    /// Router identifier for logging/metrics.
    pub name: String,

    #[serde(flatten)]
    pub spec: BranchSpec,
}

/// Condition plus the alternate middleware chain it guards.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BranchSpec {
    /// Predicate source, e.g. `Header["Foo"][0] == "bar"`.
    pub condition: String,

    /// Invocation order of the alternate chain. Sorted names when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<Vec<String>>,

    /// Middleware descriptors by name.
    #[serde(default)]
    pub middlewares: BTreeMap<String, MiddlewareConfig>,
}

impl BranchSpec {
    /// Names of the alternate chain in invocation order.
    pub fn chain_order(&self) -> Vec<String> {
        match &self.chain {
            Some(order) => order.clone(),
            None => self.middlewares.keys().cloned().collect(),
        }
    }
}

/// A middleware descriptor. Exactly one kind per table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MiddlewareConfig {
    Headers(HeadersConfig),
    StripPrefix(StripPrefixConfig),
    AddPrefix(AddPrefixConfig),
    ReplacePath(ReplacePathConfig),
    RateLimit(RateLimitConfig),
    /// Another ordered list of names from the same descriptor table.
    Chain(ChainConfig),
    /// A nested branching router.
    Branching(BranchSpec),
}

impl MiddlewareConfig {
    /// Kind name as written in configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            MiddlewareConfig::Headers(_) => "headers",
            MiddlewareConfig::StripPrefix(_) => "strip_prefix",
            MiddlewareConfig::AddPrefix(_) => "add_prefix",
            MiddlewareConfig::ReplacePath(_) => "replace_path",
            MiddlewareConfig::RateLimit(_) => "rate_limit",
            MiddlewareConfig::Chain(_) => "chain",
            MiddlewareConfig::Branching(_) => "branching",
        }
    }
}

/// Custom request/response headers. An empty value removes the header.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HeadersConfig {
    pub custom_request_headers: BTreeMap<String, String>,
    pub custom_response_headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripPrefixConfig {
    /// Prefixes tried in order; the first match is stripped.
    pub prefixes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AddPrefixConfig {
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplacePathConfig {
    pub path: String,
}

/// Token bucket rate limiting.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Sustained requests per second per client.
    pub average: u32,

    /// Burst capacity (defaults to `average`).
    #[serde(default)]
    pub burst: Option<u32>,

    /// Header identifying the client; peer IP when absent.
    #[serde(default)]
    pub source_header: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    pub middlewares: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_branch_config() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [upstream]
            url = "http://127.0.0.1:4000"

            [[branches]]
            name = "beta"
            condition = 'Header["X-Beta"][0] == "1"'
            chain = ["tag", "strip"]

            [branches.middlewares.tag.headers]
            custom_response_headers = { chain = "foo" }

            [branches.middlewares.strip.strip_prefix]
            prefixes = ["/beta"]

            [branches.middlewares.limit.rate_limit]
            average = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.upstream.url, "http://127.0.0.1:4000");

        let branch = &config.branches[0];
        assert_eq!(branch.name, "beta");
        assert_eq!(branch.spec.chain_order(), vec!["tag", "strip"]);
        assert_eq!(branch.spec.middlewares["tag"].kind(), "headers");
        assert_eq!(branch.spec.middlewares["strip"].kind(), "strip_prefix");
        assert_eq!(branch.spec.middlewares["limit"].kind(), "rate_limit");
    }

    #[test]
    fn test_chain_order_defaults_to_sorted_names() {
        let spec: BranchSpec = toml::from_str(
            r#"
            condition = "true"
            [middlewares.b.add_prefix]
            prefix = "/b"
            [middlewares.a.add_prefix]
            prefix = "/a"
            "#,
        )
        .unwrap();
        assert_eq!(spec.chain_order(), vec!["a", "b"]);
    }

    #[test]
    fn test_unknown_middleware_kind_is_rejected() {
        let result: Result<BranchSpec, _> = toml::from_str(
            r#"
            condition = "true"
            [middlewares.x.compress]
            level = 3
            "#,
        );
        assert!(result.is_err());
    }
}
