//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Compile every condition, including nested branching ones
//! - Check referential integrity (chains reference defined middlewares)
//! - Validate addresses and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{BranchSpec, GatewayConfig, MiddlewareConfig};
use crate::expression::{CompileError, Predicate};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    InvalidBindAddress(String),

    #[error("upstream.url {url:?}: {reason}")]
    InvalidUpstream { url: String, reason: String },

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroTimeout,

    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("branches[{0}]: name must not be empty")]
    EmptyBranchName(usize),

    #[error("duplicate branch name {0:?}")]
    DuplicateBranchName(String),

    #[error("branch {branch:?}: invalid condition: {source}")]
    InvalidCondition { branch: String, source: CompileError },

    #[error("branch {branch:?}: no middleware defined for {middleware:?}")]
    UnknownMiddleware { branch: String, middleware: String },
}

/// Validate the whole configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if let Err(reason) = check_upstream(&config.upstream.url) {
        errors.push(ValidationError::InvalidUpstream {
            url: config.upstream.url.clone(),
            reason,
        });
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    let mut seen = HashSet::new();
    for (index, branch) in config.branches.iter().enumerate() {
        if branch.name.trim().is_empty() {
            errors.push(ValidationError::EmptyBranchName(index));
        } else if !seen.insert(branch.name.as_str()) {
            errors.push(ValidationError::DuplicateBranchName(branch.name.clone()));
        }
        validate_branch(&branch.name, &branch.spec, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_upstream(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme {:?}", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(())
}

/// Check one branch spec; nested branching descriptors are named
/// `outer/inner`.
fn validate_branch(path: &str, spec: &BranchSpec, errors: &mut Vec<ValidationError>) {
    if let Err(source) = Predicate::compile(&spec.condition) {
        errors.push(ValidationError::InvalidCondition {
            branch: path.to_string(),
            source,
        });
    }

    let referenced = spec.chain_order().into_iter().chain(
        spec.middlewares
            .values()
            .filter_map(|config| match config {
                MiddlewareConfig::Chain(chain) => Some(chain.middlewares.iter().cloned()),
                _ => None,
            })
            .flatten(),
    );
    let mut reported = HashSet::new();
    for name in referenced {
        if !spec.middlewares.contains_key(&name) && reported.insert(name.clone()) {
            errors.push(ValidationError::UnknownMiddleware {
                branch: path.to_string(),
                middleware: name,
            });
        }
    }

    for (name, config) in &spec.middlewares {
        if let MiddlewareConfig::Branching(nested) = config {
            validate_branch(&format!("{path}/{name}"), nested, errors);
        }
    }
}
