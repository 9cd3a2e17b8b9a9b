//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, addresses parse)
//! - Compile every routing regex once so startup cannot fail on one
//! - Check the static coordinator list (unique names, http URLs)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>

use regex::Regex;
use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::{ClusterConfig, ProxyConfig, SessionStoreKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }
    if config.observability.metrics_enabled && config.observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", config.observability.metrics_address),
        ));
    }

    let positive = [
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("pool.health_check_interval_secs", config.pool.health_check_interval_secs),
        ("pool.statistics_interval_secs", config.pool.statistics_interval_secs),
        ("pool.sync_interval_secs", config.pool.sync_interval_secs),
        ("health_check.timeout_secs", config.health_check.timeout_secs),
        ("statistics.timeout_secs", config.statistics.timeout_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    validate_cluster("routing.users.default.cluster", &config.routing.users.default.cluster, &mut errors);
    for (i, rule) in config.routing.users.rules.iter().enumerate() {
        let field = format!("routing.users.rules[{i}]");
        if rule.user.is_empty() {
            errors.push(ValidationError::new(format!("{field}.user"), "must not be empty"));
        } else if let Err(e) = Regex::new(&rule.user) {
            errors.push(ValidationError::new(format!("{field}.user"), e.to_string()));
        }
        validate_cluster(&format!("{field}.cluster"), &rule.cluster, &mut errors);
    }

    if config.session.store == SessionStoreKind::Redis {
        if config.session.redis.address.is_empty() {
            errors.push(ValidationError::new("session.redis.address", "required by the redis store"));
        }
        if config.session.redis.timeout_secs == 0 {
            errors.push(ValidationError::new("session.redis.timeout_secs", "must be greater than zero"));
        }
    }

    let mut names = HashSet::new();
    for (i, coordinator) in config.discovery.static_list.iter().enumerate() {
        let field = format!("discovery.static[{i}]");
        if coordinator.name.is_empty() {
            errors.push(ValidationError::new(format!("{field}.name"), "must not be empty"));
        } else if !names.insert(coordinator.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{field}.name"),
                format!("duplicated coordinator name {}", coordinator.name),
            ));
        }

        match Url::parse(&coordinator.url) {
            Ok(url) if url.scheme() != "http" => {
                errors.push(ValidationError::new(format!("{field}.url"), "only http coordinators are supported"));
            }
            Ok(url) if url.host_str().is_none() => {
                errors.push(ValidationError::new(format!("{field}.url"), "missing host"));
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::new(format!("{field}.url"), e.to_string())),
        }
    }

    for (i, header) in config.rewrite.default_headers.iter().enumerate() {
        if axum::http::HeaderName::from_bytes(header.name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                format!("rewrite.default_headers[{i}].name"),
                format!("invalid header name {:?}", header.name),
            ));
        }
        if axum::http::HeaderValue::from_str(&header.value).is_err() {
            errors.push(ValidationError::new(format!("rewrite.default_headers[{i}].value"), "invalid header value"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_cluster(field: &str, cluster: &ClusterConfig, errors: &mut Vec<ValidationError>) {
    if let Some(name) = &cluster.name {
        if let Err(e) = Regex::new(name) {
            errors.push(ValidationError::new(format!("{field}.name"), e.to_string()));
        }
    }
}
