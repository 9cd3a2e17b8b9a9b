//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every subsystem from a validated configuration
//! - Wire them into one `QueryProxy`
//!
//! # Design Decisions
//! - Fail fast: any construction error aborts startup
//! - Nothing is spawned here; `QueryProxy::init` starts background work

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::ProxyConfig;
use crate::discovery::StaticDiscovery;
use crate::health::{self, HealthCheckError};
use crate::http::rewrite::{self, RewriteError};
use crate::http::QueryProxy;
use crate::load_balancer::pool::PoolOptions;
use crate::load_balancer::{Pool, PoolSync};
use crate::routing;
use crate::session;
use crate::statistics::{self, StatisticsError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    HealthCheck(#[from] HealthCheckError),

    #[error(transparent)]
    Statistics(#[from] StatisticsError),

    #[error("invalid coordinator {name}: {source}")]
    Coordinator { name: String, source: url::ParseError },

    #[error("invalid routing pattern: {0}")]
    Routing(#[from] regex::Error),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),
}

/// Build the proxy and everything it depends on, in dependency order.
pub fn build_proxy(config: &ProxyConfig) -> Result<Arc<QueryProxy>, StartupError> {
    let health_check = health::active::from_config(&config.health_check)?;
    let statistics = statistics::from_config(&config.statistics)?;
    let sessions = session::from_config(&config.session);
    tracing::info!(store = ?config.session.store, "Session store ready");

    let pool = Arc::new(Pool::new(
        PoolOptions {
            health_check_interval: Duration::from_secs(config.pool.health_check_interval_secs),
            statistics_interval: Duration::from_secs(config.pool.statistics_interval_secs),
            connect_timeout: Duration::from_secs(config.timeouts.connect_secs),
        },
        health_check,
        statistics,
        sessions.clone(),
    ));

    let coordinators = config
        .discovery
        .static_list
        .iter()
        .map(|c| {
            c.to_coordinator().map_err(|source| StartupError::Coordinator {
                name: c.name.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!(coordinators = coordinators.len(), "Static discovery configured");
    let sync = Arc::new(PoolSync::new(Arc::new(StaticDiscovery::new(coordinators))));

    let router = routing::from_config(&config.routing)?;
    let rewriter = rewrite::from_config(&config.rewrite)?;
    tracing::info!(
        rule = ?config.routing.rule,
        user_rules = config.routing.users.rules.len(),
        rewriters = !rewriter.is_empty(),
        "Routing configured"
    );

    Ok(Arc::new(QueryProxy::new(
        pool,
        sessions,
        router,
        sync,
        rewriter,
        Duration::from_secs(config.pool.sync_interval_secs),
    )))
}
