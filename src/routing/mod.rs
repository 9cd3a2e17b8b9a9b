//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher builds RoutingRequest (user + healthy, enabled candidates)
//!     → router.rs (reject an empty candidate list)
//!     → user_aware.rs (restrict candidates by the requesting user)
//!     → load_balancer rule (random | round robin | least running queries)
//!     → Return: chosen Coordinator or RoutingError
//! ```
//!
//! # Design Decisions
//! - User rules are compiled once at startup
//! - First matching user rule wins (configuration order)
//! - A forbidden user is an error, never silently defaulted

pub mod router;
pub mod user_aware;

use regex::Regex;
use thiserror::Error;

use crate::config::{ClusterConfig, RoutingConfig};
use crate::load_balancer::backend::Coordinator;
use crate::statistics::ClusterStatistics;

pub use router::Router;
pub use user_aware::{ClusterMatch, NoMatchBehaviour, UserAwareRouter, UserRule};

/// One routable backend with its latest statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub coordinator: Coordinator,
    pub statistics: ClusterStatistics,
}

/// Per-request routing input. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingRequest {
    pub user: String,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("unable to handle routing with no available coordinators")]
    NoCandidates,

    #[error("no route match for user {0}")]
    Forbidden(String),

    #[error("no coordinator matches the routing rules for user {0}")]
    NotFound(String),
}

fn cluster_match(config: &ClusterConfig) -> Result<ClusterMatch, regex::Error> {
    Ok(ClusterMatch {
        name: config.name.as_deref().map(Regex::new).transpose()?,
        tags: config.tags.clone(),
        fallback: config.fallback,
    })
}

/// Compile the configured user rules and selection rule into a router.
pub fn from_config(config: &RoutingConfig) -> Result<Router, regex::Error> {
    let rules = config
        .users
        .rules
        .iter()
        .map(|rule| {
            Ok(UserRule {
                user: Regex::new(&rule.user)?,
                cluster: cluster_match(&rule.cluster)?,
            })
        })
        .collect::<Result<Vec<_>, regex::Error>>()?;

    let users = UserAwareRouter::new(
        rules,
        config.users.default.behaviour,
        cluster_match(&config.users.default.cluster)?,
    );
    Ok(Router::new(users, config.rule.build()))
}
