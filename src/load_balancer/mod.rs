//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Discovery listing
//!     → sync.rs (reconcile pool membership by name)
//!     → pool.rs (add/remove/update backends, refresh loops per backend)
//!
//! Routed request
//!     → pool.rs (fetch healthy, enabled candidates)
//!     → routing pre-filter, then one selection rule:
//!         - random.rs (uniform choice)
//!         - round_robin.rs (rotate through candidates)
//!         - least_queries.rs (fewest running queries)
//!     → pool.rs (forward through the chosen backend's connection)
//! ```
//!
//! # Design Decisions
//! - Selection rules are pure functions of the candidate list, except the
//!   round-robin cursor
//! - The pool owns membership; each backend owns its health and statistics
//! - Unhealthy and disabled backends never reach a selection rule

pub mod backend;
pub mod least_queries;
pub mod pool;
pub mod random;
pub mod round_robin;
pub mod sync;

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

use crate::http::forward::ForwardError;
use crate::routing::{Candidate, RoutingError};

pub use backend::{ConnectionId, Coordinator};
pub use pool::{CoordinatorRef, EnabledStatus, FetchRequest, Pool};
pub use sync::PoolSync;

/// Chooses one candidate out of a non-empty list.
pub trait LoadBalancer: Send + Sync + fmt::Debug {
    fn next_server<'a>(&self, candidates: &'a [Candidate]) -> Result<&'a Candidate, RoutingError>;
}

/// Configured selection rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionRule {
    Random,
    #[default]
    RoundRobin,
    #[serde(alias = "less-running-queries")]
    LeastRunningQueries,
}

impl SelectionRule {
    pub fn build(self) -> Box<dyn LoadBalancer> {
        match self {
            SelectionRule::Random => Box::new(random::Random::new()),
            SelectionRule::RoundRobin => Box::new(round_robin::RoundRobin::new()),
            SelectionRule::LeastRunningQueries => Box::new(least_queries::LeastRunningQueries::new()),
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("duplicated backend name: {0}")]
    DuplicateName(String),

    #[error("backend not found: {0}")]
    NotFound(ConnectionId),

    #[error(transparent)]
    Forward(#[from] ForwardError),
}
