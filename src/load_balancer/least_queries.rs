//! Least running queries selection rule.

use crate::load_balancer::LoadBalancer;
use crate::routing::{Candidate, RoutingError};

/// Selects the candidate reporting the fewest running queries.
#[derive(Debug, Default)]
pub struct LeastRunningQueries;

impl LeastRunningQueries {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastRunningQueries {
    fn next_server<'a>(&self, candidates: &'a [Candidate]) -> Result<&'a Candidate, RoutingError> {
        // On a tie the first one is selected.
        candidates
            .iter()
            .min_by_key(|c| c.statistics.running_queries)
            .ok_or(RoutingError::NoCandidates)
    }
}
