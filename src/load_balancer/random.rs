//! Uniform random selection rule.

use rand::Rng;

use crate::load_balancer::LoadBalancer;
use crate::routing::{Candidate, RoutingError};

#[derive(Debug, Default)]
pub struct Random;

impl Random {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for Random {
    fn next_server<'a>(&self, candidates: &'a [Candidate]) -> Result<&'a Candidate, RoutingError> {
        if candidates.is_empty() {
            return Err(RoutingError::NoCandidates);
        }
        let index = rand::thread_rng().gen_range(0..candidates.len());
        Ok(&candidates[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::backend::Coordinator;
    use crate::statistics::ClusterStatistics;
    use std::collections::HashSet;
    use url::Url;

    #[test]
    fn test_random_stays_in_range() {
        let backends: Vec<Candidate> = ["a", "b", "c"]
            .iter()
            .map(|name| Candidate {
                coordinator: Coordinator::new(*name, Url::parse("http://localhost:8080").unwrap()),
                statistics: ClusterStatistics::default(),
            })
            .collect();
        let lb = Random::new();

        let seen: HashSet<String> = (0..200)
            .map(|_| lb.next_server(&backends).unwrap().coordinator.name.clone())
            .collect();
        assert!(seen.iter().all(|name| ["a", "b", "c"].contains(&name.as_str())));
        assert!(seen.len() > 1);
    }

    #[test]
    fn test_empty_is_error() {
        assert_eq!(Random::new().next_server(&[]).unwrap_err(), RoutingError::NoCandidates);
    }
}
