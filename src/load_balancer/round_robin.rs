//! Round-robin selection rule.

use std::sync::{Mutex, PoisonError};

use crate::load_balancer::LoadBalancer;
use crate::routing::{Candidate, RoutingError};

#[derive(Debug, Default)]
struct Cursor {
    index: usize,
    size: usize,
}

/// Round-robin selector.
///
/// Keeps a cursor over the candidate list. When the number of candidates
/// differs from the previous call the cursor starts again at zero.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: Mutex<Cursor>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_server<'a>(&self, candidates: &'a [Candidate]) -> Result<&'a Candidate, RoutingError> {
        if candidates.is_empty() {
            return Err(RoutingError::NoCandidates);
        }

        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        if cursor.size != candidates.len() {
            cursor.size = candidates.len();
            cursor.index = 0;
        }

        let index = cursor.index % candidates.len();
        cursor.index = (index + 1) % candidates.len();
        Ok(&candidates[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::backend::Coordinator;
    use crate::statistics::ClusterStatistics;
    use url::Url;

    fn candidates(n: usize) -> Vec<Candidate> {
        (0..n)
            .map(|i| Candidate {
                coordinator: Coordinator::new(format!("c{}", i), Url::parse("http://localhost:8080").unwrap()),
                statistics: ClusterStatistics::default(),
            })
            .collect()
    }

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let backends = candidates(3);

        let picked: Vec<String> = (0..6)
            .map(|_| lb.next_server(&backends).unwrap().coordinator.name.clone())
            .collect();
        assert_eq!(picked, vec!["c0", "c1", "c2", "c0", "c1", "c2"]);
    }

    #[test]
    fn test_visits_every_candidate_once_per_cycle() {
        let lb = RoundRobin::new();
        let backends = candidates(5);

        let mut seen: Vec<String> = (0..5)
            .map(|_| lb.next_server(&backends).unwrap().coordinator.name.clone())
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_size_change_resets_cursor() {
        let lb = RoundRobin::new();
        let three = candidates(3);
        let two = candidates(2);

        assert_eq!(lb.next_server(&three).unwrap().coordinator.name, "c0");
        assert_eq!(lb.next_server(&three).unwrap().coordinator.name, "c1");

        // c2 was due next; the shrink restarts the rotation instead.
        assert_eq!(lb.next_server(&two).unwrap().coordinator.name, "c0");
        assert_eq!(lb.next_server(&two).unwrap().coordinator.name, "c1");

        assert_eq!(lb.next_server(&three).unwrap().coordinator.name, "c0");
    }

    #[test]
    fn test_empty_is_error() {
        let lb = RoundRobin::new();
        assert_eq!(lb.next_server(&[]).unwrap_err(), RoutingError::NoCandidates);
    }
}
