//! User-identity pre-filter.
//!
//! # Responsibilities
//! - Pick the first rule whose user pattern matches the requesting user
//! - Restrict candidates to the rule's target cluster (name pattern AND tags)
//! - Apply the default policy when no rule matches
//!
//! # Design Decisions
//! - Patterns are unanchored regexes, as written in configuration
//! - No rules configured means no filtering at all
//! - An absent name pattern or empty tag set matches every candidate

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::{Candidate, RoutingError, RoutingRequest};

/// Target cluster of a rule.
#[derive(Debug, Clone, Default)]
pub struct ClusterMatch {
    pub name: Option<Regex>,
    pub tags: BTreeMap<String, String>,
    /// Apply the default cluster match instead when this one leaves nothing.
    pub fallback: bool,
}

impl ClusterMatch {
    pub fn matches(&self, candidate: &Candidate) -> bool {
        let coordinator = &candidate.coordinator;
        if let Some(name) = &self.name {
            if !name.is_match(&coordinator.name) {
                return false;
            }
        }
        coordinator.has_tags(&self.tags)
    }

    fn filter(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        candidates
            .iter()
            .filter(|c| self.matches(c))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct UserRule {
    pub user: Regex,
    pub cluster: ClusterMatch,
}

/// Policy for users no rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoMatchBehaviour {
    /// Reject the request.
    Forbid,
    /// Route to the default cluster.
    #[default]
    Default,
}

#[derive(Debug, Clone, Default)]
pub struct UserAwareRouter {
    rules: Vec<UserRule>,
    behaviour: NoMatchBehaviour,
    default_cluster: ClusterMatch,
}

impl UserAwareRouter {
    pub fn new(rules: Vec<UserRule>, behaviour: NoMatchBehaviour, default_cluster: ClusterMatch) -> Self {
        Self {
            rules,
            behaviour,
            default_cluster,
        }
    }

    /// Pass-through router.
    pub fn disabled() -> Self {
        Self::default()
    }

    fn rule_for(&self, user: &str) -> Option<&ClusterMatch> {
        self.rules
            .iter()
            .find(|rule| rule.user.is_match(user))
            .map(|rule| &rule.cluster)
    }

    /// Restrict the request's candidates. The result may be empty.
    pub fn filter(&self, mut request: RoutingRequest) -> Result<RoutingRequest, RoutingError> {
        if self.rules.is_empty() {
            return Ok(request);
        }

        let cluster = match self.rule_for(&request.user) {
            Some(cluster) => cluster,
            None if self.behaviour == NoMatchBehaviour::Forbid => {
                return Err(RoutingError::Forbidden(request.user));
            }
            None => &self.default_cluster,
        };

        let mut selected = cluster.filter(&request.candidates);
        if selected.is_empty() && cluster.fallback {
            tracing::debug!(user = %request.user, "No candidate matches the user rule, falling back to the default cluster");
            selected = self.default_cluster.filter(&request.candidates);
        }

        request.candidates = selected;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::backend::Coordinator;
    use crate::statistics::ClusterStatistics;
    use url::Url;

    fn candidate(name: &str) -> Candidate {
        Candidate {
            coordinator: Coordinator::new(name, Url::parse("http://localhost:8080").unwrap()),
            statistics: ClusterStatistics::default(),
        }
    }

    fn request(user: &str) -> RoutingRequest {
        RoutingRequest {
            user: user.to_string(),
            candidates: vec![candidate("cluster-00"), candidate("cluster-01")],
        }
    }

    fn names(request: &RoutingRequest) -> Vec<&str> {
        request
            .candidates
            .iter()
            .map(|c| c.coordinator.name.as_str())
            .collect()
    }

    fn cluster(name: &str) -> ClusterMatch {
        ClusterMatch {
            name: Some(Regex::new(name).unwrap()),
            ..Default::default()
        }
    }

    fn test_user_rule() -> UserRule {
        UserRule {
            user: Regex::new("test-user-.*").unwrap(),
            cluster: cluster("cluster-00"),
        }
    }

    #[test]
    fn test_no_rules_passes_through() {
        let router = UserAwareRouter::disabled();
        let routed = router.filter(request("anyone")).unwrap();
        assert_eq!(names(&routed), vec!["cluster-00", "cluster-01"]);
    }

    #[test]
    fn test_matching_rule_restricts_candidates() {
        let router = UserAwareRouter::new(vec![test_user_rule()], NoMatchBehaviour::Forbid, ClusterMatch::default());
        let routed = router.filter(request("test-user-00")).unwrap();
        assert_eq!(names(&routed), vec!["cluster-00"]);
    }

    #[test]
    fn test_unmatched_user_uses_default_cluster() {
        let router = UserAwareRouter::new(vec![test_user_rule()], NoMatchBehaviour::Default, cluster("cluster-01"));
        let routed = router.filter(request("analyst")).unwrap();
        assert_eq!(names(&routed), vec!["cluster-01"]);
    }

    #[test]
    fn test_unmatched_user_forbidden() {
        let router = UserAwareRouter::new(vec![test_user_rule()], NoMatchBehaviour::Forbid, cluster("cluster-01"));
        let err = router.filter(request("analyst")).unwrap_err();
        assert_eq!(err, RoutingError::Forbidden("analyst".into()));
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let rules = vec![
            UserRule {
                user: Regex::new("etl-.*").unwrap(),
                cluster: cluster("cluster-01"),
            },
            UserRule {
                user: Regex::new(".*").unwrap(),
                cluster: cluster("cluster-00"),
            },
        ];
        let router = UserAwareRouter::new(rules, NoMatchBehaviour::Forbid, ClusterMatch::default());
        assert_eq!(names(&router.filter(request("etl-nightly")).unwrap()), vec!["cluster-01"]);
        assert_eq!(names(&router.filter(request("someone")).unwrap()), vec!["cluster-00"]);
    }

    #[test]
    fn test_tags_must_all_match() {
        let mut req = request("test-user-1");
        req.candidates[1].coordinator = req.candidates[1]
            .coordinator
            .clone()
            .with_tag("tier", "gold")
            .with_tag("region", "eu");

        let mut tags = BTreeMap::new();
        tags.insert("tier".to_string(), "gold".to_string());
        let rule = UserRule {
            user: Regex::new("test-user-.*").unwrap(),
            cluster: ClusterMatch {
                name: None,
                tags,
                fallback: false,
            },
        };
        let router = UserAwareRouter::new(vec![rule], NoMatchBehaviour::Forbid, ClusterMatch::default());
        assert_eq!(names(&router.filter(req).unwrap()), vec!["cluster-01"]);
    }

    #[test]
    fn test_empty_match_without_fallback_stays_empty() {
        let rule = UserRule {
            user: Regex::new("test-user-.*").unwrap(),
            cluster: cluster("cluster-99"),
        };
        let router = UserAwareRouter::new(vec![rule], NoMatchBehaviour::Default, cluster("cluster-01"));
        assert!(router.filter(request("test-user-1")).unwrap().candidates.is_empty());
    }

    #[test]
    fn test_empty_match_with_fallback_uses_default_cluster() {
        let mut missing = cluster("cluster-99");
        missing.fallback = true;
        let rule = UserRule {
            user: Regex::new("test-user-.*").unwrap(),
            cluster: missing,
        };
        let router = UserAwareRouter::new(vec![rule], NoMatchBehaviour::Default, cluster("cluster-01"));
        assert_eq!(names(&router.filter(request("test-user-1")).unwrap()), vec!["cluster-01"]);
    }
}
