//! Composition of the user pre-filter and the selection rule.

use crate::load_balancer::backend::Coordinator;
use crate::load_balancer::LoadBalancer;

use super::{RoutingError, RoutingRequest, UserAwareRouter};

#[derive(Debug)]
pub struct Router {
    users: UserAwareRouter,
    rule: Box<dyn LoadBalancer>,
}

impl Router {
    pub fn new(users: UserAwareRouter, rule: Box<dyn LoadBalancer>) -> Self {
        Self { users, rule }
    }

    /// Choose one coordinator for the request.
    pub fn route(&self, request: RoutingRequest) -> Result<Coordinator, RoutingError> {
        if request.candidates.is_empty() {
            return Err(RoutingError::NoCandidates);
        }

        let request = self.users.filter(request)?;
        if request.candidates.is_empty() {
            return Err(RoutingError::NotFound(request.user));
        }

        let chosen = self.rule.next_server(&request.candidates)?;
        Ok(chosen.coordinator.clone())
    }
}
