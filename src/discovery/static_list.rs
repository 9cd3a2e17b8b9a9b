//! Fixed coordinator list.

use async_trait::async_trait;

use super::{Discovery, DiscoveryError};
use crate::load_balancer::backend::Coordinator;

#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    coordinators: Vec<Coordinator>,
}

impl StaticDiscovery {
    pub fn new(coordinators: Vec<Coordinator>) -> Self {
        Self { coordinators }
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn list_all(&self) -> Result<Vec<Coordinator>, DiscoveryError> {
        Ok(self.coordinators.clone())
    }
}
