//! In-process coordinator registry.
//!
//! Single-node only. Useful as the source of truth in tests or behind an
//! embedding admin surface.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};

use super::{Discovery, DiscoveryError};
use crate::load_balancer::backend::Coordinator;

/// Partial update of a registered coordinator.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorUpdate {
    pub enabled: Option<bool>,
    pub tags: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default)]
pub struct MemoryDiscovery {
    coordinators: RwLock<Vec<Coordinator>>,
}

impl MemoryDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Coordinator>> {
        self.coordinators.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Coordinator>> {
        self.coordinators.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, coordinator: Coordinator) -> Result<(), DiscoveryError> {
        let mut coordinators = self.write();
        if coordinators.iter().any(|c| c.name == coordinator.name) {
            return Err(DiscoveryError::Duplicate(coordinator.name));
        }
        coordinators.push(coordinator);
        Ok(())
    }

    /// Remove by name. Removing an unknown name is a no-op.
    pub fn remove(&self, name: &str) {
        self.write().retain(|c| c.name != name);
    }

    pub fn get(&self, name: &str) -> Result<Coordinator, DiscoveryError> {
        self.read()
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .ok_or_else(|| DiscoveryError::NotFound(name.to_string()))
    }

    pub fn update(&self, name: &str, update: CoordinatorUpdate) -> Result<(), DiscoveryError> {
        let mut coordinators = self.write();
        let coordinator = coordinators
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| DiscoveryError::NotFound(name.to_string()))?;

        if let Some(enabled) = update.enabled {
            coordinator.enabled = enabled;
        }
        if let Some(tags) = update.tags {
            coordinator.tags = tags;
        }
        Ok(())
    }
}

#[async_trait]
impl Discovery for MemoryDiscovery {
    async fn list_all(&self) -> Result<Vec<Coordinator>, DiscoveryError> {
        Ok(self.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn coordinator(name: &str) -> Coordinator {
        Coordinator::new(name, Url::parse("http://localhost:8080").unwrap())
    }

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let registry = MemoryDiscovery::new();
        registry.add(coordinator("c0")).unwrap();
        registry.add(coordinator("c1")).unwrap();
        assert!(matches!(
            registry.add(coordinator("c0")),
            Err(DiscoveryError::Duplicate(_))
        ));

        registry
            .update(
                "c1",
                CoordinatorUpdate {
                    enabled: Some(false),
                    tags: None,
                },
            )
            .unwrap();
        assert!(!registry.get("c1").unwrap().enabled);

        registry.remove("c0");
        registry.remove("never-there");
        let all = registry.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "c1");

        assert!(matches!(registry.get("c0"), Err(DiscoveryError::NotFound(_))));
        assert!(registry.update("c0", CoordinatorUpdate::default()).is_err());
    }
}
