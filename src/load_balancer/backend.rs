//! Backend abstraction.
//!
//! # Responsibilities
//! - Describe a coordinator (name, address, tags, enabled flag)
//! - Identify a pooled connection to it
//! - Hold its health and statistics behind the connection's own lock
//! - Refresh health and statistics from the configured providers

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;
use uuid::Uuid;

use crate::health::{Health, HealthCheck, HealthStatus};
use crate::observability::metrics;
use crate::statistics::{ClusterStatistics, StatisticsProvider};

/// A coordinator as known to discovery.
///
/// `name` is the identity used for reconciliation and session affinity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinator {
    pub name: String,
    pub address: Url,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl Coordinator {
    pub fn new(name: impl Into<String>, address: Url) -> Self {
        Self {
            name: name.into(),
            address,
            tags: BTreeMap::new(),
            enabled: true,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// True when every `(key, value)` in `wanted` is present in this coordinator's tags.
    pub fn has_tags(&self, wanted: &BTreeMap<String, String>) -> bool {
        wanted
            .iter()
            .all(|(key, value)| self.tags.get(key) == Some(value))
    }
}

/// Unique identifier for a pooled backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutable per-connection state.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    pub health: Health,
    pub statistics: ClusterStatistics,
}

/// Refreshes one connection's health and statistics.
///
/// Providers are called without holding the state lock; only the write of
/// the result happens under it.
#[derive(Debug, Clone)]
pub struct ConnectionMonitor {
    coordinator: Coordinator,
    state: Arc<Mutex<ConnectionState>>,
    health_check: Arc<dyn HealthCheck>,
    statistics: Arc<dyn StatisticsProvider>,
}

impl ConnectionMonitor {
    pub fn new(
        coordinator: Coordinator,
        health_check: Arc<dyn HealthCheck>,
        statistics: Arc<dyn StatisticsProvider>,
    ) -> Self {
        Self {
            coordinator,
            state: Arc::new(Mutex::new(ConnectionState::default())),
            health_check,
            statistics,
        }
    }

    pub fn name(&self) -> &str {
        &self.coordinator.name
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> ConnectionState {
        self.lock().clone()
    }

    /// Overwrite the health verdict, logging a status transition.
    pub fn set_health(&self, health: Health) {
        let previous = {
            let mut state = self.lock();
            std::mem::replace(&mut state.health, health.clone()).status
        };

        if previous != health.status {
            tracing::warn!(
                backend = %self.coordinator.name,
                from = %previous,
                to = %health.status,
                message = %health.message,
                "Backend health status changed"
            );
        }
        metrics::record_backend_health(&self.coordinator.name, health.status);
    }

    /// Probe health once. A checker error counts as unhealthy.
    pub async fn refresh_health(&self) {
        let health = match self.health_check.check(&self.coordinator.address).await {
            Ok(health) => health,
            Err(e) => Health::unhealthy(e.to_string()),
        };
        self.set_health(health);
    }

    /// Fetch statistics once. Skipped unless the backend is healthy; on
    /// error the previous snapshot is kept.
    pub async fn refresh_statistics(&self) {
        if self.lock().health.status != HealthStatus::Healthy {
            tracing::debug!(backend = %self.coordinator.name, "Skipping statistics refresh for non-healthy backend");
            return;
        }

        match self.statistics.statistics(&self.coordinator).await {
            Ok(statistics) => self.lock().statistics = statistics,
            Err(e) => {
                tracing::warn!(backend = %self.coordinator.name, error = %e, "Failed to refresh backend statistics");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{HealthCheckError, NoOpHealthCheck};
    use crate::statistics::StatisticsError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Switchable {
        healthy: AtomicBool,
        fail: AtomicBool,
    }

    #[async_trait]
    impl HealthCheck for Switchable {
        async fn check(&self, _address: &Url) -> Result<Health, HealthCheckError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(HealthCheckError("probe exploded".into()));
            }
            if self.healthy.load(Ordering::SeqCst) {
                Ok(Health::healthy("ok"))
            } else {
                Ok(Health::unhealthy("down"))
            }
        }
    }

    #[derive(Debug, Default)]
    struct Counting {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl StatisticsProvider for Counting {
        async fn statistics(&self, _c: &Coordinator) -> Result<ClusterStatistics, StatisticsError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as i32 + 1;
            if self.fail.load(Ordering::SeqCst) {
                return Err(StatisticsError::Client("boom".into()));
            }
            Ok(ClusterStatistics {
                running_queries: n * 10,
                ..Default::default()
            })
        }
    }

    fn coordinator() -> Coordinator {
        Coordinator::new("c0", Url::parse("http://127.0.0.1:8080").unwrap())
    }

    #[test]
    fn test_has_tags() {
        let c = coordinator().with_tag("env", "prod").with_tag("zone", "a");

        let mut wanted = BTreeMap::new();
        assert!(c.has_tags(&wanted));
        wanted.insert("env".to_string(), "prod".to_string());
        assert!(c.has_tags(&wanted));
        wanted.insert("zone".to_string(), "b".to_string());
        assert!(!c.has_tags(&wanted));
    }

    #[test]
    fn test_coordinator_deserialize_defaults() {
        let c: Coordinator =
            serde_json::from_str(r#"{"name": "c1", "address": "http://localhost:8080"}"#).unwrap();
        assert!(c.enabled);
        assert!(c.tags.is_empty());
    }

    #[test]
    fn test_connection_ids_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[tokio::test]
    async fn test_checker_error_is_unhealthy() {
        let checker = Arc::new(Switchable::default());
        checker.fail.store(true, Ordering::SeqCst);
        let monitor = ConnectionMonitor::new(coordinator(), checker, Arc::new(Counting::default()));

        monitor.refresh_health().await;
        let state = monitor.snapshot();
        assert_eq!(state.health.status, HealthStatus::Unhealthy);
        assert!(state.health.message.contains("probe exploded"));
    }

    #[tokio::test]
    async fn test_statistics_skipped_when_unhealthy() {
        let checker = Arc::new(Switchable::default());
        let stats = Arc::new(Counting::default());
        let monitor = ConnectionMonitor::new(coordinator(), checker.clone(), stats.clone());

        monitor.refresh_health().await;
        monitor.refresh_statistics().await;
        assert_eq!(stats.calls.load(Ordering::SeqCst), 0);
        assert_eq!(monitor.snapshot().statistics.running_queries, 0);

        checker.healthy.store(true, Ordering::SeqCst);
        monitor.refresh_health().await;
        monitor.refresh_statistics().await;
        assert_eq!(stats.calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.snapshot().statistics.running_queries, 10);
    }

    #[tokio::test]
    async fn test_statistics_error_keeps_previous_snapshot() {
        let stats = Arc::new(Counting::default());
        let monitor = ConnectionMonitor::new(coordinator(), Arc::new(NoOpHealthCheck), stats.clone());

        monitor.refresh_health().await;
        monitor.refresh_statistics().await;
        assert_eq!(monitor.snapshot().statistics.running_queries, 10);

        stats.fail.store(true, Ordering::SeqCst);
        monitor.refresh_statistics().await;
        assert_eq!(monitor.snapshot().statistics.running_queries, 10);
    }
}
