//! Backend pool management.
//!
//! # Responsibilities
//! - Own pool membership behind a read-write lock
//! - Run one health loop and one statistics loop per backend
//! - Project snapshots of members through filters
//! - Forward requests through a member's reverse proxy
//!
//! # Design Decisions
//! - Membership changes take the write lock; fetches take the read lock
//! - Providers are never called while the pool lock is held
//! - Each loop has its own cancellation token so stopping one backend never
//!   disturbs another

use axum::{
    body::Body,
    http::{Request, Response},
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::health::{Health, HealthCheck, HealthStatus};
use crate::http::forward::{build_client, HttpClient, ReverseProxy};
use crate::http::interceptor::{Interceptor, QueryLinker};
use crate::load_balancer::backend::{ConnectionId, ConnectionMonitor, Coordinator};
use crate::load_balancer::PoolError;
use crate::observability::metrics;
use crate::session::SessionStore;
use crate::statistics::{ClusterStatistics, StatisticsProvider};

/// Message recorded on a backend as it leaves the pool.
pub const REMOVED_MESSAGE: &str = "backend has been removed from the pool";

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub health_check_interval: Duration,
    pub statistics_interval: Duration,
    pub connect_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(10),
            statistics_interval: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Filter on the enabled flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnabledStatus {
    #[default]
    All,
    Enabled,
    Disabled,
}

impl EnabledStatus {
    fn accepts(self, enabled: bool) -> bool {
        match self {
            EnabledStatus::All => true,
            EnabledStatus::Enabled => enabled,
            EnabledStatus::Disabled => !enabled,
        }
    }
}

/// Fetch predicates, combined with AND. The default matches everything.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub name: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub min_health: Option<HealthStatus>,
    pub status: EnabledStatus,
}

impl FetchRequest {
    /// Healthy and enabled members: the only ones routing may see.
    pub fn routable() -> Self {
        Self {
            min_health: Some(HealthStatus::Healthy),
            status: EnabledStatus::Enabled,
            ..Default::default()
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// Read-only snapshot of one member.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorRef {
    pub id: ConnectionId,
    pub coordinator: Coordinator,
    pub health: Health,
    pub statistics: ClusterStatistics,
}

/// The two mutable attributes of a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberUpdate {
    pub tags: BTreeMap<String, String>,
    pub enabled: bool,
}

#[derive(Debug)]
struct Member {
    coordinator: Coordinator,
    proxy: Arc<ReverseProxy>,
    monitor: ConnectionMonitor,
    stop_health: CancellationToken,
    stop_statistics: CancellationToken,
}

impl Member {
    fn stop(&self) {
        self.stop_health.cancel();
        self.stop_statistics.cancel();
    }
}

/// Live set of coordinators the proxy can forward to.
#[derive(Debug)]
pub struct Pool {
    options: PoolOptions,
    members: RwLock<HashMap<ConnectionId, Member>>,
    health_check: Arc<dyn HealthCheck>,
    statistics: Arc<dyn StatisticsProvider>,
    sessions: Arc<dyn SessionStore>,
    client: HttpClient,
}

impl Pool {
    pub fn new(
        options: PoolOptions,
        health_check: Arc<dyn HealthCheck>,
        statistics: Arc<dyn StatisticsProvider>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let client = build_client(options.connect_timeout);
        Self {
            options,
            members: RwLock::new(HashMap::new()),
            health_check,
            statistics,
            sessions,
            client,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, Member>> {
        self.members.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, Member>> {
        self.members.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn contains_name(members: &HashMap<ConnectionId, Member>, name: &str) -> bool {
        members.values().any(|m| m.coordinator.name == name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Add a backend: probe it once, then start its refresh loops.
    pub async fn add(&self, coordinator: Coordinator) -> Result<ConnectionId, PoolError> {
        if Self::contains_name(&self.read(), &coordinator.name) {
            return Err(PoolError::DuplicateName(coordinator.name));
        }

        let id = ConnectionId::new();
        let linker: Arc<dyn Interceptor> = Arc::new(QueryLinker::new(self.sessions.clone(), coordinator.name.clone()));
        let proxy = Arc::new(ReverseProxy::new(&coordinator.address, self.client.clone(), vec![linker])?);
        let monitor = ConnectionMonitor::new(coordinator.clone(), self.health_check.clone(), self.statistics.clone());

        monitor.refresh_health().await;

        let member = Member {
            coordinator: coordinator.clone(),
            proxy,
            monitor: monitor.clone(),
            stop_health: CancellationToken::new(),
            stop_statistics: CancellationToken::new(),
        };

        let size = {
            let mut members = self.write();
            // Another add may have won the race while we were probing.
            if Self::contains_name(&members, &coordinator.name) {
                return Err(PoolError::DuplicateName(coordinator.name));
            }

            tokio::spawn(health_loop(
                monitor.clone(),
                self.options.health_check_interval,
                member.stop_health.clone(),
            ));
            tokio::spawn(statistics_loop(
                monitor,
                self.options.statistics_interval,
                member.stop_statistics.clone(),
            ));

            members.insert(id, member);
            members.len()
        };
        metrics::record_pool_size(size);

        tracing::info!(
            backend = %coordinator.name,
            connection_id = %id,
            address = %coordinator.address,
            "Backend added to pool"
        );
        Ok(id)
    }

    /// Stop a backend's loops, mark it unhealthy and drop it.
    pub fn remove(&self, id: ConnectionId) -> Result<(), PoolError> {
        let (member, size) = {
            let mut members = self.write();
            let member = members.get(&id).ok_or(PoolError::NotFound(id))?;
            member.stop();
            member.monitor.set_health(Health::unhealthy(REMOVED_MESSAGE));
            let member = members.remove(&id).ok_or(PoolError::NotFound(id))?;
            (member, members.len())
        };
        metrics::record_pool_size(size);

        tracing::info!(backend = %member.coordinator.name, connection_id = %id, "Backend removed from pool");
        Ok(())
    }

    /// Replace a member's tags and enabled flag.
    pub fn update(&self, id: ConnectionId, update: MemberUpdate) -> Result<(), PoolError> {
        let mut members = self.write();
        let member = members.get_mut(&id).ok_or(PoolError::NotFound(id))?;

        if member.coordinator.enabled != update.enabled {
            tracing::info!(backend = %member.coordinator.name, enabled = update.enabled, "Backend enabled flag changed");
        }
        member.coordinator.tags = update.tags;
        member.coordinator.enabled = update.enabled;
        Ok(())
    }

    /// Snapshot of members matching every predicate, ordered by name.
    pub fn fetch(&self, filter: &FetchRequest) -> Vec<CoordinatorRef> {
        let members = self.read();

        let mut found: Vec<CoordinatorRef> = members
            .iter()
            .filter(|(_, m)| filter.name.as_deref().map_or(true, |name| m.coordinator.name == name))
            .filter(|(_, m)| m.coordinator.has_tags(&filter.tags))
            .filter(|(_, m)| filter.status.accepts(m.coordinator.enabled))
            .filter_map(|(id, m)| {
                let state = m.monitor.snapshot();
                if let Some(min) = filter.min_health {
                    if state.health.status < min {
                        return None;
                    }
                }
                Some(CoordinatorRef {
                    id: *id,
                    coordinator: m.coordinator.clone(),
                    health: state.health,
                    statistics: state.statistics,
                })
            })
            .collect();

        found.sort_by(|a, b| a.coordinator.name.cmp(&b.coordinator.name));
        found
    }

    /// Forward one exchange through the member's reverse proxy.
    pub async fn handle(&self, id: ConnectionId, request: Request<Body>) -> Result<Response<Body>, PoolError> {
        let proxy = {
            let members = self.read();
            members.get(&id).map(|m| m.proxy.clone()).ok_or(PoolError::NotFound(id))?
        };
        Ok(proxy.handle(request).await?)
    }

    /// Refresh health, then statistics, of every member once.
    pub async fn update_status(&self) {
        let monitors: Vec<ConnectionMonitor> = self.read().values().map(|m| m.monitor.clone()).collect();

        let mut tasks = JoinSet::new();
        for monitor in monitors {
            tasks.spawn(async move {
                monitor.refresh_health().await;
                monitor.refresh_statistics().await;
            });
        }
        while tasks.join_next().await.is_some() {}
    }

    /// Stop every member's refresh loops.
    pub fn shutdown(&self) {
        for member in self.read().values() {
            member.stop();
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let members = self.members.get_mut().unwrap_or_else(PoisonError::into_inner);
        for member in members.values() {
            member.stop();
        }
    }
}

fn ticker(every: Duration) -> time::Interval {
    let mut ticker = time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn health_loop(monitor: ConnectionMonitor, every: Duration, stop: CancellationToken) {
    let mut ticker = ticker(every);
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = monitor.refresh_health() => {}
                }
            }
        }
    }
    tracing::debug!(backend = %monitor.name(), "Health loop stopped");
}

async fn statistics_loop(monitor: ConnectionMonitor, every: Duration, stop: CancellationToken) {
    let mut ticker = ticker(every);
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = monitor.refresh_statistics() => {}
                }
            }
        }
    }
    tracing::debug!(backend = %monitor.name(), "Statistics loop stopped");
}
