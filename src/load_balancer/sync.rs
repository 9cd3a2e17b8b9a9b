//! Pool reconciliation against discovery.
//!
//! # Responsibilities
//! - Diff pool membership and the discovery listing by coordinator name
//! - Apply removals, then additions, then tag/enabled updates
//! - Run on a fixed interval until shutdown, and on demand
//!
//! # Design Decisions
//! - One reconciliation at a time (async mutex)
//! - The listing is validated before anything is applied, so a bad listing
//!   leaves the pool untouched
//! - An address change under an unchanged name is not applied

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::discovery::{Discovery, DiscoveryError};
use crate::load_balancer::backend::Coordinator;
use crate::load_balancer::pool::{FetchRequest, MemberUpdate, Pool};
use crate::load_balancer::PoolError;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("discovery listed coordinator {0} more than once")]
    DuplicateListing(String),

    #[error("pool update failed: {0}")]
    Pool(#[from] PoolError),
}

/// What one reconciliation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
    pub updated: usize,
}

#[derive(Debug)]
pub struct PoolSync {
    discovery: Arc<dyn Discovery>,
    running: Mutex<()>,
}

impl PoolSync {
    pub fn new(discovery: Arc<dyn Discovery>) -> Self {
        Self {
            discovery,
            running: Mutex::new(()),
        }
    }

    /// Bring `pool` in line with the discovery listing.
    pub async fn sync(&self, pool: &Pool) -> Result<SyncReport, SyncError> {
        let _running = self.running.lock().await;

        let result = self.reconcile(pool).await;
        match &result {
            Ok(_) => metrics::record_sync("ok"),
            Err(e) => {
                metrics::record_sync("error");
                tracing::error!(error = %e, "Pool reconciliation failed");
            }
        }
        result
    }

    async fn reconcile(&self, pool: &Pool) -> Result<SyncReport, SyncError> {
        let listing = self.discovery.list_all().await?;

        let mut desired: HashMap<String, Coordinator> = HashMap::with_capacity(listing.len());
        for coordinator in listing {
            if desired.contains_key(&coordinator.name) {
                return Err(SyncError::DuplicateListing(coordinator.name));
            }
            desired.insert(coordinator.name.clone(), coordinator);
        }

        let current = pool.fetch(&FetchRequest::default());
        let current_names: HashSet<&str> = current.iter().map(|c| c.coordinator.name.as_str()).collect();

        let to_remove: Vec<_> = current
            .iter()
            .filter(|c| !desired.contains_key(&c.coordinator.name))
            .collect();
        let mut to_add: Vec<&Coordinator> = desired
            .values()
            .filter(|c| !current_names.contains(c.name.as_str()))
            .collect();
        to_add.sort_by(|a, b| a.name.cmp(&b.name));

        if !to_add.is_empty() || !to_remove.is_empty() {
            tracing::info!(add = to_add.len(), remove = to_remove.len(), "New pool state retrieved");
        }

        let mut report = SyncReport::default();
        for member in &to_remove {
            pool.remove(member.id)?;
            report.removed += 1;
        }
        for coordinator in to_add {
            pool.add(coordinator.clone()).await?;
            report.added += 1;
        }

        for member in current.iter().filter(|c| desired.contains_key(&c.coordinator.name)) {
            let wanted = &desired[&member.coordinator.name];
            if wanted.address != member.coordinator.address {
                tracing::warn!(
                    backend = %wanted.name,
                    current = %member.coordinator.address,
                    listed = %wanted.address,
                    "Discovery reports a new address for a pooled backend; keeping the current one"
                );
            }
            pool.update(
                member.id,
                MemberUpdate {
                    tags: wanted.tags.clone(),
                    enabled: wanted.enabled,
                },
            )?;
            report.updated += 1;
        }

        Ok(report)
    }

    /// Reconcile every `every` until shutdown is signalled.
    pub async fn run(self: Arc<Self>, pool: Arc<Pool>, every: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval = ?every, "Pool reconciliation loop started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    if let Ok(report) = self.sync(&pool).await {
                        tracing::debug!(?report, "Pool reconciled");
                    }
                }
            }
        }
        tracing::info!("Pool reconciliation loop stopped");
    }
}
