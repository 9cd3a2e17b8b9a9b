//! Cluster statistics collection.
//!
//! # Data Flow
//! ```text
//! Pool connection statistics loop (one task per backend):
//!     Timer tick
//!     → skip unless the backend is currently healthy
//!     → api.rs (GET coordinator stats endpoint, UI login on 401)
//!     → snapshot replaces the previous one; on error the old one is kept
//! ```

pub mod api;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::StatisticsConfig;
use crate::load_balancer::backend::Coordinator;

pub use api::HttpStatistics;

/// Point-in-time load snapshot reported by a coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterStatistics {
    pub running_queries: i32,
    pub blocked_queries: i32,
    pub queued_queries: i32,
    pub active_workers: i32,
    pub running_drivers: i32,
    pub reserved_memory: f64,
    pub total_input_rows: i64,
    pub total_input_bytes: i64,
    pub total_cpu_time_secs: i64,
}

#[derive(Debug, Error)]
pub enum StatisticsError {
    #[error("statistics request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("statistics endpoint {url} returned {status} status code")]
    Status { url: String, status: u16 },

    #[error("coordinator UI login at {url} failed: {reason}")]
    Login { url: String, reason: String },

    #[error("statistics endpoint {url} still unauthorized after {attempts} logins")]
    Unauthorized { url: String, attempts: usize },

    #[error("failed to build statistics client: {0}")]
    Client(String),
}

/// Fetches a statistics snapshot for one backend.
#[async_trait]
pub trait StatisticsProvider: Send + Sync + fmt::Debug {
    async fn statistics(&self, coordinator: &Coordinator) -> Result<ClusterStatistics, StatisticsError>;
}

/// Reports zeroed statistics without contacting the coordinator.
#[derive(Debug, Clone, Default)]
pub struct NoOpStatistics;

#[async_trait]
impl StatisticsProvider for NoOpStatistics {
    async fn statistics(&self, _coordinator: &Coordinator) -> Result<ClusterStatistics, StatisticsError> {
        Ok(ClusterStatistics::default())
    }
}

/// Build the configured provider.
pub fn from_config(config: &StatisticsConfig) -> Result<Arc<dyn StatisticsProvider>, StatisticsError> {
    if !config.enabled {
        return Ok(Arc::new(NoOpStatistics));
    }

    Ok(Arc::new(HttpStatistics::new(
        config.path.clone(),
        Duration::from_secs(config.timeout_secs),
    )?))
}
