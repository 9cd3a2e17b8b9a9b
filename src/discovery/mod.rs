//! Coordinator discovery.
//!
//! # Data Flow
//! ```text
//! Pool reconciler
//!     → Discovery::list_all()
//!         - static_list.rs (fixed list from configuration)
//!         - memory.rs (mutable in-process registry)
//!         - CrossProviderDiscovery (concatenation of several sources)
//!     → desired pool membership, keyed by coordinator name
//! ```

pub mod memory;
pub mod static_list;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::load_balancer::backend::Coordinator;

pub use memory::{CoordinatorUpdate, MemoryDiscovery};
pub use static_list::StaticDiscovery;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("cluster not found: {0}")]
    NotFound(String),

    #[error("cluster already registered: {0}")]
    Duplicate(String),

    #[error("discovery source failed: {0}")]
    Source(String),
}

/// Source of the desired set of coordinators.
#[async_trait]
pub trait Discovery: Send + Sync + fmt::Debug {
    async fn list_all(&self) -> Result<Vec<Coordinator>, DiscoveryError>;
}

/// Union of several sources, in order. Any source failing fails the listing.
#[derive(Debug, Default)]
pub struct CrossProviderDiscovery {
    providers: Vec<Arc<dyn Discovery>>,
}

impl CrossProviderDiscovery {
    pub fn new(providers: Vec<Arc<dyn Discovery>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl Discovery for CrossProviderDiscovery {
    async fn list_all(&self) -> Result<Vec<Coordinator>, DiscoveryError> {
        let mut all = Vec::new();
        for provider in &self.providers {
            all.extend(provider.list_all().await?);
        }
        Ok(all)
    }
}
