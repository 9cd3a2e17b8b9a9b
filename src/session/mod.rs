//! Query session affinity.
//!
//! # Data Flow
//! ```text
//! Submission response (200) → interceptor → link(query, backend name)
//! Continuation request     → dispatcher  → get(query) → backend name
//! Terminal poll response   → interceptor → unlink(query)
//! ```
//!
//! # Design Decisions
//! - The key is `{transaction id}::{query id}`; the user is not part of it
//! - A missing link is a distinguished error, not an empty value
//! - The durable store is always fronted by the in-memory cache, which
//!   expires links on the same TTL

pub mod cached;
pub mod memory;
pub mod redis;
pub mod resp;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{SessionConfig, SessionStoreKind};

pub use cached::CachedStore;
pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Transaction id used when the client did not send one.
pub const DEFAULT_TRANSACTION_ID: &str = "NONE";

/// Identity of a running query, used as the affinity key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryIdentity {
    pub user: String,
    pub query_id: String,
    pub transaction_id: String,
}

impl QueryIdentity {
    /// Build an identity, defaulting an absent or empty transaction id.
    pub fn new(user: impl Into<String>, query_id: impl Into<String>, transaction_id: Option<&str>) -> Self {
        let transaction_id = match transaction_id {
            Some(tx) if !tx.is_empty() => tx.to_string(),
            _ => DEFAULT_TRANSACTION_ID.to_string(),
        };

        Self {
            user: user.into(),
            query_id: query_id.into(),
            transaction_id,
        }
    }

    /// Storage key shared by every store.
    pub fn key(&self) -> String {
        format!("{}::{}", self.transaction_id, self.query_id)
    }
}

impl fmt::Display for QueryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (user {})", self.key(), self.user)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no backend linked to query {0}")]
    LinkNotFound(String),

    #[error("session backend error: {0}")]
    Backend(String),

    #[error("session protocol error: {0}")]
    Protocol(#[from] resp::RespError),

    #[error("session store i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::LinkNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Maps query identities to backend names.
#[async_trait]
pub trait SessionStore: Send + Sync + fmt::Debug {
    /// Associate the query with a backend, overwriting any previous link.
    async fn link(&self, query: &QueryIdentity, backend: &str) -> Result<()>;

    /// Remove the association. Removing a missing link succeeds.
    async fn unlink(&self, query: &QueryIdentity) -> Result<()>;

    /// Backend name linked to the query, or [`SessionError::LinkNotFound`].
    async fn get(&self, query: &QueryIdentity) -> Result<String>;
}

/// Build the configured store.
pub fn from_config(config: &SessionConfig) -> Arc<dyn SessionStore> {
    match config.store {
        SessionStoreKind::Memory => Arc::new(MemoryStore::new()),
        SessionStoreKind::Redis => {
            let redis = &config.redis;
            let ttl = Duration::from_secs(redis.ttl_secs);
            let durable = RedisStore::new(redis.address.clone(), redis.prefix.clone(), ttl)
                .with_timeout(Duration::from_secs(redis.timeout_secs))
                .with_database(redis.db)
                .with_password(redis.password.clone());

            Arc::new(CachedStore::new(MemoryStore::with_ttl(ttl), durable))
        }
    }
}
