//! In-process session store.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::{QueryIdentity, Result, SessionError, SessionStore};

#[derive(Debug, Clone)]
struct Link {
    backend: String,
    expires_at: Option<Instant>,
}

impl Link {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Non-durable, single-process map from query key to backend name.
///
/// With a TTL, links expire that long after they were written. Expired links
/// are dropped on read and swept on every write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    links: DashMap<String, Link>,
    ttl: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            links: DashMap::new(),
            ttl: Some(ttl),
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Drop every expired link.
    pub fn purge_expired(&self) {
        if self.ttl.is_none() {
            return;
        }
        let now = Instant::now();
        self.links.retain(|_, link| !link.is_expired(now));
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn link(&self, query: &QueryIdentity, backend: &str) -> Result<()> {
        self.purge_expired();
        let link = Link {
            backend: backend.to_string(),
            expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
        };
        self.links.insert(query.key(), link);
        Ok(())
    }

    async fn unlink(&self, query: &QueryIdentity) -> Result<()> {
        self.links.remove(&query.key());
        Ok(())
    }

    async fn get(&self, query: &QueryIdentity) -> Result<String> {
        let key = query.key();
        let now = Instant::now();
        let found = self.links.get(&key).map(|entry| entry.value().clone());

        match found {
            Some(link) if !link.is_expired(now) => Ok(link.backend),
            Some(_) => {
                self.links.remove_if(&key, |_, link| link.is_expired(now));
                Err(SessionError::LinkNotFound(key))
            }
            None => Err(SessionError::LinkNotFound(key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_link_get_unlink() {
        let store = MemoryStore::new();
        let q = QueryIdentity::new("user", "query-0", None);

        store.link(&q, "c0").await.unwrap();
        assert_eq!(store.get(&q).await.unwrap(), "c0");

        store.link(&q, "c1").await.unwrap();
        assert_eq!(store.get(&q).await.unwrap(), "c1");

        store.unlink(&q).await.unwrap();
        assert!(store.get(&q).await.unwrap_err().is_not_found());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unlink_missing_is_ok() {
        let store = MemoryStore::new();
        let q = QueryIdentity::new("user", "never-linked", Some("tx"));
        store.unlink(&q).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_links_expire_after_ttl() {
        let store = MemoryStore::with_ttl(Duration::from_secs(60));
        let q = QueryIdentity::new("user", "query-0", None);
        store.link(&q, "c0").await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(store.get(&q).await.unwrap(), "c0");

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get(&q).await.unwrap_err().is_not_found());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_sweep_expired_links() {
        let store = MemoryStore::with_ttl(Duration::from_secs(60));
        for i in 0..100 {
            let q = QueryIdentity::new("user", format!("query-{}", i), None);
            store.link(&q, "c0").await.unwrap();
        }
        assert_eq!(store.len(), 100);

        tokio::time::advance(Duration::from_secs(61)).await;
        store
            .link(&QueryIdentity::new("user", "fresh", None), "c1")
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relink_refreshes_expiry() {
        let store = MemoryStore::with_ttl(Duration::from_secs(60));
        let q = QueryIdentity::new("user", "query-0", None);
        store.link(&q, "c0").await.unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        store.link(&q, "c0").await.unwrap();
        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(store.get(&q).await.unwrap(), "c0");
    }
}
