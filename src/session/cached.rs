//! Read/write-through composition of a fast cache in front of a durable source.

use async_trait::async_trait;

use super::{QueryIdentity, Result, SessionStore};

/// Cache-first session store.
///
/// - `link` writes the cache, then the source; a source failure rolls the
///   cache entry back.
/// - `unlink` removes from the cache, then the source. A source failure is
///   returned without restoring the cache entry.
/// - `get` answers from the cache, falling back to the source on a miss and
///   repopulating the cache with what it finds.
#[derive(Debug)]
pub struct CachedStore<C, S> {
    cache: C,
    source: S,
}

impl<C, S> CachedStore<C, S>
where
    C: SessionStore,
    S: SessionStore,
{
    pub fn new(cache: C, source: S) -> Self {
        Self { cache, source }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

#[async_trait]
impl<C, S> SessionStore for CachedStore<C, S>
where
    C: SessionStore,
    S: SessionStore,
{
    async fn link(&self, query: &QueryIdentity, backend: &str) -> Result<()> {
        self.cache.link(query, backend).await?;

        if let Err(e) = self.source.link(query, backend).await {
            if let Err(rollback) = self.cache.unlink(query).await {
                tracing::warn!(query = %query, error = %rollback, "Failed to roll back cached session link");
            }
            return Err(e);
        }

        Ok(())
    }

    async fn unlink(&self, query: &QueryIdentity) -> Result<()> {
        self.cache.unlink(query).await?;
        self.source.unlink(query).await
    }

    async fn get(&self, query: &QueryIdentity) -> Result<String> {
        match self.cache.get(query).await {
            Ok(backend) => return Ok(backend),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let backend = self.source.get(query).await?;
        self.cache.link(query, &backend).await?;
        Ok(backend)
    }
}
