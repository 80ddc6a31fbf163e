//! Key-value cache with TTL, and the route cache built on it.

pub mod routes;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::trace;

pub use routes::{CachedRoute, CachedRouteStore, CachedRoutes, RouteCacheKey};

#[async_trait]
pub trait CacheBackend<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V>;
    /// Returns whether the value was stored
    async fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> bool;
    async fn has(&self, key: &str) -> bool;
}

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// Process-local backend; expired entries are dropped lazily on access
pub struct InMemoryCache<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    default_ttl: Option<Duration>,
}

impl<V> InMemoryCache<V> {
    pub fn new(default_ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.values().filter(|e| e.is_live()).count()
    }
}

#[async_trait]
impl<V> CacheBackend<V> for InMemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        trace!("Cache entry {} expired", key);
        self.entries.write().await.remove(key);
        None
    }

    async fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> bool {
        let expires_at = ttl.or(self.default_ttl).map(|ttl| Instant::now() + ttl);
        self.entries
            .write()
            .await
            .insert(key.to_string(), Entry { value, expires_at });
        true
    }

    async fn has(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }
}
