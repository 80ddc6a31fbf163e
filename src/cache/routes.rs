//! Cached Route Store
//!
//! Remembers which routes (and at what split) won for a token pair, so a
//! repeat request can skip path enumeration and the combination search.
//! Cached routes are always re-quoted before use; the store never vouches
//! for amounts.
//!
//! Per key: empty → populated (put) → stale (mark_stale, a failed re-quote)
//! → overwritten by the next put, or empty once the TTL lapses.

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::CacheBackend;
use crate::amounts::TradeType;
use crate::brain::{BestSwapRoute, Route};
use crate::cartographer::{Pool, Protocol};
use crate::error::{RouterError, RouterResult};
use crate::tokens::ChainId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteCacheKey {
    pub chain_id: ChainId,
    pub token_in: Address,
    pub token_out: Address,
    pub trade_type: TradeType,
    pub protocols: Vec<Protocol>,
}

impl RouteCacheKey {
    pub fn new(
        chain_id: ChainId,
        token_in: Address,
        token_out: Address,
        trade_type: TradeType,
        protocols: &[Protocol],
    ) -> Self {
        let mut protocols = protocols.to_vec();
        protocols.sort();
        protocols.dedup();
        Self {
            chain_id,
            token_in,
            token_out,
            trade_type,
            protocols,
        }
    }
}

impl std::fmt::Display for RouteCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let protocols: Vec<String> = self.protocols.iter().map(|p| p.to_string()).collect();
        write!(
            f,
            "routes/{}/{:?}/{:?}/{}/{}",
            self.chain_id.id(),
            self.token_in,
            self.token_out,
            self.trade_type,
            protocols.join("+")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRoute {
    pub route: Route,
    pub percent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRoutes {
    /// In the order the optimizer returned them
    pub routes: Vec<CachedRoute>,
    /// Pools the gas model priced through when the entry was written
    pub pricing_pools: Vec<Pool>,
    pub block_number: u64,
    pub cached_at: DateTime<Utc>,
    pub stale: bool,
}

impl CachedRoutes {
    /// Rejects sets whose percentages do not sum to exactly 100
    pub fn new(routes: Vec<CachedRoute>, block_number: u64) -> RouterResult<Self> {
        let total: u32 = routes.iter().map(|r| r.percent).sum();
        if routes.is_empty() || total != 100 {
            return Err(RouterError::invalid(format!(
                "cached route percentages sum to {} across {} routes",
                total,
                routes.len()
            )));
        }
        Ok(Self {
            routes,
            pricing_pools: Vec::new(),
            block_number,
            cached_at: Utc::now(),
            stale: false,
        })
    }

    pub fn from_best(best: &BestSwapRoute, block_number: u64) -> RouterResult<Self> {
        Self::new(
            best.routes
                .iter()
                .map(|r| CachedRoute {
                    route: r.route.clone(),
                    percent: r.percent,
                })
                .collect(),
            block_number,
        )
    }

    pub fn with_pricing_pools(mut self, pools: Vec<Pool>) -> Self {
        self.pricing_pools = pools;
        self
    }

    pub fn percent_total(&self) -> u32 {
        self.routes.iter().map(|r| r.percent).sum()
    }

    /// Every distinct pool the cached routes pass through
    pub fn route_pools(&self) -> Vec<Pool> {
        let mut pools: Vec<Pool> = Vec::new();
        for pool in self.routes.iter().flat_map(|r| r.route.pools.iter()) {
            if !pools.iter().any(|p| p.address == pool.address) {
                pools.push(pool.clone());
            }
        }
        pools
    }
}

pub struct CachedRouteStore {
    backend: Arc<dyn CacheBackend<CachedRoutes>>,
    ttl: Duration,
    blocks_to_live: u64,
}

impl CachedRouteStore {
    pub fn new(backend: Arc<dyn CacheBackend<CachedRoutes>>, ttl: Duration, blocks_to_live: u64) -> Self {
        Self {
            backend,
            ttl,
            blocks_to_live,
        }
    }

    /// A hit needs a fresh, non-stale entry compatible with the requested block
    pub async fn get(&self, key: &RouteCacheKey, requested_block: Option<u64>) -> Option<CachedRoutes> {
        let id = key.to_string();
        let Some(entry) = self.backend.get(&id).await else {
            debug!("Route cache miss: {}", id);
            return None;
        };

        if entry.stale {
            debug!("Route cache entry {} is stale", id);
            return None;
        }

        let age = Utc::now().signed_duration_since(entry.cached_at);
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        if age > ttl {
            debug!("Route cache entry {} expired ({}s old)", id, age.num_seconds());
            return None;
        }

        if let Some(requested) = requested_block {
            let behind = requested.saturating_sub(entry.block_number);
            if behind > self.blocks_to_live {
                debug!(
                    "Route cache entry {} too old for block {} (cached at {})",
                    id, requested, entry.block_number
                );
                return None;
            }
        }

        info!("Route cache hit: {} ({} routes)", id, entry.routes.len());
        Some(entry)
    }

    pub async fn put(&self, key: &RouteCacheKey, routes: CachedRoutes) -> bool {
        if routes.percent_total() != 100 {
            return false;
        }
        self.backend.set(&key.to_string(), routes, Some(self.ttl)).await
    }

    /// Keep `failed` but stop serving it until it is overwritten. A newer
    /// entry written under the same key since `failed` was read is left alone.
    pub async fn mark_stale(&self, key: &RouteCacheKey, failed: &CachedRoutes) {
        let id = key.to_string();
        if let Some(mut entry) = self.backend.get(&id).await {
            if entry.cached_at != failed.cached_at || entry.block_number != failed.block_number {
                debug!("Route cache entry {} replaced since read, not marking stale", id);
                return;
            }
            entry.stale = true;
            self.backend.set(&id, entry, Some(self.ttl)).await;
            info!("Route cache entry {} marked stale", id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::cartographer::PoolKind;
    use crate::tokens::{Token, TokenRegistry};
    use alloy_primitives::U256;

    fn route(id: u8) -> Route {
        let registry = TokenRegistry::for_chain(ChainId::Mode);
        let weth = registry.wrapped_native.clone();
        let usdc: Token = registry.by_symbol("USDC").cloned().unwrap();
        let pool = Pool::new(
            Address::with_last_byte(id),
            weth.clone(),
            usdc.clone(),
            3000,
            PoolKind::ConstantProduct {
                reserve0: U256::from(1_000u64),
                reserve1: U256::from(1_000u64),
            },
        );
        Route::new(vec![pool], weth, usdc).unwrap()
    }

    fn key() -> RouteCacheKey {
        let registry = TokenRegistry::for_chain(ChainId::Mode);
        RouteCacheKey::new(
            ChainId::Mode,
            registry.wrapped_native.address,
            Address::with_last_byte(1),
            TradeType::ExactInput,
            &[Protocol::V3, Protocol::V2, Protocol::V3],
        )
    }

    fn store(ttl: Duration) -> CachedRouteStore {
        CachedRouteStore::new(Arc::new(InMemoryCache::new(None)), ttl, 2)
    }

    fn split(block: u64) -> CachedRoutes {
        CachedRoutes::new(
            vec![
                CachedRoute {
                    route: route(1),
                    percent: 60,
                },
                CachedRoute {
                    route: route(2),
                    percent: 40,
                },
            ],
            block,
        )
        .unwrap()
    }

    #[test]
    fn test_percentages_must_sum_to_100() {
        let bad = CachedRoutes::new(
            vec![CachedRoute {
                route: route(1),
                percent: 95,
            }],
            1,
        );
        assert!(matches!(bad, Err(RouterError::InvalidRequest(_))));
        assert!(CachedRoutes::new(Vec::new(), 1).is_err());
        assert_eq!(split(1).percent_total(), 100);
        assert_eq!(split(1).route_pools().len(), 2);
    }

    #[test]
    fn test_key_normalizes_protocols() {
        let k = key();
        assert_eq!(k.protocols, vec![Protocol::V2, Protocol::V3]);
        assert!(k.to_string().ends_with("/exactIn/V2+V3"));
    }

    #[tokio::test]
    async fn test_block_compatibility() {
        let store = store(Duration::from_secs(60));
        assert!(store.put(&key(), split(100)).await);

        assert!(store.get(&key(), None).await.is_some());
        assert!(store.get(&key(), Some(100)).await.is_some());
        assert!(store.get(&key(), Some(102)).await.is_some());
        assert!(store.get(&key(), Some(103)).await.is_none());
        // older block than cached is still compatible
        assert!(store.get(&key(), Some(90)).await.is_some());
    }

    #[tokio::test]
    async fn test_mark_stale_spares_newer_entry() {
        let store = store(Duration::from_secs(60));
        let failed = split(100);
        store.put(&key(), failed.clone()).await;

        // another request refreshed the key before the failure was recorded
        let mut fresh = split(101);
        fresh.cached_at = failed.cached_at + chrono::Duration::milliseconds(5);
        store.put(&key(), fresh).await;
        store.mark_stale(&key(), &failed).await;

        let hit = store.get(&key(), Some(101)).await.unwrap();
        assert_eq!(hit.block_number, 101);
        assert!(!hit.stale);
    }

    #[tokio::test]
    async fn test_stale_then_overwritten() {
        let store = store(Duration::from_secs(60));
        let entry = split(100);
        store.put(&key(), entry.clone()).await;
        store.mark_stale(&key(), &entry).await;
        assert!(store.get(&key(), None).await.is_none());

        store.put(&key(), split(101)).await;
        let hit = store.get(&key(), None).await.unwrap();
        assert_eq!(hit.block_number, 101);
        assert!(!hit.stale);
    }

    #[tokio::test]
    async fn test_ttl_expiry_empties_entry() {
        let store = store(Duration::from_millis(20));
        store.put(&key(), split(100)).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get(&key(), None).await.is_none());
    }
}
