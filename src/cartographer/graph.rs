//! Graph Construction
//!
//! Step 1.2: The Map Maker
//!
//! Narrows the indexed pool universe down to the pools worth routing through
//! for one token pair, refreshes them at the pinned block, and lays them out
//! as an undirected token graph. Also picks the pools used to price gas.

use alloy_primitives::Address;
use futures::future::join_all;
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::fetcher::{PoolDescriptor, PoolStateProvider};
use super::pool::{Pool, Protocol};
use super::subgraph::{PoolSource, SubgraphPool};
use super::token_provider::{TokenAccessor, TokenProvider};
use crate::error::{RouterError, RouterResult};
use crate::tokens::{Token, TokenRegistry};

// ============================================
// TOKEN GRAPH
// ============================================

/// Tokens are nodes, pools are edges (weight = index into `pools`)
#[derive(Debug, Clone)]
pub struct PoolGraph {
    graph: UnGraph<Address, usize>,
    token_to_node: HashMap<Address, NodeIndex>,
    tokens: HashMap<Address, Token>,
    pools: Vec<Pool>,
}

impl PoolGraph {
    pub fn new() -> Self {
        Self {
            graph: UnGraph::new_undirected(),
            token_to_node: HashMap::new(),
            tokens: HashMap::new(),
            pools: Vec::new(),
        }
    }

    pub fn from_pools(pools: Vec<Pool>) -> Self {
        let mut graph = Self::new();
        let mut skipped = 0;
        for pool in pools {
            if !graph.add_pool(pool) {
                skipped += 1;
            }
        }

        info!(
            "Graph built: {} Nodes, {} Edges",
            graph.graph.node_count(),
            graph.graph.edge_count()
        );
        if skipped > 0 {
            warn!("  Skipped {} pools without liquidity or duplicated", skipped);
        }
        graph
    }

    /// Returns false when the pool was rejected
    pub fn add_pool(&mut self, pool: Pool) -> bool {
        if !pool.has_liquidity() || self.pools.iter().any(|p| p.address == pool.address) {
            return false;
        }

        let node0 = self.get_or_create_node(&pool.token0);
        let node1 = self.get_or_create_node(&pool.token1);
        self.graph.add_edge(node0, node1, self.pools.len());
        self.pools.push(pool);
        true
    }

    fn get_or_create_node(&mut self, token: &Token) -> NodeIndex {
        if let Some(&node) = self.token_to_node.get(&token.address) {
            return node;
        }
        let node = self.graph.add_node(token.address);
        self.token_to_node.insert(token.address, node);
        self.tokens.insert(token.address, token.clone());
        node
    }

    /// Pools touching `token`, ordered by pool address for determinism
    pub fn pools_for(&self, token: &Address) -> Vec<&Pool> {
        let Some(&node) = self.token_to_node.get(token) else {
            return Vec::new();
        };
        let mut pools: Vec<&Pool> = self
            .graph
            .edges(node)
            .filter_map(|e| self.pools.get(*e.weight()))
            .collect();
        pools.sort_by_key(|p| p.address);
        pools
    }

    pub fn token(&self, address: &Address) -> Option<&Token> {
        self.tokens.get(address)
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

impl Default for PoolGraph {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// CANDIDATE SELECTION
// ============================================

#[derive(Debug, Clone)]
pub struct CandidatePoolConfig {
    /// Highest value-locked pools overall
    pub top_n: usize,
    /// Pools directly between the pair
    pub top_n_direct: usize,
    /// Pools of each endpoint with any token
    pub top_n_token_in_out: usize,
    /// Pools of each endpoint with a base token
    pub top_n_with_base: usize,
    pub max_candidate_pools: usize,
}

impl Default for CandidatePoolConfig {
    fn default() -> Self {
        Self {
            top_n: 2,
            top_n_direct: 2,
            top_n_token_in_out: 2,
            top_n_with_base: 2,
            max_candidate_pools: 64,
        }
    }
}

fn joins(pool: &SubgraphPool, a: &Address, b: &Address) -> bool {
    (pool.token0 == *a && pool.token1 == *b) || (pool.token0 == *b && pool.token1 == *a)
}

fn touches(pool: &SubgraphPool, a: &Address) -> bool {
    pool.token0 == *a || pool.token1 == *a
}

/// Pick routing pools for the pair plus the pools needed to price gas.
/// Returns (routing pools, gas pricing pools).
pub fn select_candidate_pools(
    all: &[SubgraphPool],
    token_in: &Address,
    token_out: &Address,
    registry: &TokenRegistry,
    config: &CandidatePoolConfig,
    blacklist: &HashSet<Address>,
) -> (Vec<SubgraphPool>, Vec<SubgraphPool>) {
    let mut sorted: Vec<&SubgraphPool> = all
        .iter()
        .filter(|p| !blacklist.contains(&p.token0) && !blacklist.contains(&p.token1))
        .collect();
    sorted.sort_by(|a, b| {
        b.tvl_usd
            .partial_cmp(&a.tvl_usd)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    let bases: Vec<Address> = registry.bases.iter().map(|t| t.address).collect();
    let mut seen: HashSet<Address> = HashSet::new();
    let mut routing: Vec<SubgraphPool> = Vec::new();
    let mut take = |pred: &dyn Fn(&SubgraphPool) -> bool, n: usize, out: &mut Vec<SubgraphPool>| {
        for pool in sorted.iter().filter(|p| pred(p)).take(n) {
            if seen.insert(pool.id) {
                out.push((*pool).clone());
            }
        }
    };

    take(&|p| joins(p, token_in, token_out), config.top_n_direct, &mut routing);
    for endpoint in [token_in, token_out] {
        take(
            &|p| touches(p, endpoint) && bases.iter().any(|b| b != endpoint && touches(p, b)),
            config.top_n_with_base,
            &mut routing,
        );
        take(&|p| touches(p, endpoint), config.top_n_token_in_out, &mut routing);
    }
    // second hop: the best pool from each base to each endpoint
    for base in &bases {
        for endpoint in [token_in, token_out] {
            if base != endpoint {
                take(&|p| joins(p, base, endpoint), 1, &mut routing);
            }
        }
    }
    take(&|_| true, config.top_n, &mut routing);
    routing.truncate(config.max_candidate_pools);

    // pricing pools may overlap the routing set
    let native = registry.wrapped_native.address;
    let mut pricing: Vec<SubgraphPool> = Vec::new();
    let mut pricing_targets: Vec<Address> = registry.usd_gas_tokens.iter().map(|t| t.address).collect();
    pricing_targets.push(*token_in);
    pricing_targets.push(*token_out);
    for target in pricing_targets {
        if target == native {
            continue;
        }
        if let Some(pool) = sorted.iter().find(|p| joins(p, &native, &target)) {
            if !pricing.iter().any(|p| p.id == pool.id) {
                pricing.push((*pool).clone());
            }
        }
    }

    debug!(
        "Candidate pools: {} routing, {} gas pricing (from {})",
        routing.len(),
        pricing.len(),
        all.len()
    );
    (routing, pricing)
}

// ============================================
// CANDIDATE POOLS
// ============================================

/// Everything the search and the gas model need for one request
#[derive(Debug, Clone)]
pub struct CandidatePools {
    pub graph: PoolGraph,
    /// Pricing pools keyed by the non-native token they pair with
    pub native_pools: HashMap<Address, Pool>,
    pub usd_pool: Option<(Token, Pool)>,
    pub block_number: u64,
}

impl CandidatePools {
    /// Deepest pool between wrapped native and `token`
    pub fn native_pool_for(&self, token: &Address) -> Option<&Pool> {
        self.native_pools.get(token)
    }

    pub fn pricing_pools(&self) -> Vec<Pool> {
        let mut pools: Vec<Pool> = self.native_pools.values().cloned().collect();
        if let Some((_, pool)) = &self.usd_pool {
            if !pools.iter().any(|p| p.address == pool.address) {
                pools.push(pool.clone());
            }
        }
        pools.sort_by_key(|p| p.address);
        pools
    }
}

/// Pick the USD reference pool: first USD token (in priority order) that has
/// a liquid pool against wrapped native, and among its pools the deepest
pub fn choose_usd_pool(registry: &TokenRegistry, pools: &[Pool]) -> Option<(Token, Pool)> {
    let native = &registry.wrapped_native;
    registry.usd_gas_tokens.iter().find_map(|usd| {
        pools
            .iter()
            .filter(|p| p.involves(native) && p.involves(usd) && p.has_liquidity())
            .max_by(|a, b| a.liquidity().cmp(&b.liquidity()).then_with(|| b.address.cmp(&a.address)))
            .map(|p| (usd.clone(), p.clone()))
    })
}

/// Deepest pool between wrapped native and each other token
pub fn index_native_pools(registry: &TokenRegistry, pools: &[Pool]) -> HashMap<Address, Pool> {
    let native = &registry.wrapped_native;
    let mut best: HashMap<Address, Pool> = HashMap::new();
    for pool in pools.iter().filter(|p| p.involves(native) && p.has_liquidity()) {
        let Some(other) = pool.other(native) else {
            continue;
        };
        match best.get(&other.address) {
            Some(current) if current.liquidity() >= pool.liquidity() => {}
            _ => {
                best.insert(other.address, pool.clone());
            }
        }
    }
    best
}

pub struct CandidatePoolsBuilder {
    registry: Arc<TokenRegistry>,
    sources: Vec<Arc<dyn PoolSource>>,
    token_provider: Arc<dyn TokenProvider>,
    state_provider: Arc<dyn PoolStateProvider>,
    config: CandidatePoolConfig,
    blacklist: HashSet<Address>,
}

impl CandidatePoolsBuilder {
    pub fn new(
        registry: Arc<TokenRegistry>,
        sources: Vec<Arc<dyn PoolSource>>,
        token_provider: Arc<dyn TokenProvider>,
        state_provider: Arc<dyn PoolStateProvider>,
        config: CandidatePoolConfig,
        blacklist: HashSet<Address>,
    ) -> Self {
        Self {
            registry,
            sources,
            token_provider,
            state_provider,
            config,
            blacklist,
        }
    }

    pub async fn build(
        &self,
        token_in: &Token,
        token_out: &Token,
        protocols: &[Protocol],
        block_number: u64,
    ) -> RouterResult<CandidatePools> {
        let sources: Vec<&Arc<dyn PoolSource>> = self
            .sources
            .iter()
            .filter(|s| protocols.contains(&s.protocol()))
            .collect();
        if sources.is_empty() {
            return Err(RouterError::invalid(format!(
                "no pool source configured for protocols {:?}",
                protocols
            )));
        }

        let fetched = join_all(sources.iter().map(|s| s.get_pools(Some(block_number)))).await;
        let mut indexed = Vec::new();
        for result in fetched {
            indexed.extend(result?);
        }

        let (routing, pricing) = select_candidate_pools(
            &indexed,
            &token_in.address,
            &token_out.address,
            &self.registry,
            &self.config,
            &self.blacklist,
        );

        let addresses: Vec<Address> = routing
            .iter()
            .chain(pricing.iter())
            .flat_map(|p| [p.token0, p.token1])
            .collect();
        let accessor = match self.token_provider.get_tokens(&addresses).await {
            Ok(accessor) => accessor,
            Err(e) => {
                warn!("Token metadata unavailable, using known tokens only: {}", e);
                TokenAccessor::from_tokens(self.registry.known_tokens().cloned())
            }
        };

        let describe = |pools: &[SubgraphPool]| -> Vec<PoolDescriptor> {
            pools
                .iter()
                .filter_map(|p| {
                    Some(PoolDescriptor {
                        address: p.id,
                        token0: accessor.get_by_address(&p.token0)?.clone(),
                        token1: accessor.get_by_address(&p.token1)?.clone(),
                        fee: p.fee_tier,
                        protocol: p.protocol,
                    })
                })
                .collect()
        };
        let routing_descriptors = describe(&routing);
        let pricing_descriptors = describe(&pricing);
        let routing_count = routing_descriptors.len();

        let mut all_descriptors = routing_descriptors;
        all_descriptors.extend(pricing_descriptors);
        let mut unique = HashSet::new();
        all_descriptors.retain(|d| unique.insert(d.address));

        let refreshed = self
            .state_provider
            .get_pools(&all_descriptors, block_number)
            .await
            .map_err(|e| RouterError::PoolSourceUnavailable {
                attempts: 1,
                reason: format!("pool state refresh failed: {}", e),
            })?;

        let routing_ids: HashSet<Address> = all_descriptors[..routing_count]
            .iter()
            .map(|d| d.address)
            .collect();
        let routing_pools: Vec<Pool> = refreshed
            .iter()
            .filter(|p| routing_ids.contains(&p.address))
            .cloned()
            .collect();

        let graph = PoolGraph::from_pools(routing_pools);
        let native_pools = index_native_pools(&self.registry, &refreshed);
        let usd_pool = choose_usd_pool(&self.registry, &refreshed);

        if usd_pool.is_none() {
            warn!("No USD pool against wrapped native; gas will not be priced in USD");
        }

        Ok(CandidatePools {
            graph,
            native_pools,
            usd_pool,
            block_number,
        })
    }

    /// Re-read already known pools at `block_number` without going back to
    /// the pool sources. Fails if any routing pool is no longer readable.
    pub async fn refresh(&self, routing: &[Pool], pricing: &[Pool], block_number: u64) -> RouterResult<CandidatePools> {
        let mut descriptors: Vec<PoolDescriptor> = routing.iter().chain(pricing.iter()).map(PoolDescriptor::from).collect();
        let mut unique = HashSet::new();
        descriptors.retain(|d| unique.insert(d.address));

        let refreshed = self
            .state_provider
            .get_pools(&descriptors, block_number)
            .await
            .map_err(|e| RouterError::PoolSourceUnavailable {
                attempts: 1,
                reason: format!("pool state refresh failed: {}", e),
            })?;

        let mut routing_pools = Vec::with_capacity(routing.len());
        for pool in routing {
            match refreshed.iter().find(|p| p.address == pool.address) {
                Some(fresh) => routing_pools.push(fresh.clone()),
                None => {
                    return Err(RouterError::no_route(format!(
                        "pool {:?} unreadable at block {}",
                        pool.address, block_number
                    )))
                }
            }
        }
        debug!(
            "Refreshed {} routing and {} pricing pools at block {}",
            routing_pools.len(),
            pricing.len(),
            block_number
        );

        Ok(CandidatePools {
            graph: PoolGraph::from_pools(routing_pools),
            native_pools: index_native_pools(&self.registry, &refreshed),
            usd_pool: choose_usd_pool(&self.registry, &refreshed),
            block_number,
        })
    }
}
