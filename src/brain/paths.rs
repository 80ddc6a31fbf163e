//! Candidate Path Enumerator
//!
//! Step 2.1: The Pathfinder
//!
//! Depth-first walk of the pool graph producing every simple path from the
//! input token to the output token within the hop limit. A path never
//! revisits a token or a pool. Paths are ordered shortest first, then by how
//! few of their intermediate tokens are outside the routing bases, so the
//! cap on candidate paths keeps the ones through liquid hubs.

use alloy_primitives::{Address, Bytes};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::cartographer::{Pool, PoolGraph, Protocol};
use crate::error::{RouterError, RouterResult};
use crate::tokens::{Token, TokenRegistry};

// ============================================
// ROUTE
// ============================================

/// A connected sequence of pools from `input` to `output`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub pools: Vec<Pool>,
    pub input: Token,
    pub output: Token,
    path: Vec<Token>,
}

impl Route {
    /// Validates connectivity and rebuilds the token path
    pub fn new(pools: Vec<Pool>, input: Token, output: Token) -> RouterResult<Self> {
        if pools.is_empty() {
            return Err(RouterError::invalid("route has no pools"));
        }

        let protocol = pools[0].protocol();
        let mut path = vec![input.clone()];
        let mut seen_pools = HashSet::new();
        for pool in &pools {
            if pool.protocol() != protocol {
                return Err(RouterError::invalid("route mixes pool protocols"));
            }
            if !seen_pools.insert(pool.address) {
                return Err(RouterError::invalid(format!("pool {:?} used twice", pool.address)));
            }
            let current = &path[path.len() - 1];
            let next = pool
                .other(current)
                .ok_or_else(|| RouterError::invalid(format!("pool {:?} does not hold {}", pool.address, current)))?
                .clone();
            if path.contains(&next) {
                return Err(RouterError::invalid(format!("route revisits {}", next)));
            }
            path.push(next);
        }

        if path[path.len() - 1] != output {
            return Err(RouterError::invalid(format!(
                "route ends at {} instead of {}",
                path[path.len() - 1],
                output
            )));
        }

        Ok(Self {
            pools,
            input,
            output,
            path,
        })
    }

    /// Always `pools.len() + 1` tokens, input first
    pub fn token_path(&self) -> &[Token] {
        &self.path
    }

    pub fn hops(&self) -> usize {
        self.pools.len()
    }

    pub fn protocol(&self) -> Protocol {
        self.pools[0].protocol()
    }

    pub fn pool_addresses(&self) -> Vec<Address> {
        self.pools.iter().map(|p| p.address).collect()
    }

    pub fn shares_pool_with(&self, other: &Route) -> bool {
        self.pools
            .iter()
            .any(|p| other.pools.iter().any(|q| q.address == p.address))
    }

    /// Same route regardless of pool state
    pub fn same_path(&self, other: &Route) -> bool {
        self.pool_addresses() == other.pool_addresses() && self.input == other.input
    }

    /// Packed `token (20) | fee (3) | token (20) ...` path used by QuoterV2 and
    /// SwapRouter02. Exact-output paths run from output back to input.
    pub fn encode_v3_path(&self, exact_output: bool) -> Bytes {
        let mut tokens: Vec<&Token> = self.path.iter().collect();
        let mut fees: Vec<u32> = self.pools.iter().map(|p| p.fee).collect();
        if exact_output {
            tokens.reverse();
            fees.reverse();
        }

        let mut packed = Vec::with_capacity(20 + fees.len() * 23);
        packed.extend_from_slice(tokens[0].address.as_slice());
        for (fee, token) in fees.iter().zip(tokens.iter().skip(1)) {
            packed.extend_from_slice(&fee.to_be_bytes()[1..]);
            packed.extend_from_slice(token.address.as_slice());
        }
        packed.into()
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbols: Vec<&str> = self.path.iter().map(|t| t.symbol.as_str()).collect();
        write!(f, "{}", symbols.join(" → "))
    }
}

// ============================================
// ENUMERATION
// ============================================

#[derive(Debug, Clone)]
pub struct PathConfig {
    pub max_hops: usize,
    pub max_candidate_paths: usize,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            max_hops: 3,
            max_candidate_paths: 32,
        }
    }
}

pub struct PathFinder<'a> {
    graph: &'a PoolGraph,
    registry: &'a TokenRegistry,
    config: PathConfig,
}

impl<'a> PathFinder<'a> {
    pub fn new(graph: &'a PoolGraph, registry: &'a TokenRegistry, config: PathConfig) -> Self {
        Self {
            graph,
            registry,
            config,
        }
    }

    pub fn compute_all_routes(&self, token_in: &Token, token_out: &Token) -> RouterResult<Vec<Route>> {
        if token_in.address == token_out.address {
            return Err(RouterError::invalid(format!(
                "input and output are the same token {:?}",
                token_in.address
            )));
        }

        let mut found: Vec<Vec<Pool>> = Vec::new();
        let mut stack: Vec<Pool> = Vec::new();
        let mut visited: HashSet<Address> = HashSet::from([token_in.address]);
        self.walk(&token_in.address, &token_out.address, &mut stack, &mut visited, &mut found);

        let mut routes: Vec<Route> = found
            .into_iter()
            .filter_map(|pools| Route::new(pools, token_in.clone(), token_out.clone()).ok())
            .collect();

        routes.sort_by(|a, b| {
            a.hops()
                .cmp(&b.hops())
                .then_with(|| self.non_base_hops(a).cmp(&self.non_base_hops(b)))
                .then_with(|| a.pool_addresses().cmp(&b.pool_addresses()))
        });

        let total = routes.len();
        routes.truncate(self.config.max_candidate_paths);

        info!(
            "Found {} candidate paths {} → {} (kept {}, max {} hops)",
            total,
            token_in.symbol,
            token_out.symbol,
            routes.len(),
            self.config.max_hops
        );
        for route in &routes {
            debug!("  {} [{}]", route, route.protocol());
        }
        Ok(routes)
    }

    fn walk(
        &self,
        current: &Address,
        target: &Address,
        stack: &mut Vec<Pool>,
        visited: &mut HashSet<Address>,
        found: &mut Vec<Vec<Pool>>,
    ) {
        if stack.len() >= self.config.max_hops {
            return;
        }

        for pool in self.graph.pools_for(current) {
            // single-protocol routes only
            if let Some(first) = stack.first() {
                if first.protocol() != pool.protocol() {
                    continue;
                }
            }
            if stack.iter().any(|p| p.address == pool.address) {
                continue;
            }
            let next = if pool.token0.address == *current {
                pool.token1.address
            } else {
                pool.token0.address
            };

            if next == *target {
                let mut path = stack.clone();
                path.push(pool.clone());
                found.push(path);
                continue;
            }
            if !visited.insert(next) {
                continue;
            }
            stack.push(pool.clone());
            self.walk(&next, target, stack, visited, found);
            stack.pop();
            visited.remove(&next);
        }
    }

    fn non_base_hops(&self, route: &Route) -> usize {
        let path = route.token_path();
        path[1..path.len() - 1]
            .iter()
            .filter(|t| !self.registry.is_base(&t.address))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartographer::PoolKind;
    use crate::tokens::ChainId;
    use alloy_primitives::U256;

    fn cp(id: u8, a: &Token, b: &Token) -> Pool {
        Pool::new(
            Address::with_last_byte(id),
            a.clone(),
            b.clone(),
            3000,
            PoolKind::ConstantProduct {
                reserve0: U256::from(1_000_000u64),
                reserve1: U256::from(1_000_000u64),
            },
        )
    }

    fn token(byte: u8, symbol: &str) -> Token {
        Token::new(ChainId::Mode, Address::with_last_byte(byte), 18, symbol, symbol)
    }

    #[test]
    fn test_route_validation() {
        let registry = TokenRegistry::for_chain(ChainId::Mode);
        let a = token(0xa1, "A");
        let b = token(0xb1, "B");
        let weth = registry.wrapped_native.clone();

        let route = Route::new(vec![cp(1, &a, &weth), cp(2, &weth, &b)], a.clone(), b.clone()).unwrap();
        assert_eq!(route.token_path().len(), route.hops() + 1);
        assert_eq!(route.token_path()[0], a);
        assert_eq!(route.token_path()[2], b);

        // disconnected
        assert!(Route::new(vec![cp(1, &a, &weth), cp(3, &a, &b)], a.clone(), b.clone()).is_err());
        // wrong end
        assert!(Route::new(vec![cp(1, &a, &weth)], a.clone(), b.clone()).is_err());
        assert!(Route::new(vec![], a.clone(), b).is_err());
    }

    #[test]
    fn test_enumeration_respects_hops_and_prefers_bases() {
        let registry = TokenRegistry::for_chain(ChainId::Mode);
        let a = token(0xa1, "A");
        let b = token(0xb1, "B");
        let junk = token(0xc1, "JUNK");
        let weth = registry.wrapped_native.clone();
        let usdc = registry.by_symbol("USDC").cloned().unwrap();

        let graph = PoolGraph::from_pools(vec![
            cp(1, &a, &b),
            cp(2, &a, &weth),
            cp(3, &weth, &b),
            cp(4, &a, &junk),
            cp(5, &junk, &b),
            cp(6, &weth, &usdc),
            cp(7, &usdc, &b),
        ]);

        let finder = PathFinder::new(&graph, &registry, PathConfig { max_hops: 2, max_candidate_paths: 10 });
        let routes = finder.compute_all_routes(&a, &b).unwrap();

        assert_eq!(routes.len(), 3);
        assert_eq!(routes[0].hops(), 1);
        assert_eq!(routes[1].token_path()[1], weth);
        assert_eq!(routes[2].token_path()[1], junk);
        assert!(routes.iter().all(|r| r.hops() <= 2));

        let finder = PathFinder::new(&graph, &registry, PathConfig { max_hops: 3, max_candidate_paths: 10 });
        let routes = finder.compute_all_routes(&a, &b).unwrap();
        assert_eq!(routes.len(), 4);
        assert_eq!(routes[3].token_path().len(), 4);
    }

    #[test]
    fn test_v3_path_encoding() {
        let a = token(0xa1, "A");
        let b = token(0xb1, "B");
        let c = token(0xc1, "C");
        let v3 = |id: u8, x: &Token, y: &Token, fee: u32| {
            Pool::new(
                Address::with_last_byte(id),
                x.clone(),
                y.clone(),
                fee,
                PoolKind::ConcentratedLiquidity {
                    sqrt_price_x96: U256::from(1u8) << 96,
                    tick: 0,
                    liquidity: 1,
                    ticks: Vec::new(),
                },
            )
        };
        let route = Route::new(vec![v3(1, &a, &b, 500), v3(2, &b, &c, 3000)], a.clone(), c.clone()).unwrap();

        let forward = route.encode_v3_path(false);
        assert_eq!(forward.len(), 20 + 23 * 2);
        assert_eq!(&forward[..20], a.address.as_slice());
        assert_eq!(&forward[20..23], &[0x00, 0x01, 0xf4]);
        assert_eq!(&forward[66 - 20..], c.address.as_slice());

        let backward = route.encode_v3_path(true);
        assert_eq!(&backward[..20], c.address.as_slice());
        assert_eq!(&backward[20..23], &[0x00, 0x0b, 0xb8]);
    }

    #[test]
    fn test_same_token_rejected() {
        let registry = TokenRegistry::for_chain(ChainId::Mode);
        let graph = PoolGraph::new();
        let finder = PathFinder::new(&graph, &registry, PathConfig::default());
        let weth = registry.wrapped_native.clone();
        assert!(matches!(
            finder.compute_all_routes(&weth, &weth),
            Err(RouterError::InvalidRequest(_))
        ));
    }
}
