//! End-to-end routing over in-memory pool data: discovery, refresh,
//! quoting, optimization and the route cache, with no network access.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use swap_router::cache::{CachedRouteStore, InMemoryCache};
use swap_router::cartographer::{
    BlockNumberProvider, CandidatePoolConfig, CandidatePoolsBuilder, Pool, PoolDescriptor, PoolKind, PoolSource,
    PoolStateProvider, Protocol, SubgraphPool, TokenAccessor, TokenProvider,
};
use swap_router::error::{ProviderError, ProviderResult, RouterResult};
use swap_router::gas_model::{L1GasData, L2GasDataProvider};
use swap_router::gas_oracle::StaticGasPrice;
use swap_router::simulator::{BatchConfig, BatchedQuoteFetcher, LocalQuoter};
use swap_router::{
    ChainId, Currency, RouterConfig, RouterError, RoutingOptions, SwapRequest, SwapRouter, Token, TokenRegistry,
    TradeType,
};

// ============================================
// FAKES
// ============================================

struct StaticPools {
    pools: Vec<SubgraphPool>,
    calls: AtomicUsize,
}

#[async_trait]
impl PoolSource for StaticPools {
    fn protocol(&self) -> Protocol {
        Protocol::V2
    }

    async fn get_pools(&self, _block_number: Option<u64>) -> RouterResult<Vec<SubgraphPool>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pools.clone())
    }
}

struct KnownTokens(Vec<Token>);

#[async_trait]
impl TokenProvider for KnownTokens {
    async fn get_tokens(&self, _addresses: &[Address]) -> ProviderResult<TokenAccessor> {
        Ok(TokenAccessor::from_tokens(self.0.clone()))
    }
}

struct SnapshotState(HashMap<Address, Pool>);

#[async_trait]
impl PoolStateProvider for SnapshotState {
    async fn get_pools(&self, pools: &[PoolDescriptor], _block_number: u64) -> ProviderResult<Vec<Pool>> {
        Ok(pools.iter().filter_map(|d| self.0.get(&d.address).cloned()).collect())
    }
}

struct FixedBlock(Option<u64>);

#[async_trait]
impl BlockNumberProvider for FixedBlock {
    async fn block_number(&self) -> ProviderResult<u64> {
        self.0
            .ok_or_else(|| ProviderError::Transport("connection refused".to_string()))
    }
}

struct FixedL1Data(L1GasData);

#[async_trait]
impl L2GasDataProvider for FixedL1Data {
    async fn gas_data(&self, _block_number: u64) -> ProviderResult<L1GasData> {
        Ok(self.0)
    }
}

// ============================================
// FIXTURE
// ============================================

fn units(n: u64, decimals: u8) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(decimals))
}

struct Fixture {
    registry: Arc<TokenRegistry>,
    weth: Token,
    usdc: Token,
    source: Arc<StaticPools>,
    router: SwapRouter,
}

const DEEP: u8 = 0xA1;
const SHALLOW: u8 = 0xB2;

/// `chain_head` is what the block provider reports; `None` makes it fail
fn fixture(with_pools: bool, chain_head: Option<u64>) -> Fixture {
    let registry = Arc::new(TokenRegistry::for_chain(ChainId::Mode));
    let weth = registry.wrapped_native.clone();
    let usdc = registry
        .by_symbol("USDC")
        .cloned()
        .expect("USDC is a Mode base token");

    // same price, different depth
    let specs = [(DEEP, 1_000u64, 3_000_000u64, 6_000_000.0), (SHALLOW, 500, 1_500_000, 3_000_000.0)];
    let mut indexed = Vec::new();
    let mut snapshots = HashMap::new();
    if with_pools {
        for (id, weth_reserve, usdc_reserve, tvl_usd) in specs {
            let address = Address::with_last_byte(id);
            let (reserve0, reserve1) = if weth.sorts_before(&usdc) {
                (units(weth_reserve, 18), units(usdc_reserve, 6))
            } else {
                (units(usdc_reserve, 6), units(weth_reserve, 18))
            };
            let pool = Pool::new(
                address,
                weth.clone(),
                usdc.clone(),
                3000,
                PoolKind::ConstantProduct { reserve0, reserve1 },
            );
            indexed.push(SubgraphPool {
                id: address,
                token0: pool.token0.address,
                token1: pool.token1.address,
                fee_tier: 3000,
                liquidity: 1,
                tvl_eth: tvl_usd / 3_000.0,
                tvl_usd,
                protocol: Protocol::V2,
            });
            snapshots.insert(address, pool);
        }
    }

    let source = Arc::new(StaticPools {
        pools: indexed,
        calls: AtomicUsize::new(0),
    });
    let pools = CandidatePoolsBuilder::new(
        registry.clone(),
        vec![source.clone() as Arc<dyn PoolSource>],
        Arc::new(KnownTokens(registry.known_tokens().cloned().collect())),
        Arc::new(SnapshotState(snapshots)),
        CandidatePoolConfig::default(),
        HashSet::new(),
    );
    let quotes = BatchedQuoteFetcher::new(Arc::new(LocalQuoter), BatchConfig::default());
    let route_cache = CachedRouteStore::new(
        Arc::new(InMemoryCache::new(Some(Duration::from_secs(60)))),
        Duration::from_secs(60),
        2,
    );
    let router = SwapRouter::new(
        registry.clone(),
        pools,
        quotes,
        Arc::new(StaticGasPrice(U256::from(1_000_000_000u64))),
        Arc::new(FixedBlock(chain_head)),
        route_cache,
        RouterConfig::default(),
    );

    Fixture {
        registry,
        weth,
        usdc,
        source,
        router,
    }
}

fn v2_options() -> RoutingOptions {
    RoutingOptions {
        protocols: vec![Protocol::V2],
        ..RoutingOptions::default()
    }
}

fn sell_weth(f: &Fixture, amount: U256) -> SwapRequest {
    SwapRequest {
        token_in: Currency::Token(f.weth.clone()),
        token_out: Currency::Token(f.usdc.clone()),
        amount,
        trade_type: TradeType::ExactInput,
    }
}

// ============================================
// SCENARIOS
// ============================================

#[tokio::test]
async fn test_large_trade_splits_across_pools() {
    let f = fixture(true, Some(100));
    let route = assert_ok!(
        f.router
            .find_best_swap_route(sell_weth(&f, units(100, 18)), v2_options())
            .await
    );

    assert_eq!(route.block_number, 100);
    assert_eq!(route.percent_total(), 100);
    assert_eq!(route.route.len(), 2);
    assert!(route.quote_gas_adjusted.value <= route.quote.value);
    assert!(route.estimated_gas_used > U256::ZERO);
    assert!(route.l1_fee.is_none());
    assert!(route.method_parameters.is_none());

    let share = |id: u8| {
        route
            .route
            .iter()
            .find(|r| r.route.pools[0].address == Address::with_last_byte(id))
            .map(|r| r.percent)
            .unwrap_or(0)
    };
    assert!(share(DEEP) > share(SHALLOW));

    // no pool is used twice across the split
    let mut seen = HashSet::new();
    for sub in &route.route {
        for pool in &sub.route.pools {
            assert!(seen.insert(pool.address));
        }
    }
}

#[tokio::test]
async fn test_exact_output_quotes_input() {
    let f = fixture(true, Some(100));
    let request = SwapRequest {
        token_in: Currency::Native(ChainId::Mode),
        token_out: Currency::Token(f.usdc.clone()),
        amount: units(3_000, 6),
        trade_type: TradeType::ExactOutput,
    };
    let route = assert_ok!(f.router.find_best_swap_route(request, v2_options()).await);

    assert_eq!(route.trade_type, TradeType::ExactOutput);
    assert_eq!(route.amount.quotient(), units(3_000, 6));
    assert!(route.quote.quotient() > U256::ZERO);
    assert!(route.quote_gas_adjusted.value >= route.quote.value);
    assert_eq!(route.quote.token, f.weth);
}

#[tokio::test]
async fn test_repeat_request_is_served_from_cache() {
    let f = fixture(true, Some(100));
    let first = assert_ok!(
        f.router
            .find_best_swap_route(sell_weth(&f, units(50, 18)), v2_options())
            .await
    );
    let second = assert_ok!(
        f.router
            .find_best_swap_route(sell_weth(&f, units(50, 18)), v2_options())
            .await
    );

    assert_eq!(first, second);
    assert_eq!(f.source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_zero_amount_is_rejected() {
    let f = fixture(true, Some(100));
    let err = assert_err!(
        f.router
            .find_best_swap_route(sell_weth(&f, U256::ZERO), v2_options())
            .await
    );
    assert!(matches!(err, RouterError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_native_and_wrapped_are_the_same_token() {
    let f = fixture(true, Some(100));
    let request = SwapRequest {
        token_in: Currency::Native(ChainId::Mode),
        token_out: Currency::Token(f.weth.clone()),
        amount: units(1, 18),
        trade_type: TradeType::ExactInput,
    };
    let err = assert_err!(f.router.find_best_swap_route(request, v2_options()).await);
    assert!(matches!(err, RouterError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_wrong_chain_is_rejected() {
    let f = fixture(true, Some(100));
    let mainnet = TokenRegistry::for_chain(ChainId::Mainnet);
    let request = SwapRequest {
        token_in: Currency::Token(mainnet.wrapped_native.clone()),
        token_out: Currency::Token(f.usdc.clone()),
        amount: units(1, 18),
        trade_type: TradeType::ExactInput,
    };
    let err = assert_err!(f.router.find_best_swap_route(request, v2_options()).await);
    assert!(matches!(err, RouterError::InvalidRequest(_)));
    assert_eq!(f.registry.chain_id, ChainId::Mode);
}

#[tokio::test]
async fn test_no_pools_means_no_route() {
    let f = fixture(false, Some(100));
    let err = assert_err!(
        f.router
            .find_best_swap_route(sell_weth(&f, units(1, 18)), v2_options())
            .await
    );
    assert!(matches!(err, RouterError::NoRouteFound(_)));
}

#[tokio::test]
async fn test_block_number_failure_surfaces() {
    let f = fixture(true, None);
    let err = assert_err!(
        f.router
            .find_best_swap_route(sell_weth(&f, units(1, 18)), v2_options())
            .await
    );
    assert!(matches!(err, RouterError::BlockNumberUnavailable(_)));
    assert_eq!(f.source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_pinned_block_skips_block_provider() {
    let f = fixture(true, None);
    let options = RoutingOptions {
        block_number: Some(42),
        ..v2_options()
    };
    let route = assert_ok!(f.router.find_best_swap_route(sell_weth(&f, units(1, 18)), options).await);
    assert_eq!(route.block_number, 42);
}

#[tokio::test]
async fn test_split_amounts_cover_the_full_request() {
    let f = fixture(true, Some(100));
    let amount = units(100, 18) + U256::from(7u8);
    let route = assert_ok!(f.router.find_best_swap_route(sell_weth(&f, amount), v2_options()).await);
    assert_eq!(route.route.len(), 2);
    assert_eq!(route.amount.quotient(), amount);
    let allotted = route.route.iter().fold(U256::ZERO, |acc, r| acc + r.amount.quotient());
    assert_eq!(allotted, amount);

    let exact = units(150_000, 6) + U256::from(3u8);
    let request = SwapRequest {
        token_in: Currency::Token(f.weth.clone()),
        token_out: Currency::Token(f.usdc.clone()),
        amount: exact,
        trade_type: TradeType::ExactOutput,
    };
    let route = assert_ok!(f.router.find_best_swap_route(request, v2_options()).await);
    let allotted = route.route.iter().fold(U256::ZERO, |acc, r| acc + r.amount.quotient());
    assert_eq!(route.amount.quotient(), exact);
    assert_eq!(allotted, exact);
}

#[tokio::test]
async fn test_zero_hops_is_rejected() {
    let f = fixture(true, Some(100));
    let options = RoutingOptions {
        max_hops: 0,
        ..v2_options()
    };
    let err = assert_err!(f.router.find_best_swap_route(sell_weth(&f, units(1, 18)), options).await);
    assert!(matches!(err, RouterError::InvalidRequest(_)));
    assert_eq!(f.source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_l1_data_fee_is_charged_on_mode() {
    let amount = units(100, 18);

    let plain = fixture(true, Some(100));
    let baseline = assert_ok!(
        plain
            .router
            .find_best_swap_route(sell_weth(&plain, amount), v2_options())
            .await
    );
    assert!(baseline.l1_fee.is_none());

    let Fixture { weth, usdc, router, .. } = fixture(true, Some(100));
    let router = router.with_l2_gas_data(Arc::new(FixedL1Data(L1GasData {
        l1_base_fee: U256::from(10_000_000_000u64),
        overhead: U256::from(188u64),
        scalar: U256::from(684_000u64),
        decimals: U256::from(6u8),
    })));
    let request = SwapRequest {
        token_in: Currency::Token(weth),
        token_out: Currency::Token(usdc),
        amount,
        trade_type: TradeType::ExactInput,
    };
    let charged = assert_ok!(router.find_best_swap_route(request, v2_options()).await);

    let fee = charged.l1_fee.clone().expect("Mode charges an L1 fee");
    assert!(fee.l1_gas_used > U256::ZERO);
    assert!(fee.l2_gas_equivalent > U256::ZERO);

    // the fee is far below the split gain, so the same split wins
    assert_eq!(charged.route, baseline.route);
    assert_eq!(charged.quote, baseline.quote);
    assert_eq!(
        charged.estimated_gas_used,
        baseline.estimated_gas_used + fee.l2_gas_equivalent
    );

    let priced = charged.gas_cost_in_token.sub(&baseline.gas_cost_in_token);
    assert!(priced.value > swap_router::Fraction::from_integer(0.into()));
    assert_eq!(
        charged.quote_gas_adjusted,
        baseline.quote_gas_adjusted.sub(&priced)
    );
}
