//! Route Quoter - Multicall + Local Simulation
//!
//! Two ways to price a whole route:
//! - `OnChainQuoter`: QuoterV2 `quoteExactInput` / `quoteExactOutput` over
//!   Multicall3 for concentrated-liquidity routes, pinned to the request
//!   block. Constant-product routes are priced locally from the refreshed
//!   reserves since a pair has no quoter.
//! - `LocalQuoter`: simulates every route against the pool snapshots.
//!
//! Each request fails independently (`None`); only a transport failure
//! fails the batch.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};

use super::swap_math::MathError;
use crate::amounts::TradeType;
use crate::brain::Route;
use crate::cartographer::{MulticallProvider, Protocol};
use crate::error::ProviderResult;

// ============================================
// SOLIDITY INTERFACES
// ============================================

sol! {
    /// Uniswap V3 QuoterV2 interface
    #[derive(Debug)]
    interface IQuoterV2 {
        function quoteExactInput(bytes memory path, uint256 amountIn)
            external
            returns (
                uint256 amountOut,
                uint160[] memory sqrtPriceX96AfterList,
                uint32[] memory initializedTicksCrossedList,
                uint256 gasEstimate
            );

        function quoteExactOutput(bytes memory path, uint256 amountOut)
            external
            returns (
                uint256 amountIn,
                uint160[] memory sqrtPriceX96AfterList,
                uint32[] memory initializedTicksCrossedList,
                uint256 gasEstimate
            );
    }
}

// ============================================
// TYPES
// ============================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub route: Route,
    /// Input for exact-in, output for exact-out
    pub amount: U256,
}

/// Quote result from simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteQuote {
    /// Output for exact-in, required input for exact-out
    pub amount: U256,
    pub initialized_ticks_crossed: u32,
    /// Gas the quoter measured, when it measures any
    pub gas_estimate: Option<U256>,
}

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// One entry per request, in order; `None` for a failed quote
    async fn quote_batch(
        &self,
        requests: &[QuoteRequest],
        trade_type: TradeType,
        block_number: u64,
        gas_limit: Option<u64>,
    ) -> ProviderResult<Vec<Option<RouteQuote>>>;
}

// ============================================
// LOCAL SIMULATION
// ============================================

/// Walk the route pool by pool against the snapshots
pub fn simulate_route(route: &Route, amount: U256, trade_type: TradeType) -> Result<RouteQuote, MathError> {
    let path = route.token_path();
    let mut running = amount;
    let mut ticks = 0u32;

    match trade_type {
        TradeType::ExactInput => {
            for (pool, token_in) in route.pools.iter().zip(path.iter()) {
                let step = pool.get_output_amount(token_in, running)?;
                running = step.amount;
                ticks = ticks.saturating_add(step.ticks_crossed);
            }
        }
        TradeType::ExactOutput => {
            for (pool, token_in) in route.pools.iter().zip(path.iter()).rev() {
                let step = pool.get_input_amount(token_in, running)?;
                running = step.amount;
                ticks = ticks.saturating_add(step.ticks_crossed);
            }
        }
    }

    if running.is_zero() {
        return Err(MathError::InsufficientLiquidity);
    }
    Ok(RouteQuote {
        amount: running,
        initialized_ticks_crossed: ticks,
        gas_estimate: None,
    })
}

fn simulate_logged(request: &QuoteRequest, trade_type: TradeType) -> Option<RouteQuote> {
    match simulate_route(&request.route, request.amount, trade_type) {
        Ok(quote) => Some(quote),
        Err(e) => {
            trace!("Local quote failed for {} ({}): {}", request.route, request.amount, e);
            None
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalQuoter;

#[async_trait]
impl QuoteProvider for LocalQuoter {
    async fn quote_batch(
        &self,
        requests: &[QuoteRequest],
        trade_type: TradeType,
        _block_number: u64,
        _gas_limit: Option<u64>,
    ) -> ProviderResult<Vec<Option<RouteQuote>>> {
        Ok(requests.iter().map(|r| simulate_logged(r, trade_type)).collect())
    }
}

// ============================================
// ON-CHAIN QUOTER
// ============================================

pub struct OnChainQuoter {
    multicall: Arc<dyn MulticallProvider>,
    quoter: Address,
}

impl OnChainQuoter {
    pub fn new(multicall: Arc<dyn MulticallProvider>, quoter: Address) -> Self {
        Self { multicall, quoter }
    }

    fn encode(request: &QuoteRequest, trade_type: TradeType) -> Bytes {
        match trade_type {
            TradeType::ExactInput => IQuoterV2::quoteExactInputCall {
                path: request.route.encode_v3_path(false),
                amountIn: request.amount,
            }
            .abi_encode()
            .into(),
            TradeType::ExactOutput => IQuoterV2::quoteExactOutputCall {
                path: request.route.encode_v3_path(true),
                amountOut: request.amount,
            }
            .abi_encode()
            .into(),
        }
    }
}

#[async_trait]
impl QuoteProvider for OnChainQuoter {
    async fn quote_batch(
        &self,
        requests: &[QuoteRequest],
        trade_type: TradeType,
        block_number: u64,
        gas_limit: Option<u64>,
    ) -> ProviderResult<Vec<Option<RouteQuote>>> {
        let mut results: Vec<Option<RouteQuote>> = vec![None; requests.len()];

        let mut onchain: Vec<usize> = Vec::new();
        for (i, request) in requests.iter().enumerate() {
            match request.route.protocol() {
                Protocol::V3 => onchain.push(i),
                Protocol::V2 => results[i] = simulate_logged(request, trade_type),
            }
        }
        if onchain.is_empty() {
            return Ok(results);
        }

        let calldatas: Vec<Bytes> = onchain
            .iter()
            .map(|&i| Self::encode(&requests[i], trade_type))
            .collect();
        let raw = self
            .multicall
            .call_same_function_on_contract_with_multiple_params(
                self.quoter,
                calldatas,
                Some(block_number),
                gas_limit,
            )
            .await?;

        for (&i, call) in onchain.iter().zip(raw.iter()) {
            results[i] = match trade_type {
                TradeType::ExactInput => call.decode::<IQuoterV2::quoteExactInputCall>().map(|r| RouteQuote {
                    amount: r.amountOut,
                    initialized_ticks_crossed: r.initializedTicksCrossedList.iter().sum(),
                    gas_estimate: Some(r.gasEstimate),
                }),
                TradeType::ExactOutput => call.decode::<IQuoterV2::quoteExactOutputCall>().map(|r| RouteQuote {
                    amount: r.amountIn,
                    initialized_ticks_crossed: r.initializedTicksCrossedList.iter().sum(),
                    gas_estimate: Some(r.gasEstimate),
                }),
            }
            .filter(|q| !q.amount.is_zero());
        }

        debug!(
            "QuoterV2: {}/{} on-chain quotes succeeded at block {}",
            onchain.iter().filter(|&&i| results[i].is_some()).count(),
            onchain.len(),
            block_number
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartographer::{CallResult, Pool, PoolKind};
    use crate::tokens::{ChainId, Token, TokenRegistry};

    fn words(values: &[U256]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes::<32>()).collect()
    }

    fn v2(id: u8, a: &Token, b: &Token, r: u64) -> Pool {
        Pool::new(
            Address::with_last_byte(id),
            a.clone(),
            b.clone(),
            3000,
            PoolKind::ConstantProduct {
                reserve0: U256::from(r),
                reserve1: U256::from(r),
            },
        )
    }

    fn v3(id: u8, a: &Token, b: &Token) -> Pool {
        Pool::new(
            Address::with_last_byte(id),
            a.clone(),
            b.clone(),
            500,
            PoolKind::ConcentratedLiquidity {
                sqrt_price_x96: U256::from(1u8) << 96,
                tick: 0,
                liquidity: 1_000_000_000_000,
                ticks: Vec::new(),
            },
        )
    }

    fn tokens() -> (Token, Token, Token) {
        let registry = TokenRegistry::for_chain(ChainId::Mode);
        (
            registry.wrapped_native.clone(),
            registry.by_symbol("USDC").cloned().unwrap(),
            registry.by_symbol("DAI").cloned().unwrap(),
        )
    }

    #[test]
    fn test_local_two_hop_matches_single_steps() {
        let (weth, usdc, dai) = tokens();
        let route = Route::new(
            vec![v2(1, &weth, &usdc, 1_000_000), v2(2, &usdc, &dai, 1_000_000)],
            weth.clone(),
            dai.clone(),
        )
        .unwrap();

        let quote = simulate_route(&route, U256::from(1_000u64), TradeType::ExactInput).unwrap();
        // 1000 -> 996 -> 992
        assert_eq!(quote.amount, U256::from(992u64));

        let back = simulate_route(&route, quote.amount, TradeType::ExactOutput).unwrap();
        assert!(back.amount <= U256::from(1_000u64));
        assert!(back.amount >= U256::from(990u64));
    }

    #[test]
    fn test_local_failure_is_none() {
        let (weth, usdc, _) = tokens();
        let route = Route::new(vec![v2(1, &weth, &usdc, 1_000)], weth, usdc).unwrap();
        let request = QuoteRequest {
            route,
            amount: U256::from(5_000u64),
        };
        // more output than the reserve holds
        assert!(simulate_logged(&request, TradeType::ExactOutput).is_none());
    }

    struct FakeQuoter;

    #[async_trait]
    impl MulticallProvider for FakeQuoter {
        async fn aggregate(
            &self,
            calls: Vec<(Address, Bytes)>,
            block_number: Option<u64>,
            _gas_limit: Option<u64>,
        ) -> ProviderResult<Vec<CallResult>> {
            assert_eq!(block_number, Some(9));
            Ok(calls
                .into_iter()
                .map(|(_, data)| {
                    let call = IQuoterV2::quoteExactInputCall::abi_decode(&data).unwrap();
                    if call.amountIn > U256::from(1_000u64) {
                        return CallResult::failed();
                    }
                    // (amountOut, uint160[1], uint32[1], gasEstimate)
                    CallResult::ok(words(&[
                        call.amountIn * U256::from(2u8),
                        U256::from(128u64),
                        U256::from(192u64),
                        U256::from(90_000u64),
                        U256::from(1u8),
                        U256::from(1u8) << 96,
                        U256::from(1u8),
                        U256::from(2u8),
                    ]))
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_onchain_mixes_protocols() {
        let (weth, usdc, _) = tokens();
        let v3_route = Route::new(vec![v3(1, &weth, &usdc)], weth.clone(), usdc.clone()).unwrap();
        let v2_route = Route::new(vec![v2(2, &weth, &usdc, 1_000_000)], weth, usdc).unwrap();

        let quoter = OnChainQuoter::new(Arc::new(FakeQuoter), Address::with_last_byte(0x99));
        let results = quoter
            .quote_batch(
                &[
                    QuoteRequest {
                        route: v3_route.clone(),
                        amount: U256::from(500u64),
                    },
                    QuoteRequest {
                        route: v2_route,
                        amount: U256::from(1_000u64),
                    },
                    QuoteRequest {
                        route: v3_route,
                        amount: U256::from(5_000u64),
                    },
                ],
                TradeType::ExactInput,
                9,
                None,
            )
            .await
            .unwrap();

        let first = results[0].unwrap();
        assert_eq!(first.amount, U256::from(1_000u64));
        assert_eq!(first.initialized_ticks_crossed, 2);
        assert_eq!(first.gas_estimate, Some(U256::from(90_000u64)));
        assert_eq!(results[1].unwrap().amount, U256::from(996u64));
        assert!(results[2].is_none());
    }
}
