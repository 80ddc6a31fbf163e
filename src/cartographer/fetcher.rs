//! Pool State Fetcher - MULTICALL3 Edition
//!
//! Turns indexed pool metadata into `Pool` snapshots pinned to one block:
//! slot0 + liquidity for concentrated-liquidity pools, getReserves for
//! constant-product pairs. A pool whose reads fail is left out.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::multicall::MulticallProvider;
use super::pool::{Pool, PoolKind, Protocol};
use crate::error::ProviderResult;
use crate::tokens::Token;

// ============================================
// POOL INTERFACES
// ============================================

sol! {
    interface IUniswapV3Pool {
        function slot0() external view returns (
            uint160 sqrtPriceX96, int24 tick, uint16 observationIndex,
            uint16 observationCardinality, uint16 observationCardinalityNext,
            uint8 feeProtocol, bool unlocked
        );
        function liquidity() external view returns (uint128);
    }

    interface IUniswapV2Pair {
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    }
}

// ============================================
// TYPES
// ============================================

/// Enough to locate a pool and read its state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolDescriptor {
    pub address: Address,
    pub token0: Token,
    pub token1: Token,
    pub fee: u32,
    pub protocol: Protocol,
}

impl From<&Pool> for PoolDescriptor {
    fn from(pool: &Pool) -> Self {
        Self {
            address: pool.address,
            token0: pool.token0.clone(),
            token1: pool.token1.clone(),
            fee: pool.fee,
            protocol: pool.protocol(),
        }
    }
}

#[async_trait]
pub trait PoolStateProvider: Send + Sync {
    /// Snapshots at `block_number`; unreadable pools are omitted
    async fn get_pools(&self, pools: &[PoolDescriptor], block_number: u64) -> ProviderResult<Vec<Pool>>;
}

// ============================================
// ON-CHAIN IMPLEMENTATION
// ============================================

pub struct OnChainPoolStateProvider {
    multicall: Arc<dyn MulticallProvider>,
}

impl OnChainPoolStateProvider {
    pub fn new(multicall: Arc<dyn MulticallProvider>) -> Self {
        Self { multicall }
    }
}

#[async_trait]
impl PoolStateProvider for OnChainPoolStateProvider {
    async fn get_pools(&self, pools: &[PoolDescriptor], block_number: u64) -> ProviderResult<Vec<Pool>> {
        let slot0: Bytes = IUniswapV3Pool::slot0Call {}.abi_encode().into();
        let liquidity: Bytes = IUniswapV3Pool::liquidityCall {}.abi_encode().into();
        let reserves: Bytes = IUniswapV2Pair::getReservesCall {}.abi_encode().into();

        // (descriptor, index of first result)
        let mut calls: Vec<(Address, Bytes)> = Vec::new();
        let mut offsets = Vec::with_capacity(pools.len());
        for descriptor in pools {
            offsets.push(calls.len());
            match descriptor.protocol {
                Protocol::V3 => {
                    calls.push((descriptor.address, slot0.clone()));
                    calls.push((descriptor.address, liquidity.clone()));
                }
                Protocol::V2 => calls.push((descriptor.address, reserves.clone())),
            }
        }

        let results = self.multicall.aggregate(calls, Some(block_number), None).await?;

        let mut snapshots = Vec::with_capacity(pools.len());
        for (descriptor, offset) in pools.iter().zip(offsets) {
            let kind = match descriptor.protocol {
                Protocol::V3 => {
                    let state = results
                        .get(offset)
                        .and_then(|r| r.decode::<IUniswapV3Pool::slot0Call>());
                    let active = results
                        .get(offset + 1)
                        .and_then(|r| r.decode::<IUniswapV3Pool::liquidityCall>());
                    match (state, active) {
                        (Some(s), Some(l)) => Some(PoolKind::ConcentratedLiquidity {
                            sqrt_price_x96: U256::from(s.sqrtPriceX96),
                            tick: s.tick.as_i32(),
                            liquidity: l,
                            ticks: Vec::new(),
                        }),
                        _ => None,
                    }
                }
                Protocol::V2 => results
                    .get(offset)
                    .and_then(|r| r.decode::<IUniswapV2Pair::getReservesCall>())
                    .map(|r| PoolKind::ConstantProduct {
                        reserve0: U256::from(r.reserve0),
                        reserve1: U256::from(r.reserve1),
                    }),
            };

            match kind {
                Some(kind) => snapshots.push(Pool::new(
                    descriptor.address,
                    descriptor.token0.clone(),
                    descriptor.token1.clone(),
                    descriptor.fee,
                    kind,
                )),
                None => debug!("Dropping pool {:?}: state unreadable", descriptor.address),
            }
        }

        info!(
            "Refreshed {}/{} pools at block {}",
            snapshots.len(),
            pools.len(),
            block_number
        );
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartographer::multicall::CallResult;
    use crate::tokens::{ChainId, TokenRegistry};
    use alloy_primitives::address;

    fn words(values: &[U256]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes::<32>()).collect()
    }

    const GOOD_V3: Address = address!("0000000000000000000000000000000000000301");
    const BROKEN_V3: Address = address!("0000000000000000000000000000000000000302");
    const GOOD_V2: Address = address!("0000000000000000000000000000000000000201");

    struct FakePools;

    #[async_trait]
    impl MulticallProvider for FakePools {
        async fn aggregate(
            &self,
            calls: Vec<(Address, Bytes)>,
            block_number: Option<u64>,
            _gas_limit: Option<u64>,
        ) -> ProviderResult<Vec<CallResult>> {
            assert_eq!(block_number, Some(77));
            Ok(calls
                .into_iter()
                .map(|(target, data)| {
                    if target == BROKEN_V3 {
                        return CallResult::failed();
                    }
                    if data.starts_with(&IUniswapV3Pool::slot0Call::SELECTOR) {
                        // tick -5 sign-extended to a full word
                        let tick = U256::MAX - U256::from(4u8);
                        let one = U256::from(1u8);
                        CallResult::ok(words(&[
                            one << 96,
                            tick,
                            U256::ZERO,
                            one,
                            one,
                            U256::ZERO,
                            one,
                        ]))
                    } else if data.starts_with(&IUniswapV3Pool::liquidityCall::SELECTOR) {
                        CallResult::ok(words(&[U256::from(5_000u64)]))
                    } else {
                        CallResult::ok(words(&[U256::from(10u64), U256::from(20u64), U256::ZERO]))
                    }
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_refresh_mixed_protocols() {
        let registry = TokenRegistry::for_chain(ChainId::Mode);
        let weth = registry.wrapped_native.clone();
        let usdc = registry.by_symbol("USDC").cloned().unwrap();
        let descriptor = |address, protocol| PoolDescriptor {
            address,
            token0: weth.clone(),
            token1: usdc.clone(),
            fee: 3000,
            protocol,
        };

        let provider = OnChainPoolStateProvider::new(Arc::new(FakePools));
        let pools = provider
            .get_pools(
                &[
                    descriptor(GOOD_V3, Protocol::V3),
                    descriptor(BROKEN_V3, Protocol::V3),
                    descriptor(GOOD_V2, Protocol::V2),
                ],
                77,
            )
            .await
            .unwrap();

        assert_eq!(pools.len(), 2);
        match &pools[0].kind {
            PoolKind::ConcentratedLiquidity { tick, liquidity, .. } => {
                assert_eq!(*tick, -5);
                assert_eq!(*liquidity, 5_000);
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert_eq!(pools[1].protocol(), Protocol::V2);
    }
}
