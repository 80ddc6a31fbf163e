//! SwapRouter02 Calldata
//!
//! Turns a winning combination into the transaction a wallet would sign:
//! one swap call per route, wrapped in `multicall(deadline, bytes[])`,
//! followed by `unwrapWETH9` when the caller wants native out and
//! `refundETH` when native in might be over-sent on exact-output.
//!
//! Nothing here signs or broadcasts.

use alloy_primitives::{address, Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use serde::{Deserialize, Serialize};

use crate::amounts::TradeType;
use crate::brain::RouteWithValidQuote;
use crate::cartographer::Protocol;

// ============================================
// SOLIDITY INTERFACES
// ============================================

sol! {
    /// Uniswap SwapRouter02 (V3 + V2 + periphery payments)
    interface ISwapRouter02 {
        struct ExactInputParams {
            bytes path;
            address recipient;
            uint256 amountIn;
            uint256 amountOutMinimum;
        }

        struct ExactOutputParams {
            bytes path;
            address recipient;
            uint256 amountOut;
            uint256 amountInMaximum;
        }

        function exactInput(ExactInputParams calldata params) external payable returns (uint256 amountOut);
        function exactOutput(ExactOutputParams calldata params) external payable returns (uint256 amountIn);

        function swapExactTokensForTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to
        ) external payable returns (uint256 amountOut);

        function swapTokensForExactTokens(
            uint256 amountOut,
            uint256 amountInMax,
            address[] calldata path,
            address to
        ) external payable returns (uint256 amountIn);

        function multicall(uint256 deadline, bytes[] calldata data) external payable returns (bytes[] memory);
        function unwrapWETH9(uint256 amountMinimum, address recipient) external payable;
        function refundETH() external payable;
    }
}

/// SwapRouter02 reads this recipient as "keep it in the router"
pub const ADDRESS_THIS: Address = address!("0000000000000000000000000000000000000002");

const BPS: u64 = 10_000;

/// Caller-side execution parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapConfig {
    pub recipient: Address,
    /// Tolerated slippage in basis points
    pub slippage_bps: u32,
    /// Unix seconds
    pub deadline: u64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            recipient: Address::ZERO,
            slippage_bps: 50,
            deadline: u64::MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodParameters {
    pub to: Address,
    pub calldata: Bytes,
    pub value: U256,
}

/// Minimum out for exact-in (rounded down)
pub fn min_amount_out(quote: U256, slippage_bps: u32) -> U256 {
    let keep = BPS.saturating_sub(slippage_bps as u64);
    quote.saturating_mul(U256::from(keep)) / U256::from(BPS)
}

/// Maximum in for exact-out (rounded up)
pub fn max_amount_in(quote: U256, slippage_bps: u32) -> U256 {
    let allow = U256::from(BPS + slippage_bps as u64);
    let scaled = quote.saturating_mul(allow);
    let bps = U256::from(BPS);
    let floor = scaled / bps;
    if scaled % bps == U256::ZERO {
        floor
    } else {
        floor + U256::from(1u8)
    }
}

fn encode_route(
    route: &RouteWithValidQuote,
    trade_type: TradeType,
    recipient: Address,
    slippage_bps: u32,
) -> Bytes {
    let amount = route.amount.quotient();
    let quote = route.quote.quotient();
    let token_path: Vec<Address> = route.route.token_path().iter().map(|t| t.address).collect();

    let encoded = match (route.route.protocol(), trade_type) {
        (Protocol::V3, TradeType::ExactInput) => ISwapRouter02::exactInputCall {
            params: ISwapRouter02::ExactInputParams {
                path: route.route.encode_v3_path(false),
                recipient,
                amountIn: amount,
                amountOutMinimum: min_amount_out(quote, slippage_bps),
            },
        }
        .abi_encode(),
        (Protocol::V3, TradeType::ExactOutput) => ISwapRouter02::exactOutputCall {
            params: ISwapRouter02::ExactOutputParams {
                path: route.route.encode_v3_path(true),
                recipient,
                amountOut: amount,
                amountInMaximum: max_amount_in(quote, slippage_bps),
            },
        }
        .abi_encode(),
        (Protocol::V2, TradeType::ExactInput) => ISwapRouter02::swapExactTokensForTokensCall {
            amountIn: amount,
            amountOutMin: min_amount_out(quote, slippage_bps),
            path: token_path,
            to: recipient,
        }
        .abi_encode(),
        (Protocol::V2, TradeType::ExactOutput) => ISwapRouter02::swapTokensForExactTokensCall {
            amountOut: amount,
            amountInMax: max_amount_in(quote, slippage_bps),
            path: token_path,
            to: recipient,
        }
        .abi_encode(),
    };
    encoded.into()
}

/// Build the SwapRouter02 transaction for a combination of routes
pub fn build_method_parameters(
    routes: &[RouteWithValidQuote],
    trade_type: TradeType,
    input_is_native: bool,
    output_is_native: bool,
    config: &SwapConfig,
    swap_router: Address,
) -> MethodParameters {
    let swap_recipient = if output_is_native {
        ADDRESS_THIS
    } else {
        config.recipient
    };

    let mut calls: Vec<Bytes> = routes
        .iter()
        .map(|r| encode_route(r, trade_type, swap_recipient, config.slippage_bps))
        .collect();

    let total_amount: U256 = routes.iter().map(|r| r.amount.quotient()).fold(U256::ZERO, |a, b| a + b);
    let total_quote: U256 = routes.iter().map(|r| r.quote.quotient()).fold(U256::ZERO, |a, b| a + b);

    if output_is_native {
        let minimum = match trade_type {
            TradeType::ExactInput => min_amount_out(total_quote, config.slippage_bps),
            TradeType::ExactOutput => total_amount,
        };
        calls.push(
            ISwapRouter02::unwrapWETH9Call {
                amountMinimum: minimum,
                recipient: config.recipient,
            }
            .abi_encode()
            .into(),
        );
    }

    let value = if input_is_native {
        match trade_type {
            TradeType::ExactInput => total_amount,
            TradeType::ExactOutput => {
                calls.push(ISwapRouter02::refundETHCall {}.abi_encode().into());
                max_amount_in(total_quote, config.slippage_bps)
            }
        }
    } else {
        U256::ZERO
    };

    let calldata = ISwapRouter02::multicallCall {
        deadline: U256::from(config.deadline),
        data: calls,
    }
    .abi_encode();

    MethodParameters {
        to: swap_router,
        calldata: calldata.into(),
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::Route;
    use crate::cartographer::{CandidatePools, Pool, PoolGraph, PoolKind};
    use crate::gas_model::GasModel;
    use crate::tokens::{ChainId, TokenRegistry};
    use std::collections::HashMap;

    fn quoted(trade_type: TradeType, protocol: Protocol) -> RouteWithValidQuote {
        let registry = TokenRegistry::for_chain(ChainId::Mode);
        let weth = registry.wrapped_native.clone();
        let usdc = registry.by_symbol("USDC").cloned().unwrap();
        let kind = match protocol {
            Protocol::V2 => PoolKind::ConstantProduct {
                reserve0: U256::from(1_000_000u64),
                reserve1: U256::from(1_000_000u64),
            },
            Protocol::V3 => PoolKind::ConcentratedLiquidity {
                sqrt_price_x96: U256::from(1u8) << 96,
                tick: 0,
                liquidity: 1_000_000,
                ticks: Vec::new(),
            },
        };
        let pool = Pool::new(Address::with_last_byte(1), weth.clone(), usdc.clone(), 500, kind);
        let route = Route::new(vec![pool], usdc.clone(), weth).unwrap();
        let pools = CandidatePools {
            graph: PoolGraph::new(),
            native_pools: HashMap::new(),
            usd_pool: None,
            block_number: 1,
        };
        let quote_token = match trade_type {
            TradeType::ExactInput => route.output.clone(),
            TradeType::ExactOutput => route.input.clone(),
        };
        let model = GasModel::new(&registry, U256::ZERO, &quote_token, &pools, false, false);
        RouteWithValidQuote::new(
            route,
            100,
            trade_type,
            U256::from(10_000u64),
            U256::from(20_000u64),
            0,
            None,
            &model,
        )
    }

    #[test]
    fn test_slippage_bounds() {
        assert_eq!(min_amount_out(U256::from(10_000u64), 50), U256::from(9_950u64));
        assert_eq!(max_amount_in(U256::from(10_000u64), 50), U256::from(10_050u64));
        assert_eq!(max_amount_in(U256::from(1u64), 50), U256::from(2u64));
    }

    #[test]
    fn test_exact_in_to_native_unwraps() {
        let route = quoted(TradeType::ExactInput, Protocol::V3);
        let recipient = Address::with_last_byte(0x77);
        let params = build_method_parameters(
            &[route],
            TradeType::ExactInput,
            false,
            true,
            &SwapConfig {
                recipient,
                slippage_bps: 100,
                deadline: 1_700_000_000,
            },
            Address::with_last_byte(0x99),
        );
        assert_eq!(params.value, U256::ZERO);
        assert_eq!(params.to, Address::with_last_byte(0x99));

        let outer = ISwapRouter02::multicallCall::abi_decode(&params.calldata).unwrap();
        assert_eq!(outer.deadline, U256::from(1_700_000_000u64));
        assert_eq!(outer.data.len(), 2);

        let swap = ISwapRouter02::exactInputCall::abi_decode(&outer.data[0]).unwrap();
        assert_eq!(swap.params.recipient, ADDRESS_THIS);
        assert_eq!(swap.params.amountIn, U256::from(10_000u64));
        assert_eq!(swap.params.amountOutMinimum, U256::from(19_800u64));

        let unwrap = ISwapRouter02::unwrapWETH9Call::abi_decode(&outer.data[1]).unwrap();
        assert_eq!(unwrap.recipient, recipient);
        assert_eq!(unwrap.amountMinimum, U256::from(19_800u64));
    }

    #[test]
    fn test_native_in_exact_out_refunds() {
        let route = quoted(TradeType::ExactOutput, Protocol::V2);
        let params = build_method_parameters(
            &[route],
            TradeType::ExactOutput,
            true,
            false,
            &SwapConfig::default(),
            Address::ZERO,
        );
        assert_eq!(params.value, U256::from(20_100u64));

        let outer = ISwapRouter02::multicallCall::abi_decode(&params.calldata).unwrap();
        assert_eq!(outer.data.len(), 2);
        let swap = ISwapRouter02::swapTokensForExactTokensCall::abi_decode(&outer.data[0]).unwrap();
        assert_eq!(swap.amountOut, U256::from(10_000u64));
        assert_eq!(swap.path.len(), 2);
        assert!(outer.data[1].starts_with(&ISwapRouter02::refundETHCall::SELECTOR));
    }
}
