//! Pool snapshots
//!
//! A `Pool` is an immutable view of one AMM pool at one block. State changes
//! produce a new value. The venue math is a closed variant: constant product
//! reserves or a concentrated-liquidity tick range.

use alloy_primitives::{Address, U256};
use num_bigint::BigInt;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

use crate::amounts::{u256_to_bigint, Fraction};
use crate::simulator::swap_math::{
    compute_swap_step, constant_product_amount_in, constant_product_amount_out, MathError,
};
use crate::simulator::tick_math::{
    get_sqrt_ratio_at_tick, get_tick_at_sqrt_ratio, max_sqrt_ratio, min_sqrt_ratio, MAX_TICK, MIN_TICK,
};
use crate::tokens::Token;

// ============================================
// PROTOCOLS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    V2,
    V3,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::V2 => write!(f, "V2"),
            Protocol::V3 => write!(f, "V3"),
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "v2" => Ok(Protocol::V2),
            "v3" => Ok(Protocol::V3),
            other => Err(format!("unknown protocol '{}'", other)),
        }
    }
}

// ============================================
// POOL STATE
// ============================================

/// An initialized tick of a concentrated-liquidity pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub index: i32,
    pub liquidity_net: i128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolKind {
    ConstantProduct {
        reserve0: U256,
        reserve1: U256,
    },
    ConcentratedLiquidity {
        sqrt_price_x96: U256,
        tick: i32,
        liquidity: u128,
        /// Sorted by index. Empty when tick data was not loaded.
        ticks: Vec<Tick>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub address: Address,
    pub token0: Token,
    pub token1: Token,
    /// Hundredths of a bip (3000 = 0.3%)
    pub fee: u32,
    pub kind: PoolKind,
}

/// Result of pushing an amount through one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSwap {
    pub amount: U256,
    pub ticks_crossed: u32,
}

impl Pool {
    /// Orders the two tokens canonically
    pub fn new(address: Address, token_a: Token, token_b: Token, fee: u32, kind: PoolKind) -> Self {
        let (token0, token1) = if token_a.sorts_before(&token_b) {
            (token_a, token_b)
        } else {
            (token_b, token_a)
        };
        let kind = match kind {
            PoolKind::ConcentratedLiquidity {
                sqrt_price_x96,
                tick,
                liquidity,
                mut ticks,
            } => {
                ticks.sort_by_key(|t| t.index);
                PoolKind::ConcentratedLiquidity {
                    sqrt_price_x96,
                    tick,
                    liquidity,
                    ticks,
                }
            }
            other => other,
        };
        Self {
            address,
            token0,
            token1,
            fee,
            kind,
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self.kind {
            PoolKind::ConstantProduct { .. } => Protocol::V2,
            PoolKind::ConcentratedLiquidity { .. } => Protocol::V3,
        }
    }

    pub fn involves(&self, token: &Token) -> bool {
        self.token0 == *token || self.token1 == *token
    }

    pub fn other(&self, token: &Token) -> Option<&Token> {
        if self.token0 == *token {
            Some(&self.token1)
        } else if self.token1 == *token {
            Some(&self.token0)
        } else {
            None
        }
    }

    /// Active liquidity, used for ranking candidate pools
    pub fn liquidity(&self) -> U256 {
        match &self.kind {
            PoolKind::ConstantProduct { reserve0, reserve1 } => {
                // geometric mean is the constant-product analog of L
                let product = u256_to_bigint(*reserve0) * u256_to_bigint(*reserve1);
                let root = product.sqrt();
                crate::amounts::fraction_floor_u256(&Fraction::from_integer(root))
            }
            PoolKind::ConcentratedLiquidity { liquidity, .. } => U256::from(*liquidity),
        }
    }

    pub fn has_liquidity(&self) -> bool {
        !self.liquidity().is_zero()
    }

    /// Mid price of `token` in units of the other token, raw units, exact
    pub fn price_of(&self, token: &Token) -> Option<Fraction> {
        let price0 = match &self.kind {
            PoolKind::ConstantProduct { reserve0, reserve1 } => {
                if reserve0.is_zero() || reserve1.is_zero() {
                    return None;
                }
                Fraction::new(u256_to_bigint(*reserve1), u256_to_bigint(*reserve0))
            }
            PoolKind::ConcentratedLiquidity { sqrt_price_x96, .. } => {
                if sqrt_price_x96.is_zero() {
                    return None;
                }
                let sqrt = u256_to_bigint(*sqrt_price_x96);
                Fraction::new(&sqrt * &sqrt, BigInt::one() << 192)
            }
        };

        if *token == self.token0 {
            Some(price0)
        } else if *token == self.token1 {
            if price0.is_zero() {
                return None;
            }
            Some(price0.recip())
        } else {
            None
        }
    }

    // ============================================
    // SWAP SIMULATION
    // ============================================

    /// Output for an exact input of `token_in`
    pub fn get_output_amount(&self, token_in: &Token, amount_in: U256) -> Result<PoolSwap, MathError> {
        let zero_for_one = self.direction(token_in)?;
        match &self.kind {
            PoolKind::ConstantProduct { reserve0, reserve1 } => {
                let (r_in, r_out) = if zero_for_one {
                    (*reserve0, *reserve1)
                } else {
                    (*reserve1, *reserve0)
                };
                Ok(PoolSwap {
                    amount: constant_product_amount_out(amount_in, r_in, r_out, self.fee)?,
                    ticks_crossed: 0,
                })
            }
            PoolKind::ConcentratedLiquidity { .. } => self.simulate(zero_for_one, amount_in, true),
        }
    }

    /// Input of `token_in` needed to receive exactly `amount_out` of the other token
    pub fn get_input_amount(&self, token_in: &Token, amount_out: U256) -> Result<PoolSwap, MathError> {
        let zero_for_one = self.direction(token_in)?;
        match &self.kind {
            PoolKind::ConstantProduct { reserve0, reserve1 } => {
                let (r_in, r_out) = if zero_for_one {
                    (*reserve0, *reserve1)
                } else {
                    (*reserve1, *reserve0)
                };
                Ok(PoolSwap {
                    amount: constant_product_amount_in(amount_out, r_in, r_out, self.fee)?,
                    ticks_crossed: 0,
                })
            }
            PoolKind::ConcentratedLiquidity { .. } => self.simulate(zero_for_one, amount_out, false),
        }
    }

    fn direction(&self, token_in: &Token) -> Result<bool, MathError> {
        if *token_in == self.token0 {
            Ok(true)
        } else if *token_in == self.token1 {
            Ok(false)
        } else {
            Err(MathError::InvalidPrice)
        }
    }

    fn simulate(&self, zero_for_one: bool, amount: U256, exact_input: bool) -> Result<PoolSwap, MathError> {
        let PoolKind::ConcentratedLiquidity {
            sqrt_price_x96,
            tick,
            liquidity,
            ticks,
        } = &self.kind
        else {
            return Err(MathError::InvalidPrice);
        };

        let limit = if zero_for_one {
            min_sqrt_ratio() + U256::from(1u8)
        } else {
            max_sqrt_ratio() - U256::from(1u8)
        };

        let mut remaining = amount;
        let mut calculated = U256::ZERO;
        let mut sqrt_price = *sqrt_price_x96;
        let mut current_tick = *tick;
        let mut active = *liquidity;
        let mut crossed = 0u32;

        while !remaining.is_zero() && sqrt_price != limit {
            let (tick_next, initialized) = next_initialized_tick(ticks, current_tick, zero_for_one);
            let tick_next = tick_next.clamp(MIN_TICK, MAX_TICK);
            let sqrt_next = get_sqrt_ratio_at_tick(tick_next).ok_or(MathError::InvalidPrice)?;
            let target = if zero_for_one {
                sqrt_next.max(limit)
            } else {
                sqrt_next.min(limit)
            };

            let step = compute_swap_step(sqrt_price, target, active, remaining, exact_input, self.fee)?;

            if exact_input {
                remaining = remaining.saturating_sub(step.amount_in + step.fee_amount);
                calculated += step.amount_out;
            } else {
                remaining = remaining.saturating_sub(step.amount_out);
                calculated += step.amount_in + step.fee_amount;
            }

            if step.sqrt_price_next == sqrt_next {
                if initialized {
                    let net = ticks
                        .iter()
                        .find(|t| t.index == tick_next)
                        .map(|t| t.liquidity_net)
                        .unwrap_or(0);
                    let delta = if zero_for_one { -net } else { net };
                    active = add_delta(active, delta)?;
                    crossed += 1;
                }
                current_tick = if zero_for_one { tick_next - 1 } else { tick_next };
            } else if step.sqrt_price_next != sqrt_price {
                current_tick = get_tick_at_sqrt_ratio(step.sqrt_price_next).ok_or(MathError::InvalidPrice)?;
            }
            sqrt_price = step.sqrt_price_next;
        }

        if !remaining.is_zero() {
            return Err(MathError::InsufficientLiquidity);
        }

        Ok(PoolSwap {
            amount: calculated,
            ticks_crossed: crossed,
        })
    }
}

fn add_delta(liquidity: u128, delta: i128) -> Result<u128, MathError> {
    if delta < 0 {
        liquidity
            .checked_sub(delta.unsigned_abs())
            .ok_or(MathError::InsufficientLiquidity)
    } else {
        liquidity.checked_add(delta as u128).ok_or(MathError::Overflow)
    }
}

/// Next initialized tick in the swap direction, or the price bound
fn next_initialized_tick(ticks: &[Tick], tick: i32, lte: bool) -> (i32, bool) {
    if lte {
        match ticks.iter().rev().find(|t| t.index <= tick) {
            Some(t) => (t.index, true),
            None => (MIN_TICK, false),
        }
    } else {
        match ticks.iter().find(|t| t.index > tick) {
            Some(t) => (t.index, true),
            None => (MAX_TICK, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::tick_math::q96;
    use crate::tokens::{ChainId, TokenRegistry};
    use alloy_primitives::address;

    const L: u128 = 1_000_000_000_000_000_000;

    fn pair() -> (Token, Token) {
        let registry = TokenRegistry::for_chain(ChainId::Mode);
        let weth = registry.wrapped_native.clone();
        let dai = registry.by_symbol("DAI").cloned().unwrap();
        (weth, dai)
    }

    fn layered_pool() -> Pool {
        let (a, b) = pair();
        Pool::new(
            address!("1000000000000000000000000000000000000001"),
            a,
            b,
            3000,
            PoolKind::ConcentratedLiquidity {
                sqrt_price_x96: q96(),
                tick: 0,
                liquidity: 2 * L,
                ticks: vec![
                    Tick { index: 60, liquidity_net: -(L as i128) },
                    Tick { index: -120, liquidity_net: L as i128 },
                    Tick { index: -60, liquidity_net: L as i128 },
                    Tick { index: 120, liquidity_net: -(L as i128) },
                ],
            },
        )
    }

    #[test]
    fn test_canonical_ordering() {
        let pool = layered_pool();
        assert!(pool.token0.address < pool.token1.address);
        if let PoolKind::ConcentratedLiquidity { ticks, .. } = &pool.kind {
            assert!(ticks.windows(2).all(|w| w[0].index < w[1].index));
        }
    }

    #[test]
    fn test_crossing_one_initialized_tick() {
        let pool = layered_pool();
        let token0 = pool.token0.clone();

        // Moving to tick -60 needs about 6.0e15 of token0 at 2L; the layer
        // down to -120 holds another ~3.0e15 at L
        let swap = pool
            .get_output_amount(&token0, U256::from(8_000_000_000_000_000u64))
            .unwrap();
        assert_eq!(swap.ticks_crossed, 1);
        assert!(swap.amount < U256::from(8_000_000_000_000_000u64));

        let small = pool.get_output_amount(&token0, U256::from(1_000_000u64)).unwrap();
        assert_eq!(small.ticks_crossed, 0);
    }

    #[test]
    fn test_running_out_of_liquidity() {
        let pool = layered_pool();
        let token0 = pool.token0.clone();
        let result = pool.get_output_amount(&token0, U256::from(10u64).pow(U256::from(20u64)));
        assert_eq!(result, Err(MathError::InsufficientLiquidity));
    }

    #[test]
    fn test_exact_output_consistent_with_exact_input() {
        let pool = layered_pool();
        let token1 = pool.token1.clone();
        let wanted = U256::from(1_000_000_000_000u64);
        let needed = pool.get_input_amount(&token1, wanted).unwrap();
        let received = pool.get_output_amount(&token1, needed.amount).unwrap();
        assert!(received.amount >= wanted);
    }

    #[test]
    fn test_price_of_inverts() {
        let (a, b) = pair();
        let pool = Pool::new(
            address!("2000000000000000000000000000000000000002"),
            a,
            b,
            3000,
            PoolKind::ConstantProduct {
                reserve0: U256::from(1_000u64),
                reserve1: U256::from(4_000u64),
            },
        );
        let p0 = pool.price_of(&pool.token0).unwrap();
        let p1 = pool.price_of(&pool.token1).unwrap();
        assert_eq!(p0 * p1, Fraction::one());
        assert_eq!(pool.protocol(), Protocol::V2);
    }
}
