//! Concentrated-liquidity swap math
//!
//! Intermediate products go through `BigUint` so that every mul-div is exact
//! and the rounding direction matches the pool contracts.

use alloy_primitives::U256;
use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};

use crate::amounts::{biguint_to_u256, u256_to_biguint};

/// Fee denominator: fees are expressed in hundredths of a bip
pub const FEE_DENOMINATOR: u32 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    Overflow,
    InsufficientLiquidity,
    InvalidPrice,
}

impl std::fmt::Display for MathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MathError::Overflow => write!(f, "arithmetic overflow"),
            MathError::InsufficientLiquidity => write!(f, "insufficient liquidity"),
            MathError::InvalidPrice => write!(f, "invalid sqrt price"),
        }
    }
}

fn big(v: U256) -> BigUint {
    u256_to_biguint(v)
}

fn narrow(v: BigUint) -> Result<U256, MathError> {
    biguint_to_u256(&v).ok_or(MathError::Overflow)
}

fn div_rounding_up(a: &BigUint, b: &BigUint) -> BigUint {
    let (q, r) = a.div_rem(b);
    if r.is_zero() {
        q
    } else {
        q + BigUint::one()
    }
}

fn q96_big() -> BigUint {
    BigUint::one() << 96
}

// ============================================
// AMOUNT DELTAS
// ============================================

pub fn get_amount0_delta(a: U256, b: U256, liquidity: u128, round_up: bool) -> Result<U256, MathError> {
    let (lower, upper) = if a < b { (a, b) } else { (b, a) };
    if lower.is_zero() {
        return Err(MathError::InvalidPrice);
    }
    let numerator1 = BigUint::from(liquidity) << 96;
    let numerator2 = big(upper - lower);
    let (upper, lower) = (big(upper), big(lower));

    let result = if round_up {
        let inner = div_rounding_up(&(&numerator1 * &numerator2), &upper);
        div_rounding_up(&inner, &lower)
    } else {
        (&numerator1 * &numerator2 / &upper) / &lower
    };
    narrow(result)
}

pub fn get_amount1_delta(a: U256, b: U256, liquidity: u128, round_up: bool) -> Result<U256, MathError> {
    let (lower, upper) = if a < b { (a, b) } else { (b, a) };
    let product = BigUint::from(liquidity) * big(upper - lower);
    let result = if round_up {
        div_rounding_up(&product, &q96_big())
    } else {
        product / q96_big()
    };
    narrow(result)
}

// ============================================
// NEXT PRICE
// ============================================

fn next_sqrt_price_from_amount0_rounding_up(
    sqrt_price: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, MathError> {
    if amount.is_zero() {
        return Ok(sqrt_price);
    }
    let numerator1 = BigUint::from(liquidity) << 96;
    let product = big(amount) * big(sqrt_price);

    let denominator = if add {
        &numerator1 + &product
    } else {
        if numerator1 <= product {
            return Err(MathError::InsufficientLiquidity);
        }
        &numerator1 - &product
    };
    narrow(div_rounding_up(&(numerator1 * big(sqrt_price)), &denominator))
}

fn next_sqrt_price_from_amount1_rounding_down(
    sqrt_price: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, MathError> {
    let liquidity = BigUint::from(liquidity);
    let shifted = big(amount) << 96;
    if add {
        narrow(big(sqrt_price) + shifted / liquidity)
    } else {
        let quotient = div_rounding_up(&shifted, &liquidity);
        let current = big(sqrt_price);
        if current <= quotient {
            return Err(MathError::InsufficientLiquidity);
        }
        narrow(current - quotient)
    }
}

pub fn get_next_sqrt_price_from_input(
    sqrt_price: U256,
    liquidity: u128,
    amount_in: U256,
    zero_for_one: bool,
) -> Result<U256, MathError> {
    if sqrt_price.is_zero() || liquidity == 0 {
        return Err(MathError::InvalidPrice);
    }
    if zero_for_one {
        next_sqrt_price_from_amount0_rounding_up(sqrt_price, liquidity, amount_in, true)
    } else {
        next_sqrt_price_from_amount1_rounding_down(sqrt_price, liquidity, amount_in, true)
    }
}

pub fn get_next_sqrt_price_from_output(
    sqrt_price: U256,
    liquidity: u128,
    amount_out: U256,
    zero_for_one: bool,
) -> Result<U256, MathError> {
    if sqrt_price.is_zero() || liquidity == 0 {
        return Err(MathError::InvalidPrice);
    }
    if zero_for_one {
        next_sqrt_price_from_amount1_rounding_down(sqrt_price, liquidity, amount_out, false)
    } else {
        next_sqrt_price_from_amount0_rounding_up(sqrt_price, liquidity, amount_out, false)
    }
}

// ============================================
// SWAP STEP
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapStep {
    pub sqrt_price_next: U256,
    pub amount_in: U256,
    pub amount_out: U256,
    pub fee_amount: U256,
}

/// One step of a swap within a single liquidity range.
/// `amount_remaining` is the unsigned remainder; `exact_input` picks its side.
pub fn compute_swap_step(
    sqrt_price_current: U256,
    sqrt_price_target: U256,
    liquidity: u128,
    amount_remaining: U256,
    exact_input: bool,
    fee_pips: u32,
) -> Result<SwapStep, MathError> {
    let zero_for_one = sqrt_price_current >= sqrt_price_target;
    let fee_complement = FEE_DENOMINATOR - fee_pips;

    let mut amount_in = U256::ZERO;
    let mut amount_out = U256::ZERO;
    let sqrt_price_next;

    if exact_input {
        let remaining_less_fee =
            narrow(big(amount_remaining) * BigUint::from(fee_complement) / BigUint::from(FEE_DENOMINATOR))?;
        amount_in = if zero_for_one {
            get_amount0_delta(sqrt_price_target, sqrt_price_current, liquidity, true)?
        } else {
            get_amount1_delta(sqrt_price_current, sqrt_price_target, liquidity, true)?
        };
        sqrt_price_next = if remaining_less_fee >= amount_in {
            sqrt_price_target
        } else {
            get_next_sqrt_price_from_input(sqrt_price_current, liquidity, remaining_less_fee, zero_for_one)?
        };
    } else {
        amount_out = if zero_for_one {
            get_amount1_delta(sqrt_price_target, sqrt_price_current, liquidity, false)?
        } else {
            get_amount0_delta(sqrt_price_current, sqrt_price_target, liquidity, false)?
        };
        sqrt_price_next = if amount_remaining >= amount_out {
            sqrt_price_target
        } else {
            get_next_sqrt_price_from_output(sqrt_price_current, liquidity, amount_remaining, zero_for_one)?
        };
    }

    let reached_target = sqrt_price_target == sqrt_price_next;

    if zero_for_one {
        if !(reached_target && exact_input) {
            amount_in = get_amount0_delta(sqrt_price_next, sqrt_price_current, liquidity, true)?;
        }
        if !(reached_target && !exact_input) {
            amount_out = get_amount1_delta(sqrt_price_next, sqrt_price_current, liquidity, false)?;
        }
    } else {
        if !(reached_target && exact_input) {
            amount_in = get_amount1_delta(sqrt_price_current, sqrt_price_next, liquidity, true)?;
        }
        if !(reached_target && !exact_input) {
            amount_out = get_amount0_delta(sqrt_price_current, sqrt_price_next, liquidity, false)?;
        }
    }

    if !exact_input && amount_out > amount_remaining {
        amount_out = amount_remaining;
    }

    let fee_amount = if exact_input && sqrt_price_next != sqrt_price_target {
        amount_remaining - amount_in
    } else {
        narrow(div_rounding_up(
            &(big(amount_in) * BigUint::from(fee_pips)),
            &BigUint::from(fee_complement),
        ))?
    };

    Ok(SwapStep {
        sqrt_price_next,
        amount_in,
        amount_out,
        fee_amount,
    })
}

// ============================================
// CONSTANT PRODUCT
// ============================================

pub fn constant_product_amount_out(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_pips: u32,
) -> Result<U256, MathError> {
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(MathError::InsufficientLiquidity);
    }
    let with_fee = big(amount_in) * BigUint::from(FEE_DENOMINATOR - fee_pips);
    let numerator = &with_fee * big(reserve_out);
    let denominator = big(reserve_in) * BigUint::from(FEE_DENOMINATOR) + with_fee;
    narrow(numerator / denominator)
}

pub fn constant_product_amount_in(
    amount_out: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_pips: u32,
) -> Result<U256, MathError> {
    if reserve_in.is_zero() || amount_out >= reserve_out {
        return Err(MathError::InsufficientLiquidity);
    }
    let numerator = big(reserve_in) * big(amount_out) * BigUint::from(FEE_DENOMINATOR);
    let denominator = big(reserve_out - amount_out) * BigUint::from(FEE_DENOMINATOR - fee_pips);
    narrow(numerator / denominator + BigUint::one())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::tick_math::{get_sqrt_ratio_at_tick, q96};

    #[test]
    fn test_amount_deltas_round_in_pool_favor() {
        let a = q96();
        let b = get_sqrt_ratio_at_tick(60).unwrap();
        let liquidity = 1_000_000_000_000_000_000u128;

        let up = get_amount0_delta(a, b, liquidity, true).unwrap();
        let down = get_amount0_delta(a, b, liquidity, false).unwrap();
        assert!(up >= down && up - down <= U256::from(1u8));

        let up = get_amount1_delta(a, b, liquidity, true).unwrap();
        let down = get_amount1_delta(a, b, liquidity, false).unwrap();
        assert!(up >= down && up - down <= U256::from(1u8));
    }

    #[test]
    fn test_exact_input_step_within_range() {
        let current = q96();
        let target = get_sqrt_ratio_at_tick(-600).unwrap();
        let step = compute_swap_step(
            current,
            target,
            1_000_000_000_000_000_000,
            U256::from(1_000_000u64),
            true,
            3000,
        )
        .unwrap();

        // Tiny trade never reaches the target and spends the full amount
        assert!(step.sqrt_price_next < current && step.sqrt_price_next > target);
        assert_eq!(step.amount_in + step.fee_amount, U256::from(1_000_000u64));
        assert!(step.amount_out < U256::from(997_000u64));
        assert!(step.amount_out > U256::from(990_000u64));
    }

    #[test]
    fn test_exact_output_step_caps_output() {
        let current = q96();
        let target = get_sqrt_ratio_at_tick(600).unwrap();
        let step = compute_swap_step(
            current,
            target,
            1_000_000_000_000_000_000,
            U256::from(500_000u64),
            false,
            500,
        )
        .unwrap();
        assert_eq!(step.amount_out, U256::from(500_000u64));
        assert!(step.amount_in > U256::from(500_000u64));
    }

    #[test]
    fn test_constant_product() {
        let r = U256::from(1_000_000u64);
        let out = constant_product_amount_out(U256::from(1000u64), r, r, 3000).unwrap();
        assert_eq!(out, U256::from(996u64));

        let back = constant_product_amount_in(out, r, r, 3000).unwrap();
        assert!(back <= U256::from(1000u64));
        assert!(constant_product_amount_in(r, r, r, 3000).is_err());
    }
}
