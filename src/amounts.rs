//! Exact amounts
//!
//! Every quote and gas cost is carried as a `BigRational` over raw token
//! units. Nothing in here rounds except the explicit `quotient()` and the
//! display helpers.

use alloy_primitives::U256;
use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::str::FromStr;

use crate::error::RouterError;
use crate::tokens::Token;

pub type Fraction = BigRational;

// ============================================
// CONVERSIONS
// ============================================

pub fn u256_to_biguint(value: U256) -> BigUint {
    BigUint::from_bytes_be(&value.to_be_bytes::<32>())
}

/// None when the value does not fit in 256 bits
pub fn biguint_to_u256(value: &BigUint) -> Option<U256> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return None;
    }
    Some(U256::from_be_slice(&bytes))
}

pub fn u256_to_bigint(value: U256) -> BigInt {
    BigInt::from_biguint(Sign::Plus, u256_to_biguint(value))
}

pub fn fraction_from_u256(value: U256) -> Fraction {
    Fraction::from_integer(u256_to_bigint(value))
}

/// Floor of a non-negative fraction, saturating at U256::MAX
pub fn fraction_floor_u256(value: &Fraction) -> U256 {
    let floor = value.floor().to_integer();
    if floor.is_negative() {
        return U256::ZERO;
    }
    floor
        .to_biguint()
        .and_then(|b| biguint_to_u256(&b))
        .unwrap_or(U256::MAX)
}

pub fn pow10(decimals: u8) -> BigInt {
    num_traits::pow(BigInt::from(10u8), decimals as usize)
}

// ============================================
// CURRENCY AMOUNT
// ============================================

/// An exact amount of one token, in raw units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyAmount {
    pub token: Token,
    pub value: Fraction,
}

impl CurrencyAmount {
    pub fn from_raw(token: Token, raw: U256) -> Self {
        Self {
            token,
            value: fraction_from_u256(raw),
        }
    }

    pub fn from_fraction(token: Token, value: Fraction) -> Self {
        Self { token, value }
    }

    pub fn zero(token: Token) -> Self {
        Self {
            token,
            value: Fraction::zero(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn add(&self, other: &CurrencyAmount) -> CurrencyAmount {
        debug_assert_eq!(self.token, other.token);
        CurrencyAmount {
            token: self.token.clone(),
            value: &self.value + &other.value,
        }
    }

    pub fn sub(&self, other: &CurrencyAmount) -> CurrencyAmount {
        debug_assert_eq!(self.token, other.token);
        CurrencyAmount {
            token: self.token.clone(),
            value: &self.value - &other.value,
        }
    }

    /// Share of this amount for a whole-number percent, floored to raw units
    pub fn percent_of(&self, percent: u32) -> CurrencyAmount {
        let share = (&self.value * Fraction::from_integer(BigInt::from(percent)))
            / Fraction::from_integer(BigInt::from(100u8));
        CurrencyAmount {
            token: self.token.clone(),
            value: share.floor(),
        }
    }

    pub fn quotient(&self) -> U256 {
        fraction_floor_u256(&self.value)
    }

    /// Decimal representation with up to `max_decimals` digits, truncated
    pub fn to_fixed(&self, max_decimals: usize) -> String {
        format_fraction(&self.value, self.token.decimals, max_decimals)
    }

    /// Full-precision decimal representation
    pub fn to_exact(&self) -> String {
        format_fraction(&self.value, self.token.decimals, self.token.decimals as usize)
    }
}

impl std::fmt::Display for CurrencyAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.to_fixed(6), self.token.symbol)
    }
}

// ============================================
// DECIMAL PARSING / FORMATTING
// ============================================

fn format_fraction(value: &Fraction, decimals: u8, max_decimals: usize) -> String {
    let negative = value.is_negative();
    let scaled = value.abs() / Fraction::from_integer(pow10(decimals));
    let whole = scaled.floor().to_integer();
    let mut remainder = scaled - Fraction::from_integer(whole.clone());

    let mut digits = String::new();
    for _ in 0..max_decimals {
        remainder *= Fraction::from_integer(BigInt::from(10u8));
        let digit = remainder.floor().to_integer();
        remainder -= Fraction::from_integer(digit.clone());
        digits.push_str(&digit.to_string());
    }
    let digits = digits.trim_end_matches('0');

    let sign = if negative { "-" } else { "" };
    if digits.is_empty() {
        format!("{}{}", sign, whole)
    } else {
        format!("{}{}.{}", sign, whole, digits)
    }
}

/// Parse a human decimal like "1.5" into raw units
pub fn parse_units(input: &str, decimals: u8) -> Result<U256, RouterError> {
    let trimmed = input.trim();
    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };

    if frac.len() > decimals as usize {
        return Err(RouterError::invalid(format!(
            "amount {} has more than {} decimals",
            input, decimals
        )));
    }
    let whole = if whole.is_empty() { "0" } else { whole };
    let padded = format!("{}{:0<width$}", whole, frac, width = decimals as usize);

    let raw = BigUint::from_str(&padded)
        .map_err(|_| RouterError::invalid(format!("invalid amount {}", input)))?;
    biguint_to_u256(&raw).ok_or_else(|| RouterError::invalid(format!("amount {} overflows", input)))
}

/// Ceil of a non-negative fraction
pub fn fraction_ceil_u256(value: &Fraction) -> U256 {
    let (q, r) = value.numer().div_rem(value.denom());
    let ceil = if r.is_zero() { q } else { q + BigInt::one() };
    ceil.to_biguint()
        .and_then(|b| biguint_to_u256(&b))
        .unwrap_or(U256::MAX)
}

/// Lossy, for logging only
pub fn fraction_to_f64(value: &Fraction) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

// ============================================
// TRADE TYPE
// ============================================

/// Which side of the trade is fixed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TradeType {
    /// Fixed input, maximize output
    ExactInput,
    /// Fixed output, minimize input
    ExactOutput,
}

impl std::fmt::Display for TradeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeType::ExactInput => write!(f, "exactIn"),
            TradeType::ExactOutput => write!(f, "exactOut"),
        }
    }
}

impl FromStr for TradeType {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exactin" | "exact-in" | "exact_input" | "in" => Ok(TradeType::ExactInput),
            "exactout" | "exact-out" | "exact_output" | "out" => Ok(TradeType::ExactOutput),
            other => Err(RouterError::invalid(format!("unknown trade type {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::{ChainId, TokenRegistry};

    fn usdc() -> Token {
        TokenRegistry::for_chain(ChainId::Mode)
            .by_symbol("USDC")
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units("1.5", 6).unwrap(), U256::from(1_500_000u64));
        assert_eq!(parse_units("42", 0).unwrap(), U256::from(42u64));
        assert_eq!(parse_units(".25", 2).unwrap(), U256::from(25u64));
        assert!(parse_units("1.0000001", 6).is_err());
        assert!(parse_units("abc", 6).is_err());
    }

    #[test]
    fn test_percent_of_floors() {
        let amount = CurrencyAmount::from_raw(usdc(), U256::from(1001u64));
        assert_eq!(amount.percent_of(50).quotient(), U256::from(500u64));
        assert_eq!(amount.percent_of(100).quotient(), U256::from(1001u64));
    }

    #[test]
    fn test_formatting() {
        let amount = CurrencyAmount::from_raw(usdc(), U256::from(1_234_567u64));
        assert_eq!(amount.to_exact(), "1.234567");
        assert_eq!(amount.to_fixed(2), "1.23");

        let whole = CurrencyAmount::from_raw(usdc(), U256::from(2_000_000u64));
        assert_eq!(whole.to_exact(), "2");
    }

    #[test]
    fn test_rounding_helpers() {
        let third = Fraction::new(BigInt::from(10), BigInt::from(3));
        assert_eq!(fraction_floor_u256(&third), U256::from(3u64));
        assert_eq!(fraction_ceil_u256(&third), U256::from(4u64));
        assert_eq!(biguint_to_u256(&u256_to_biguint(U256::MAX)), Some(U256::MAX));
    }
}
