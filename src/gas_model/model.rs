//! Heuristic gas model
//!
//! Gas units come from the per-chain constants in `costs`. The cost in wei
//! is converted into the quote token through the wrapped-native/quote pool
//! mid price, and into USD through the chosen USD reference pool. All of it
//! stays a `Fraction`; nothing is rounded before the optimizer compares.

use alloy_primitives::U256;
use num_traits::Zero;
use tracing::{debug, warn};

use super::costs::{native_overhead, GasCosts};
use crate::amounts::{fraction_from_u256, CurrencyAmount, Fraction};
use crate::brain::Route;
use crate::cartographer::CandidatePools;
use crate::tokens::{ChainId, Token, TokenRegistry};

/// Gas of one route (or a whole combination) in every unit we report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasCost {
    pub gas_estimate: U256,
    pub gas_cost_native: CurrencyAmount,
    pub gas_cost_in_token: CurrencyAmount,
    pub gas_cost_in_usd: Option<CurrencyAmount>,
}

impl GasCost {
    pub fn add(&self, other: &GasCost) -> GasCost {
        GasCost {
            gas_estimate: self.gas_estimate.saturating_add(other.gas_estimate),
            gas_cost_native: self.gas_cost_native.add(&other.gas_cost_native),
            gas_cost_in_token: self.gas_cost_in_token.add(&other.gas_cost_in_token),
            gas_cost_in_usd: match (&self.gas_cost_in_usd, &other.gas_cost_in_usd) {
                (Some(a), Some(b)) => Some(a.add(b)),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct GasModel {
    chain: ChainId,
    gas_price_wei: U256,
    native: Token,
    quote_token: Token,
    /// Raw quote units per raw native unit
    quote_per_native: Option<Fraction>,
    /// USD token and raw USD units per raw native unit
    usd_per_native: Option<(Token, Fraction)>,
    overhead: u64,
}

impl GasModel {
    pub fn new(
        registry: &TokenRegistry,
        gas_price_wei: U256,
        quote_token: &Token,
        pools: &CandidatePools,
        wraps_input: bool,
        unwraps_output: bool,
    ) -> Self {
        let native = registry.wrapped_native.clone();

        let quote_per_native = if *quote_token == native {
            Some(Fraction::from_integer(1.into()))
        } else {
            pools
                .native_pool_for(&quote_token.address)
                .and_then(|pool| pool.price_of(&native))
        };
        if quote_per_native.is_none() {
            warn!(
                "No {}/{} pool to price gas; gas cost in {} treated as zero",
                native.symbol, quote_token.symbol, quote_token.symbol
            );
        }

        let usd_per_native = pools
            .usd_pool
            .as_ref()
            .and_then(|(usd, pool)| pool.price_of(&native).map(|price| (usd.clone(), price)));

        let overhead = native_overhead(wraps_input, unwraps_output);
        debug!(
            "Gas model: {} wei/gas, native overhead {}, quote priced: {}, usd priced: {}",
            gas_price_wei,
            overhead,
            quote_per_native.is_some(),
            usd_per_native.is_some()
        );

        Self {
            chain: registry.chain_id,
            gas_price_wei,
            native,
            quote_token: quote_token.clone(),
            quote_per_native,
            usd_per_native,
            overhead,
        }
    }

    pub fn gas_price_wei(&self) -> U256 {
        self.gas_price_wei
    }

    pub fn quote_token(&self) -> &Token {
        &self.quote_token
    }

    /// base + per tick × ticks + per hop × (hops − 1) + native overhead
    pub fn estimate_gas(&self, route: &Route, initialized_ticks_crossed: u32) -> U256 {
        let costs = GasCosts::for_protocol(self.chain, route.protocol());
        let units = costs
            .swap_gas(route.hops(), initialized_ticks_crossed)
            .saturating_add(self.overhead);
        U256::from(units)
    }

    pub fn route_cost(&self, route: &Route, initialized_ticks_crossed: u32) -> GasCost {
        self.price_gas(self.estimate_gas(route, initialized_ticks_crossed))
    }

    /// Price a number of L2 gas units at the current gas price
    pub fn price_gas(&self, gas_units: U256) -> GasCost {
        let wei = fraction_from_u256(gas_units) * fraction_from_u256(self.gas_price_wei);
        let mut cost = self.price_native(wei);
        cost.gas_estimate = gas_units;
        cost
    }

    /// Price an amount of native wei; `gas_estimate` is left at zero
    pub fn price_native(&self, wei: Fraction) -> GasCost {
        let in_token = match &self.quote_per_native {
            Some(price) => &wei * price,
            None => Fraction::zero(),
        };
        let in_usd = self
            .usd_per_native
            .as_ref()
            .map(|(usd, price)| CurrencyAmount::from_fraction(usd.clone(), &wei * price));

        GasCost {
            gas_estimate: U256::ZERO,
            gas_cost_native: CurrencyAmount::from_fraction(self.native.clone(), wei),
            gas_cost_in_token: CurrencyAmount::from_fraction(self.quote_token.clone(), in_token),
            gas_cost_in_usd: in_usd,
        }
    }

    pub fn zero_cost(&self) -> GasCost {
        self.price_native(Fraction::zero())
    }
}
