//! A quoted route at one split percentage, with its gas cost attached.

use alloy_primitives::U256;
use num_traits::Zero;

use super::paths::Route;
use crate::amounts::{CurrencyAmount, Fraction, TradeType};
use crate::gas_model::{GasCost, GasModel};
use crate::tokens::Token;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteWithValidQuote {
    pub route: Route,
    pub percent: u32,
    pub trade_type: TradeType,
    /// The fixed side allotted to this route (input for exact-in)
    pub amount: CurrencyAmount,
    /// The counter amount the route returns (output for exact-in)
    pub quote: CurrencyAmount,
    pub initialized_ticks_crossed: u32,
    /// Gas reported by the quoter itself, when it reports one
    pub quoter_gas_estimate: Option<U256>,
    pub gas: GasCost,
    /// Output minus gas for exact-in, input plus gas for exact-out
    pub quote_adjusted_for_gas: CurrencyAmount,
}

impl RouteWithValidQuote {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        route: Route,
        percent: u32,
        trade_type: TradeType,
        amount: U256,
        quote: U256,
        initialized_ticks_crossed: u32,
        quoter_gas_estimate: Option<U256>,
        gas_model: &GasModel,
    ) -> Self {
        let (amount_token, quote_token) = match trade_type {
            TradeType::ExactInput => (route.input.clone(), route.output.clone()),
            TradeType::ExactOutput => (route.output.clone(), route.input.clone()),
        };
        let amount = CurrencyAmount::from_raw(amount_token, amount);
        let quote = CurrencyAmount::from_raw(quote_token, quote);

        let gas = gas_model.route_cost(&route, initialized_ticks_crossed);
        let quote_adjusted_for_gas = match trade_type {
            TradeType::ExactInput => quote.sub(&gas.gas_cost_in_token),
            TradeType::ExactOutput => quote.add(&gas.gas_cost_in_token),
        };

        Self {
            route,
            percent,
            trade_type,
            amount,
            quote,
            initialized_ticks_crossed,
            quoter_gas_estimate,
            gas,
            quote_adjusted_for_gas,
        }
    }

    /// Higher is better for either trade type
    pub fn score(&self) -> Fraction {
        signed_score(self.trade_type, &self.quote_adjusted_for_gas.value)
    }

    pub fn quote_token(&self) -> &Token {
        &self.quote.token
    }

    pub fn has_positive_quote(&self) -> bool {
        !self.quote.value.is_zero()
    }
}

/// Maps a gas-adjusted quote onto a maximize-only scale
pub fn signed_score(trade_type: TradeType, adjusted: &Fraction) -> Fraction {
    match trade_type {
        TradeType::ExactInput => adjusted.clone(),
        TradeType::ExactOutput => -adjusted.clone(),
    }
}
