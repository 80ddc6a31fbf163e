//! Display helpers for routes and pools. Pure functions, used for logs and
//! the CLI output only.

use num_traits::Zero;

use crate::amounts::{fraction_to_f64, Fraction};
use crate::brain::{Route, RouteWithValidQuote};
use crate::cartographer::{Pool, Protocol};

fn fee_percent(fee: u32) -> String {
    format!("{}%", fee as f64 / 10_000.0)
}

/// `WETH -- 0.3% [0x…] --> USDC`
pub fn route_to_string(route: &Route) -> String {
    let tokens = route.token_path();
    let mut out = String::new();
    for (i, token) in tokens.iter().enumerate() {
        out.push_str(&token.symbol);
        if let Some(pool) = route.pools.get(i) {
            out.push_str(&format!(" -- {} [{}] --> ", fee_percent(pool.fee), pool.address));
        }
    }
    out
}

/// `[V3] 60.00% = WETH -- 0.3% [0x…] --> USDC, [V2] 40.00% = …`
pub fn route_amounts_to_string(routes: &[RouteWithValidQuote]) -> String {
    let total = routes
        .iter()
        .fold(Fraction::zero(), |acc, r| acc + &r.amount.value);

    routes
        .iter()
        .map(|r| {
            let percent = if total.is_zero() {
                0.0
            } else {
                fraction_to_f64(&(&r.amount.value / &total)) * 100.0
            };
            format!("[{}] {:.2}% = {}", r.route.protocol(), percent, route_to_string(&r.route))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// `1.5 = WETH -- 0.3% [0x…] --> USDC`
pub fn route_amount_to_string(route: &RouteWithValidQuote) -> String {
    format!("{} = {}", route.amount.to_exact(), route_to_string(&route.route))
}

/// `WETH/USDC/0.3%` for concentrated liquidity, `WETH/USDC` otherwise
pub fn pool_to_string(pool: &Pool) -> String {
    match pool.protocol() {
        Protocol::V3 => format!("{}/{}/{}", pool.token0.symbol, pool.token1.symbol, fee_percent(pool.fee)),
        Protocol::V2 => format!("{}/{}", pool.token0.symbol, pool.token1.symbol),
    }
}
