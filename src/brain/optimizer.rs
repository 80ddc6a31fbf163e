//! Route Combination Optimizer
//!
//! Step 2.2: The Splitter
//!
//! Picks the set of (route, percent) quotes whose percentages sum to exactly
//! 100 and whose gas-adjusted value is best. Routes in one combination are
//! distinct and never share a pool.
//!
//! The search runs once per route count, 1 through `max_splits`, and only
//! replaces the incumbent with a strictly better combination. Fewer routes
//! therefore win every tie, and a split never displaces the best full-amount
//! route unless it is strictly better.
//!
//! Pruning: `dp[j][q]` is the best total achievable with exactly `j` quotes
//! covering `q` percent, computed from the best quote at each percent while
//! ignoring route distinctness. It upper-bounds any real completion.

use alloy_primitives::Address;
use num_traits::Zero;
use std::collections::HashMap;
use tracing::{debug, info};

use super::valid_quote::RouteWithValidQuote;
use crate::amounts::{fraction_to_f64, CurrencyAmount, Fraction};
use crate::error::{RouterError, RouterResult};
use crate::gas_model::GasCost;

/// Extra cost of a whole combination in quote-token units (e.g. the L1 fee)
pub type CombinationCost<'a> = dyn Fn(&[&RouteWithValidQuote]) -> Fraction + Send + Sync + 'a;

#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub max_splits: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_splits: 3 }
    }
}

/// The winning combination and its totals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestSwapRoute {
    /// Ordered by percent descending
    pub routes: Vec<RouteWithValidQuote>,
    pub amount: CurrencyAmount,
    pub quote: CurrencyAmount,
    pub quote_gas_adjusted: CurrencyAmount,
    pub gas: GasCost,
    /// Combination-level cost already subtracted from the score
    pub extra_cost_in_token: Fraction,
}

impl BestSwapRoute {
    /// Give the dust lost to per-route flooring back to the largest share, so
    /// the routes cover exactly `total`. Quotes are left as quoted.
    pub fn settle_remainder(&mut self, total: &CurrencyAmount) {
        if self.amount.token != total.token || total.value <= self.amount.value {
            return;
        }
        let dust = total.sub(&self.amount);
        if let Some(largest) = self.routes.first_mut() {
            largest.amount = largest.amount.add(&dust);
            self.amount = total.clone();
        }
    }

    fn from_routes(routes: Vec<RouteWithValidQuote>, extra_cost_in_token: Fraction) -> Option<Self> {
        let first = routes.first()?;
        let mut amount = CurrencyAmount::zero(first.amount.token.clone());
        let mut quote = CurrencyAmount::zero(first.quote.token.clone());
        let mut adjusted = CurrencyAmount::zero(first.quote.token.clone());
        let mut gas = first.gas.clone();
        for (i, r) in routes.iter().enumerate() {
            amount = amount.add(&r.amount);
            quote = quote.add(&r.quote);
            adjusted = adjusted.add(&r.quote_adjusted_for_gas);
            if i > 0 {
                gas = gas.add(&r.gas);
            }
        }
        Some(Self {
            routes,
            amount,
            quote,
            quote_gas_adjusted: adjusted,
            gas,
            extra_cost_in_token,
        })
    }

    pub fn percent_total(&self) -> u32 {
        self.routes.iter().map(|r| r.percent).sum()
    }
}

/// One candidate (route, percent) with the best quote seen for it
struct Item {
    route: usize,
    percent: u32,
    score: Fraction,
    quote: usize,
}

struct Search<'a> {
    items: Vec<Item>,
    quotes: &'a [RouteWithValidQuote],
    /// Pool addresses per route index
    route_pools: Vec<Vec<Address>>,
    /// dp[j][q]
    dp: Vec<Vec<Option<Fraction>>>,
    extra_cost: Option<&'a CombinationCost<'a>>,
    best: Option<(Fraction, Vec<usize>)>,
    evaluated: usize,
}

impl<'a> Search<'a> {
    fn shares_pool(&self, chosen: &[usize], route: usize) -> bool {
        chosen.iter().any(|&i| {
            let other = self.items[i].route;
            other == route
                || self.route_pools[other]
                    .iter()
                    .any(|p| self.route_pools[route].contains(p))
        })
    }

    fn evaluate(&mut self, chosen: &[usize], partial: &Fraction) {
        self.evaluated += 1;
        let total = match self.extra_cost {
            Some(cost) => {
                let members: Vec<&RouteWithValidQuote> =
                    chosen.iter().map(|&i| &self.quotes[self.items[i].quote]).collect();
                partial - cost(&members)
            }
            None => partial.clone(),
        };
        let better = match &self.best {
            Some((best, _)) => total > *best,
            None => true,
        };
        if better {
            self.best = Some((total, chosen.to_vec()));
        }
    }

    fn walk(&mut self, start: usize, remaining: u32, slots: usize, chosen: &mut Vec<usize>, partial: Fraction) {
        if slots == 0 {
            if remaining == 0 {
                self.evaluate(chosen, &partial);
            }
            return;
        }

        for i in start..self.items.len() {
            let percent = self.items[i].percent;
            if percent > remaining {
                continue;
            }
            let rest = remaining - percent;
            let Some(bound) = self.dp[slots - 1][rest as usize].clone() else {
                continue;
            };
            let candidate = &partial + &self.items[i].score;
            if let Some((best, _)) = &self.best {
                if &candidate + &bound <= *best {
                    continue;
                }
            }
            if self.shares_pool(chosen, self.items[i].route) {
                continue;
            }

            chosen.push(i);
            self.walk(i + 1, rest, slots - 1, chosen, candidate);
            chosen.pop();
        }
    }
}

/// Choose the best combination of quoted routes
pub fn get_best_swap_route(
    quotes: Vec<RouteWithValidQuote>,
    config: &OptimizerConfig,
    extra_cost: Option<&CombinationCost<'_>>,
) -> RouterResult<BestSwapRoute> {
    let quotes: Vec<RouteWithValidQuote> = quotes.into_iter().filter(|q| q.has_positive_quote()).collect();
    if quotes.is_empty() {
        return Err(RouterError::no_route("no route returned a usable quote"));
    }

    // index routes by pool path, keep the best quote per (route, percent)
    let mut route_keys: Vec<Vec<Address>> = Vec::new();
    let mut best_per_slot: HashMap<(usize, u32), usize> = HashMap::new();
    for (qi, quote) in quotes.iter().enumerate() {
        let key = quote.route.pool_addresses();
        let route = match route_keys.iter().position(|k| *k == key) {
            Some(r) => r,
            None => {
                route_keys.push(key);
                route_keys.len() - 1
            }
        };
        match best_per_slot.get(&(route, quote.percent)) {
            Some(&existing) if quotes[existing].score() >= quote.score() => {}
            _ => {
                best_per_slot.insert((route, quote.percent), qi);
            }
        }
    }

    let mut items: Vec<Item> = best_per_slot
        .into_iter()
        .filter(|((_, percent), _)| *percent > 0 && *percent <= 100)
        .map(|((route, percent), quote)| Item {
            route,
            percent,
            score: quotes[quote].score(),
            quote,
        })
        .collect();
    // canonical order: percent descending, then route path
    items.sort_by(|a, b| {
        b.percent
            .cmp(&a.percent)
            .then_with(|| route_keys[a.route].cmp(&route_keys[b.route]))
    });

    let max_splits = config.max_splits.max(1);
    let mut best_at: HashMap<u32, Fraction> = HashMap::new();
    for item in &items {
        match best_at.get(&item.percent) {
            Some(existing) if *existing >= item.score => {}
            _ => {
                best_at.insert(item.percent, item.score.clone());
            }
        }
    }
    let dp = completion_bounds(&best_at, max_splits);

    let mut search = Search {
        items,
        quotes: &quotes,
        route_pools: route_keys,
        dp,
        extra_cost,
        best: None,
        evaluated: 0,
    };

    for splits in 1..=max_splits {
        let mut chosen = Vec::with_capacity(splits);
        search.walk(0, 100, splits, &mut chosen, Fraction::zero());
    }

    let Some((score, chosen)) = search.best.take() else {
        return Err(RouterError::no_route(
            "no combination of quotes covers the full amount",
        ));
    };

    let routes: Vec<RouteWithValidQuote> = chosen
        .iter()
        .map(|&i| quotes[search.items[i].quote].clone())
        .collect();
    let base_score: Fraction = routes.iter().map(|r| r.score()).fold(Fraction::zero(), |acc, s| acc + s);
    let extra = base_score - &score;

    info!(
        "Best combination: {} route(s), score {:.6} ({} combinations evaluated)",
        routes.len(),
        fraction_to_f64(&score),
        search.evaluated
    );
    for r in &routes {
        debug!("  {}% {} quote {}", r.percent, r.route, r.quote);
    }

    BestSwapRoute::from_routes(routes, extra)
        .ok_or_else(|| RouterError::no_route("empty combination"))
}

/// dp[j][q]: best sum of exactly `j` per-percent maxima covering `q` percent
fn completion_bounds(best_at: &HashMap<u32, Fraction>, max_splits: usize) -> Vec<Vec<Option<Fraction>>> {
    let mut dp: Vec<Vec<Option<Fraction>>> = vec![vec![None; 101]; max_splits + 1];
    dp[0][0] = Some(Fraction::zero());
    for j in 1..=max_splits {
        for q in 1..=100usize {
            let mut best: Option<Fraction> = None;
            for (&p, score) in best_at {
                let p = p as usize;
                if p > q {
                    continue;
                }
                if let Some(prev) = &dp[j - 1][q - p] {
                    let total = prev + score;
                    if best.as_ref().map_or(true, |b| total > *b) {
                        best = Some(total);
                    }
                }
            }
            dp[j][q] = best;
        }
    }
    dp
}
