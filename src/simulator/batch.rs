//! Batched Quote Fetcher
//!
//! Expands candidate routes × split percentages into quote requests, packs
//! them into batches bounded by call count and estimated gas, and runs every
//! batch concurrently against one pinned block. A timed-out or failed batch
//! only fails its own requests. The fetch as a whole fails when too large a
//! share of requests failed.

use alloy_primitives::U256;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::quoter::{QuoteProvider, QuoteRequest, RouteQuote};
use crate::amounts::{CurrencyAmount, TradeType};
use crate::brain::Route;
use crate::error::{RouterError, RouterResult};

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_calls_per_batch: usize,
    pub max_gas_per_batch: u64,
    /// Fixed gas of one quote call
    pub gas_per_call: u64,
    /// Added per pool in the route
    pub gas_per_hop: u64,
    pub timeout: Duration,
    /// failed / total above this fails the fetch
    pub max_failure_ratio: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_calls_per_batch: 100,
            max_gas_per_batch: 12_000_000,
            gas_per_call: 120_000,
            gas_per_hop: 80_000,
            timeout: Duration::from_millis(10_000),
            max_failure_ratio: 0.5,
        }
    }
}

/// Multiples of `step` up to 100. The full amount is always on the grid.
pub fn percent_grid(step: u32) -> Vec<u32> {
    let step = step.clamp(1, 100);
    let mut grid: Vec<u32> = (1..=100 / step).map(|i| i * step).collect();
    if grid.last() != Some(&100) {
        grid.push(100);
    }
    grid
}

/// One successful (route, percent) quote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawQuote {
    pub route_index: usize,
    pub percent: u32,
    pub amount: U256,
    pub quote: RouteQuote,
}

#[derive(Debug, Clone, Default)]
pub struct QuoteSet {
    pub quotes: Vec<RawQuote>,
    pub failed: usize,
    pub total: usize,
    pub batches: usize,
}

struct Pending {
    route_index: usize,
    percent: u32,
    request: QuoteRequest,
    gas: u64,
}

pub struct BatchedQuoteFetcher {
    quoter: Arc<dyn QuoteProvider>,
    config: BatchConfig,
}

impl BatchedQuoteFetcher {
    pub fn new(quoter: Arc<dyn QuoteProvider>, config: BatchConfig) -> Self {
        Self { quoter, config }
    }

    fn request_gas(&self, route: &Route) -> u64 {
        self.config
            .gas_per_call
            .saturating_add(self.config.gas_per_hop.saturating_mul(route.hops() as u64))
    }

    /// Split requests into batches; a batch closes when the next request
    /// would exceed either bound. A lone request over the gas bound still
    /// gets its own batch.
    fn plan_batches(&self, pending: Vec<Pending>) -> Vec<Vec<Pending>> {
        let max_calls = self.config.max_calls_per_batch.max(1);
        let mut batches: Vec<Vec<Pending>> = Vec::new();
        let mut current: Vec<Pending> = Vec::new();
        let mut current_gas = 0u64;

        for item in pending {
            let over_calls = current.len() + 1 > max_calls;
            let over_gas = current_gas.saturating_add(item.gas) > self.config.max_gas_per_batch;
            if !current.is_empty() && (over_calls || over_gas) {
                batches.push(std::mem::take(&mut current));
                current_gas = 0;
            }
            current_gas = current_gas.saturating_add(item.gas);
            current.push(item);
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    /// Quote every route at every percent of `amount`
    pub async fn get_quotes(
        &self,
        routes: &[Route],
        amount: &CurrencyAmount,
        percents: &[u32],
        trade_type: TradeType,
        block_number: u64,
    ) -> RouterResult<QuoteSet> {
        let mut pending = Vec::with_capacity(routes.len() * percents.len());
        for &percent in percents {
            let allotted = amount.percent_of(percent).quotient();
            if allotted.is_zero() {
                continue;
            }
            for (route_index, route) in routes.iter().enumerate() {
                pending.push(Pending {
                    route_index,
                    percent,
                    gas: self.request_gas(route),
                    request: QuoteRequest {
                        route: route.clone(),
                        amount: allotted,
                    },
                });
            }
        }

        self.execute(pending, trade_type, block_number).await
    }

    /// Quote specific (route, percent) allotments, e.g. a cached split.
    /// `route_index` in the result is the position in `allotments`.
    pub async fn get_route_quotes(
        &self,
        allotments: &[(Route, u32)],
        amount: &CurrencyAmount,
        trade_type: TradeType,
        block_number: u64,
    ) -> RouterResult<QuoteSet> {
        let pending = allotments
            .iter()
            .enumerate()
            .filter_map(|(route_index, (route, percent))| {
                let allotted = amount.percent_of(*percent).quotient();
                (!allotted.is_zero()).then(|| Pending {
                    route_index,
                    percent: *percent,
                    gas: self.request_gas(route),
                    request: QuoteRequest {
                        route: route.clone(),
                        amount: allotted,
                    },
                })
            })
            .collect();
        self.execute(pending, trade_type, block_number).await
    }

    async fn execute(&self, pending: Vec<Pending>, trade_type: TradeType, block_number: u64) -> RouterResult<QuoteSet> {
        let total = pending.len();
        if total == 0 {
            return Err(RouterError::no_route("nothing to quote"));
        }

        let batches = self.plan_batches(pending);
        let batch_count = batches.len();
        debug!(
            "Quoting {} requests in {} batch(es) at block {}",
            total, batch_count, block_number
        );

        let gas_limit = Some(self.config.max_gas_per_batch);
        let results = join_all(batches.iter().map(|batch| async move {
            let requests: Vec<QuoteRequest> = batch.iter().map(|p| p.request.clone()).collect();
            let call = self.quoter.quote_batch(&requests, trade_type, block_number, gas_limit);
            match tokio::time::timeout(self.config.timeout, call).await {
                Ok(Ok(quotes)) if quotes.len() == batch.len() => quotes,
                Ok(Ok(quotes)) => {
                    warn!("Quote batch returned {} results for {} requests", quotes.len(), batch.len());
                    vec![None; batch.len()]
                }
                Ok(Err(e)) => {
                    warn!("Quote batch of {} failed: {}", batch.len(), e);
                    vec![None; batch.len()]
                }
                Err(_) => {
                    warn!("Quote batch of {} timed out after {:?}", batch.len(), self.config.timeout);
                    vec![None; batch.len()]
                }
            }
        }))
        .await;

        let mut set = QuoteSet {
            total,
            batches: batch_count,
            ..Default::default()
        };
        for (batch, quotes) in batches.iter().zip(results) {
            for (pending, quote) in batch.iter().zip(quotes) {
                match quote {
                    Some(quote) => set.quotes.push(RawQuote {
                        route_index: pending.route_index,
                        percent: pending.percent,
                        amount: pending.request.amount,
                        quote,
                    }),
                    None => set.failed += 1,
                }
            }
        }

        let ratio = set.failed as f64 / set.total as f64;
        info!(
            quotes = set.quotes.len(),
            failed = set.failed,
            batches = set.batches,
            "Fetched quotes at block {}",
            block_number
        );
        if ratio > self.config.max_failure_ratio {
            return Err(RouterError::QuoteUnavailable {
                failed: set.failed,
                total: set.total,
            });
        }
        if set.quotes.is_empty() {
            return Err(RouterError::no_route("every quote request failed"));
        }
        Ok(set)
    }
}
