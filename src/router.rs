//! Swap Router
//!
//! Entry point of the library. One call to `find_best_swap_route`:
//!
//! 1. validates the request and pins a block
//! 2. serves a fresh cached split if there is one (re-quoted at the block)
//! 3. otherwise builds candidate pools, enumerates paths, quotes every path
//!    at every split percentage, prices gas and picks the best combination
//! 4. stores the winning split for the next request on the same pair
//!
//! Every quote taken for a request uses the same block number.

use alloy_primitives::{Address, U256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::amounts::{CurrencyAmount, TradeType};
use crate::brain::{
    get_best_swap_route, BestSwapRoute, CombinationCost, OptimizerConfig, PathConfig, PathFinder, Route, RouteWithValidQuote,
};
use crate::cache::{CachedRoute, CachedRouteStore, CachedRoutes, RouteCacheKey};
use crate::cartographer::{BlockNumberProvider, CandidatePools, CandidatePoolsBuilder, Pool, Protocol};
use crate::error::{RouterError, RouterResult};
use crate::executor::{build_method_parameters, MethodParameters, SwapConfig};
use crate::gas_model::{l1_fee, GasModel, L1Fee, L1GasData, L2GasDataProvider};
use crate::gas_oracle::GasPriceProvider;
use crate::simulator::{percent_grid, BatchedQuoteFetcher, QuoteSet};
use crate::tokens::{Currency, Token, TokenRegistry};

// ============================================
// REQUEST / RESPONSE TYPES
// ============================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub token_in: Currency,
    pub token_out: Currency,
    /// Raw units of `token_in` for exact-in, of `token_out` for exact-out
    pub amount: U256,
    pub trade_type: TradeType,
}

#[derive(Debug, Clone)]
pub struct RoutingOptions {
    pub max_splits: usize,
    pub max_hops: usize,
    /// Pin quotes to this block instead of the latest
    pub block_number: Option<u64>,
    pub protocols: Vec<Protocol>,
    /// When set, the result carries SwapRouter02 calldata
    pub swap_config: Option<SwapConfig>,
}

impl Default for RoutingOptions {
    fn default() -> Self {
        Self {
            max_splits: 3,
            max_hops: 3,
            block_number: None,
            protocols: vec![Protocol::V3, Protocol::V2],
            swap_config: None,
        }
    }
}

/// Router-wide search settings
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Split granularity in percent
    pub distribution_percent: u32,
    pub max_candidate_paths: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            distribution_percent: 5,
            max_candidate_paths: 32,
        }
    }
}

/// The chosen execution and everything a caller needs to judge or submit it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRoute {
    pub trade_type: TradeType,
    /// Total fixed side (input for exact-in)
    pub amount: CurrencyAmount,
    /// Total counter side before gas
    pub quote: CurrencyAmount,
    /// `quote` net of all gas, L1 fee included
    pub quote_gas_adjusted: CurrencyAmount,
    /// Per sub-route breakdown, largest share first
    pub route: Vec<RouteWithValidQuote>,
    /// L2 execution gas plus the L1 fee expressed as L2 gas
    pub estimated_gas_used: U256,
    pub gas_price_wei: U256,
    pub gas_cost_in_token: CurrencyAmount,
    pub gas_cost_in_usd: Option<CurrencyAmount>,
    pub l1_fee: Option<L1Fee>,
    pub block_number: u64,
    pub method_parameters: Option<MethodParameters>,
}

impl SwapRoute {
    pub fn percent_total(&self) -> u32 {
        self.route.iter().map(|r| r.percent).sum()
    }
}

// ============================================
// PER-REQUEST CONTEXT
// ============================================

/// Everything fixed once a request has been validated and pinned
struct Pinned {
    token_in: Token,
    token_out: Token,
    input_is_native: bool,
    output_is_native: bool,
    trade_type: TradeType,
    amount: CurrencyAmount,
    block_number: u64,
    gas_price_wei: U256,
    l1_data: Option<L1GasData>,
    swap_config: Option<SwapConfig>,
}

impl Pinned {
    fn quote_token(&self) -> &Token {
        match self.trade_type {
            TradeType::ExactInput => &self.token_out,
            TradeType::ExactOutput => &self.token_in,
        }
    }
}

// ============================================
// ROUTER
// ============================================

pub struct SwapRouter {
    registry: Arc<TokenRegistry>,
    pools: CandidatePoolsBuilder,
    quotes: BatchedQuoteFetcher,
    gas_price: Arc<dyn GasPriceProvider>,
    blocks: Arc<dyn BlockNumberProvider>,
    l2_gas_data: Option<Arc<dyn L2GasDataProvider>>,
    route_cache: CachedRouteStore,
    config: RouterConfig,
}

impl SwapRouter {
    pub fn new(
        registry: Arc<TokenRegistry>,
        pools: CandidatePoolsBuilder,
        quotes: BatchedQuoteFetcher,
        gas_price: Arc<dyn GasPriceProvider>,
        blocks: Arc<dyn BlockNumberProvider>,
        route_cache: CachedRouteStore,
        config: RouterConfig,
    ) -> Self {
        Self {
            registry,
            pools,
            quotes,
            gas_price,
            blocks,
            l2_gas_data: None,
            route_cache,
            config,
        }
    }

    /// Enables the L1 data fee on chains that charge one
    pub fn with_l2_gas_data(mut self, provider: Arc<dyn L2GasDataProvider>) -> Self {
        self.l2_gas_data = Some(provider);
        self
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub async fn find_best_swap_route(&self, request: SwapRequest, options: RoutingOptions) -> RouterResult<SwapRoute> {
        let (token_in, token_out) = self.validate(&request, &options)?;

        let block_number = match options.block_number {
            Some(block) => block,
            None => self
                .blocks
                .block_number()
                .await
                .map_err(|e| RouterError::BlockNumberUnavailable(e.to_string()))?,
        };

        let gas_price_wei = self.gas_price.gas_price().await.gas_price_wei;
        let l1_data = self.l1_gas_data(block_number).await;

        let amount_token = match request.trade_type {
            TradeType::ExactInput => token_in.clone(),
            TradeType::ExactOutput => token_out.clone(),
        };
        let pinned = Pinned {
            input_is_native: request.token_in.is_native(),
            output_is_native: request.token_out.is_native(),
            trade_type: request.trade_type,
            amount: CurrencyAmount::from_raw(amount_token, request.amount),
            block_number,
            gas_price_wei,
            l1_data,
            swap_config: options.swap_config.clone(),
            token_in,
            token_out,
        };

        info!(
            "🔍 Routing {} → {}: {} {} at block {}",
            request.token_in,
            request.token_out,
            pinned.trade_type,
            pinned.amount,
            block_number
        );

        let key = RouteCacheKey::new(
            self.registry.chain_id,
            pinned.token_in.address,
            pinned.token_out.address,
            pinned.trade_type,
            &options.protocols,
        );

        if let Some(cached) = self.route_cache.get(&key, Some(block_number)).await {
            match self.route_from_cache(&pinned, &cached).await {
                Ok(route) => {
                    info!(cache = "hit", routes = route.route.len(), "Served cached split");
                    return Ok(route);
                }
                Err(e) => {
                    warn!("Cached routes failed to re-quote, searching from scratch: {}", e);
                    self.route_cache.mark_stale(&key, &cached).await;
                }
            }
        }

        let (route, pricing_pools) = self.search(&pinned, &options).await?;

        let entry = CachedRoutes::new(
            route
                .route
                .iter()
                .map(|r| CachedRoute {
                    route: r.route.clone(),
                    percent: r.percent,
                })
                .collect(),
            block_number,
        )?
        .with_pricing_pools(pricing_pools);
        if !self.route_cache.put(&key, entry).await {
            warn!("Route cache rejected entry for {}", key);
        }

        Ok(route)
    }

    fn validate(&self, request: &SwapRequest, options: &RoutingOptions) -> RouterResult<(Token, Token)> {
        if request.amount.is_zero() {
            return Err(RouterError::invalid("amount must be greater than zero"));
        }
        if options.protocols.is_empty() {
            return Err(RouterError::invalid("at least one protocol is required"));
        }
        if options.max_hops == 0 {
            return Err(RouterError::invalid("max_hops must be at least 1"));
        }
        for currency in [&request.token_in, &request.token_out] {
            if currency.chain_id() != self.registry.chain_id {
                return Err(RouterError::invalid(format!(
                    "{} is on {}, router serves {}",
                    currency,
                    currency.chain_id(),
                    self.registry.chain_id
                )));
            }
        }

        let token_in = request.token_in.wrapped(&self.registry);
        let token_out = request.token_out.wrapped(&self.registry);
        if token_in.address == token_out.address {
            return Err(RouterError::invalid(format!(
                "token in and token out resolve to the same address {:?}",
                token_in.address
            )));
        }
        Ok((token_in, token_out))
    }

    /// Absorbs failures: without oracle data the L1 fee is left out
    async fn l1_gas_data(&self, block_number: u64) -> Option<L1GasData> {
        if !self.registry.chain_id.has_l1_fee() {
            return None;
        }
        let provider = self.l2_gas_data.as_ref()?;
        match provider.gas_data(block_number).await {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("L1 gas data unavailable, ignoring L1 fee: {}", e);
                None
            }
        }
    }

    // ============================================
    // FULL SEARCH
    // ============================================

    async fn search(&self, pinned: &Pinned, options: &RoutingOptions) -> RouterResult<(SwapRoute, Vec<Pool>)> {
        let candidates = self
            .pools
            .build(&pinned.token_in, &pinned.token_out, &options.protocols, pinned.block_number)
            .await?;
        if candidates.graph.pool_count() == 0 {
            return Err(RouterError::no_route(format!(
                "no candidate pools for {} → {}",
                pinned.token_in, pinned.token_out
            )));
        }

        let finder = PathFinder::new(
            &candidates.graph,
            &self.registry,
            PathConfig {
                max_hops: options.max_hops,
                max_candidate_paths: self.config.max_candidate_paths,
            },
        );
        let routes = finder.compute_all_routes(&pinned.token_in, &pinned.token_out)?;
        if routes.is_empty() {
            return Err(RouterError::no_route(format!(
                "no path within {} hops from {} to {}",
                options.max_hops, pinned.token_in, pinned.token_out
            )));
        }

        let percents = percent_grid(self.config.distribution_percent);
        let quotes = self
            .quotes
            .get_quotes(&routes, &pinned.amount, &percents, pinned.trade_type, pinned.block_number)
            .await?;

        let route = self.choose(pinned, &candidates, &routes, &quotes, options.max_splits)?;
        Ok((route, candidates.pricing_pools()))
    }

    // ============================================
    // CACHE PATH
    // ============================================

    async fn route_from_cache(&self, pinned: &Pinned, cached: &CachedRoutes) -> RouterResult<SwapRoute> {
        let candidates = self
            .pools
            .refresh(&cached.route_pools(), &cached.pricing_pools, pinned.block_number)
            .await?;

        let mut allotments: Vec<(Route, u32)> = Vec::with_capacity(cached.routes.len());
        for entry in &cached.routes {
            let pools = entry
                .route
                .pools
                .iter()
                .map(|pool| {
                    candidates
                        .graph
                        .pools()
                        .iter()
                        .find(|p| p.address == pool.address)
                        .cloned()
                        .ok_or_else(|| RouterError::no_route(format!("cached pool {:?} has no liquidity", pool.address)))
                })
                .collect::<RouterResult<Vec<Pool>>>()?;
            let route = Route::new(pools, entry.route.input.clone(), entry.route.output.clone())?;
            allotments.push((route, entry.percent));
        }

        let quotes = self
            .quotes
            .get_route_quotes(&allotments, &pinned.amount, pinned.trade_type, pinned.block_number)
            .await?;
        if quotes.failed > 0 {
            return Err(RouterError::QuoteUnavailable {
                failed: quotes.failed,
                total: quotes.total,
            });
        }

        let routes: Vec<Route> = allotments.into_iter().map(|(route, _)| route).collect();
        let route = self.choose(pinned, &candidates, &routes, &quotes, routes.len())?;
        if route.percent_total() != 100 || route.route.len() != routes.len() {
            return Err(RouterError::no_route("cached split no longer covers the full amount"));
        }
        Ok(route)
    }

    // ============================================
    // COMMON TAIL
    // ============================================

    /// Attach gas to quotes, run the optimizer, assemble the result
    fn choose(
        &self,
        pinned: &Pinned,
        candidates: &CandidatePools,
        routes: &[Route],
        quotes: &QuoteSet,
        max_splits: usize,
    ) -> RouterResult<SwapRoute> {
        let model = GasModel::new(
            &self.registry,
            pinned.gas_price_wei,
            pinned.quote_token(),
            candidates,
            pinned.input_is_native,
            pinned.output_is_native,
        );

        let valid: Vec<RouteWithValidQuote> = quotes
            .quotes
            .iter()
            .filter_map(|raw| {
                let route = routes.get(raw.route_index)?;
                Some(RouteWithValidQuote::new(
                    route.clone(),
                    raw.percent,
                    pinned.trade_type,
                    raw.amount,
                    raw.quote.amount,
                    raw.quote.initialized_ticks_crossed,
                    raw.quote.gas_estimate,
                    &model,
                ))
            })
            .collect();
        debug!("{} valid quotes across {} routes", valid.len(), routes.len());

        let optimizer = OptimizerConfig {
            max_splits: max_splits.max(1),
        };
        let best = match &pinned.l1_data {
            Some(data) => {
                let l1_cost: &CombinationCost = &|members| {
                    let owned: Vec<RouteWithValidQuote> = members.iter().map(|r| (*r).clone()).collect();
                    let fee = self.l1_fee_for(pinned, &owned, data);
                    model.price_native(fee.fee_wei).gas_cost_in_token.value
                };
                get_best_swap_route(valid, &optimizer, Some(l1_cost))?
            }
            None => get_best_swap_route(valid, &optimizer, None)?,
        };

        Ok(self.assemble(pinned, &model, best))
    }

    fn calldata_for(&self, pinned: &Pinned, routes: &[RouteWithValidQuote]) -> MethodParameters {
        let config = pinned.swap_config.clone().unwrap_or_default();
        build_method_parameters(
            routes,
            pinned.trade_type,
            pinned.input_is_native,
            pinned.output_is_native,
            &config,
            self.registry.contracts.swap_router_02.unwrap_or(Address::ZERO),
        )
    }

    fn l1_fee_for(&self, pinned: &Pinned, routes: &[RouteWithValidQuote], data: &L1GasData) -> L1Fee {
        let parameters = self.calldata_for(pinned, routes);
        l1_fee(&parameters.calldata, data, pinned.gas_price_wei)
    }

    fn assemble(&self, pinned: &Pinned, model: &GasModel, mut best: BestSwapRoute) -> SwapRoute {
        best.settle_remainder(&pinned.amount);

        let l1 = pinned
            .l1_data
            .as_ref()
            .map(|data| self.l1_fee_for(pinned, &best.routes, data));

        let mut gas = best.gas.clone();
        let mut quote_gas_adjusted = best.quote_gas_adjusted.clone();
        let mut estimated_gas_used = best.gas.gas_estimate;
        if let Some(fee) = &l1 {
            let priced = model.price_native(fee.fee_wei.clone());
            quote_gas_adjusted = match pinned.trade_type {
                TradeType::ExactInput => quote_gas_adjusted.sub(&priced.gas_cost_in_token),
                TradeType::ExactOutput => quote_gas_adjusted.add(&priced.gas_cost_in_token),
            };
            gas = gas.add(&priced);
            estimated_gas_used = estimated_gas_used.saturating_add(fee.l2_gas_equivalent);
        }

        let method_parameters = match (&pinned.swap_config, self.registry.contracts.swap_router_02) {
            (Some(_), Some(_)) => Some(self.calldata_for(pinned, &best.routes)),
            (Some(_), None) => {
                warn!("No SwapRouter02 address for {}; calldata omitted", self.registry.chain_id);
                None
            }
            (None, _) => None,
        };

        info!(
            routes = best.routes.len(),
            gas = %estimated_gas_used,
            "✅ Best route: {} for {} (gas adjusted {})",
            best.quote,
            best.amount,
            quote_gas_adjusted
        );

        SwapRoute {
            trade_type: pinned.trade_type,
            amount: best.amount,
            quote: best.quote,
            quote_gas_adjusted,
            route: best.routes,
            estimated_gas_used,
            gas_price_wei: pinned.gas_price_wei,
            gas_cost_in_token: gas.gas_cost_in_token,
            gas_cost_in_usd: gas.gas_cost_in_usd,
            l1_fee: l1,
            block_number: pinned.block_number,
            method_parameters,
        }
    }
}
