//! Swap Router CLI
//!
//! Run with: cargo run -- --token-in ETH --token-out USDC --amount 1.5
//!
//! Loads `.env` (or a TOML file via `--config`), wires the live providers
//! and prints the best split route with its gas accounting.

use alloy_primitives::Address;
use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swap_router::amounts::parse_units;
use swap_router::cache::{CachedRouteStore, InMemoryCache};
use swap_router::cartographer::{
    CandidatePoolsBuilder, GraphQlTransport, Multicall3Provider, OnChainPoolStateProvider, OnChainTokenProvider,
    PoolSource, Protocol, SubgraphPoolProvider, TokenProvider,
};
use swap_router::config::{Config, QuoteSource};
use swap_router::executor::SwapConfig;
use swap_router::format::{pool_to_string, route_amount_to_string};
use swap_router::gas_model::OnChainL2GasDataProvider;
use swap_router::gas_oracle::GasOracle;
use swap_router::simulator::{BatchedQuoteFetcher, LocalQuoter, OnChainQuoter, QuoteProvider};
use swap_router::{Currency, SwapRequest, SwapRoute, SwapRouter, TokenRegistry, TradeType};

/// Route a swap across V2/V3 pools with gas-aware splitting
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// "ETH", a known symbol or a token address
    #[arg(long)]
    token_in: String,

    /// "ETH", a known symbol or a token address
    #[arg(long)]
    token_out: String,

    /// Human-readable amount of the fixed side
    #[arg(long)]
    amount: String,

    /// exactIn or exactOut
    #[arg(long, default_value = "exactIn")]
    trade_type: TradeType,

    /// Pin quotes to this block
    #[arg(long)]
    block: Option<u64>,

    /// TOML config instead of the environment
    #[arg(long)]
    config: Option<PathBuf>,

    /// Build SwapRouter02 calldata for this recipient
    #[arg(long)]
    recipient: Option<Address>,

    #[arg(long, default_value_t = 50)]
    slippage_bps: u32,

    /// Seconds until the calldata deadline
    #[arg(long, default_value_t = 1800)]
    deadline_secs: i64,

    #[arg(long)]
    max_splits: Option<usize>,

    #[arg(long)]
    max_hops: Option<usize>,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!("{}", style(" 🧭 SWAP ROUTER - Split Route Optimizer").cyan().bold());
    println!("{}", style("    V2 + V3 | Gas-Aware Splits | Block-Pinned Quotes").cyan());
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

/// Fills in metadata for addresses the registry does not know
async fn resolve_currency(
    input: &str,
    registry: &TokenRegistry,
    tokens: &dyn TokenProvider,
) -> Result<Currency> {
    let currency = registry
        .parse_currency(input)
        .ok_or_else(|| eyre!("Unknown token {}", input))?;

    match currency {
        Currency::Token(token) if token.symbol == "UNKNOWN" => {
            let accessor = tokens.get_tokens(&[token.address]).await?;
            let resolved = accessor
                .get_by_address(&token.address)
                .cloned()
                .ok_or_else(|| eyre!("Could not read token metadata for {}", token.address))?;
            Ok(Currency::Token(resolved))
        }
        other => Ok(other),
    }
}

fn print_route(route: &SwapRoute, elapsed_ms: u128) {
    println!();
    println!("{}", style("═══ BEST ROUTE ═══").green().bold());
    println!("   Block:               {}", route.block_number);
    println!("   Trade:               {} {}", route.trade_type, route.amount);
    println!("   Quote:               {}", route.quote);
    println!("   Gas adjusted quote:  {}", route.quote_gas_adjusted);
    println!("   Estimated gas:       {}", route.estimated_gas_used);
    println!("   Gas price:           {} wei", route.gas_price_wei);
    println!("   Gas cost:            {}", route.gas_cost_in_token);
    if let Some(usd) = &route.gas_cost_in_usd {
        println!("   Gas cost (USD):      {}", usd.to_fixed(2));
    }
    if let Some(l1) = &route.l1_fee {
        println!(
            "   L1 data fee:         {} L1 gas (~{} L2 gas)",
            l1.l1_gas_used, l1.l2_gas_equivalent
        );
    }

    println!();
    println!("{}", style("═══ SPLITS ═══").cyan().bold());
    for sub in &route.route {
        println!(
            "   {} {:>3}% {}",
            style(format!("[{}]", sub.route.protocol())).yellow(),
            sub.percent,
            route_amount_to_string(sub)
        );
        for pool in &sub.route.pools {
            println!("          {} {}", style("↳").dim(), pool_to_string(pool));
        }
        println!("          quote {} | gas {}", sub.quote, sub.gas.gas_estimate);
    }

    if let Some(params) = &route.method_parameters {
        println!();
        println!("{}", style("═══ CALLDATA ═══").magenta().bold());
        println!("   To:    {}", params.to);
        println!("   Value: {}", params.value);
        println!("   Data:  0x{}", hex::encode(&params.calldata));
    }

    println!();
    println!("   ⏱️  Routed in {}ms", elapsed_ms);
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("swap_router=info".parse()?),
        )
        .init();

    let args = Args::parse();
    print_banner();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;
    config.print_summary();

    // ==========================================
    // PHASE 1: PROVIDERS
    // ==========================================
    println!("{}", style("Phase 1: Connecting providers...").yellow().bold());

    let registry = Arc::new(config.registry()?);
    let multicall = Arc::new(Multicall3Provider::new(
        &config.rpc_url,
        registry.contracts.multicall,
        config.multicall_chunk,
    )?);

    let mut sources: Vec<Arc<dyn PoolSource>> = Vec::new();
    for protocol in &config.protocols {
        let url = match protocol {
            Protocol::V3 => config.effective_subgraph_url(&registry),
            Protocol::V2 => config.v2_subgraph_url.clone(),
        };
        match url {
            Some(url) => {
                let transport = Arc::new(GraphQlTransport::new(url)?);
                sources.push(Arc::new(SubgraphPoolProvider::new(
                    transport,
                    config.subgraph_config(),
                    *protocol,
                )));
            }
            None => warn!("No subgraph configured for {} pools, skipping", protocol),
        }
    }
    if sources.is_empty() {
        return Err(eyre!("No pool source available for {:?}", config.protocols));
    }

    let token_provider = Arc::new(OnChainTokenProvider::new(&registry, multicall.clone()));
    let state_provider = Arc::new(OnChainPoolStateProvider::new(multicall.clone()));
    let pools = CandidatePoolsBuilder::new(
        registry.clone(),
        sources,
        token_provider.clone(),
        state_provider,
        config.candidate_pool_config(),
        config.blacklist(),
    );

    let quoter: Arc<dyn QuoteProvider> = match (config.quote_source, registry.contracts.quoter_v2) {
        (QuoteSource::OnChain, Some(quoter)) => Arc::new(OnChainQuoter::new(multicall.clone(), quoter)),
        (QuoteSource::OnChain, None) => {
            warn!("⚠️ No QuoterV2 on chain {}, quoting locally", registry.chain_id);
            Arc::new(LocalQuoter)
        }
        (QuoteSource::Local, _) => Arc::new(LocalQuoter),
    };
    let quotes = BatchedQuoteFetcher::new(quoter, config.batch_config());

    let gas_oracle = Arc::new(GasOracle::new(
        multicall.provider().clone(),
        config.fallback_gas_price_gwei,
    ));
    let route_cache = CachedRouteStore::new(
        Arc::new(InMemoryCache::new(Some(config.route_cache_ttl()))),
        config.route_cache_ttl(),
        config.route_cache_blocks_to_live,
    );

    let mut router = SwapRouter::new(
        registry.clone(),
        pools,
        quotes,
        gas_oracle,
        multicall.clone(),
        route_cache,
        config.router_config(),
    );
    if registry.chain_id.has_l1_fee() {
        if let Some(oracle) = registry.contracts.gas_price_oracle {
            router = router.with_l2_gas_data(Arc::new(OnChainL2GasDataProvider::new(multicall.clone(), oracle)));
        }
    }
    println!("   ✅ Providers ready ({})", registry.chain_id);

    // ==========================================
    // PHASE 2: REQUEST
    // ==========================================
    println!();
    println!("{}", style("Phase 2: Resolving request...").yellow().bold());

    let token_in = resolve_currency(&args.token_in, &registry, token_provider.as_ref()).await?;
    let token_out = resolve_currency(&args.token_out, &registry, token_provider.as_ref()).await?;
    let fixed_decimals = match args.trade_type {
        TradeType::ExactInput => token_in.decimals(),
        TradeType::ExactOutput => token_out.decimals(),
    };
    let amount = parse_units(&args.amount, fixed_decimals)?;
    println!(
        "   {} {} → {} ({})",
        args.amount,
        token_in.symbol(),
        token_out.symbol(),
        args.trade_type
    );

    let mut options = config.routing_options();
    options.block_number = args.block;
    if let Some(max_splits) = args.max_splits {
        options.max_splits = max_splits;
    }
    if let Some(max_hops) = args.max_hops {
        options.max_hops = max_hops;
    }
    if let Some(recipient) = args.recipient {
        let deadline = chrono::Utc::now().timestamp() + args.deadline_secs;
        options.swap_config = Some(SwapConfig {
            recipient,
            slippage_bps: args.slippage_bps,
            deadline: deadline.max(0) as u64,
        });
    }

    // ==========================================
    // PHASE 3: ROUTING
    // ==========================================
    println!();
    println!("{}", style("Phase 3: Searching routes...").yellow().bold());

    let request = SwapRequest {
        token_in,
        token_out,
        amount,
        trade_type: args.trade_type,
    };
    let start = Instant::now();
    let route = router.find_best_swap_route(request, options).await?;
    let elapsed = start.elapsed().as_millis();

    info!(
        "✅ {} route(s), quote {} at block {}",
        route.route.len(),
        route.quote_gas_adjusted,
        route.block_number
    );
    print_route(&route, elapsed);

    Ok(())
}
