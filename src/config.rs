//! Configuration for the Swap Router
//!
//! Loaded from environment variables (with `.env` support) or a TOML file.
//! Everything has a default that works against Mode mainnet.

use alloy_primitives::Address;
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::cartographer::{CandidatePoolConfig, Protocol, SubgraphConfig};
use crate::router::{RouterConfig, RoutingOptions};
use crate::simulator::BatchConfig;
use crate::tokens::{ChainId, TokenRegistry};

// ============================================
// QUOTE SOURCE
// ============================================

/// Where route quotes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteSource {
    /// QuoterV2 through Multicall3, pinned to the request block
    OnChain,

    /// Local swap math over the refreshed pool snapshots
    Local,
}

impl Default for QuoteSource {
    fn default() -> Self {
        QuoteSource::OnChain
    }
}

impl std::fmt::Display for QuoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuoteSource::OnChain => write!(f, "ON-CHAIN (QuoterV2)"),
            QuoteSource::Local => write!(f, "LOCAL (swap math)"),
        }
    }
}

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ========== Network Settings ==========
    pub rpc_url: String,

    /// 919 = Mode, 1 = Ethereum Mainnet
    pub chain_id: u64,

    /// Concentrated-liquidity pool indexer; falls back to the chain default
    pub subgraph_url: Option<String>,

    /// Constant-product pool indexer, if the chain has one
    pub v2_subgraph_url: Option<String>,

    pub quote_source: QuoteSource,

    /// Overrides for the per-chain contract table
    pub quoter_address: Option<String>,
    pub swap_router_address: Option<String>,

    // ========== Routing ==========
    pub protocols: Vec<Protocol>,
    pub max_hops: usize,
    pub max_splits: usize,

    /// Split granularity in percent
    pub distribution_percent: u32,
    pub max_candidate_paths: usize,
    pub top_n: usize,
    pub top_n_direct: usize,
    pub top_n_token_in_out: usize,
    pub top_n_with_base: usize,
    pub max_candidate_pools: usize,

    // ========== Quoting ==========
    /// Calls per Multicall3 batch
    pub multicall_chunk: usize,
    pub max_gas_per_batch: u64,
    pub gas_per_quote_call: u64,
    pub gas_per_quote_hop: u64,
    pub quote_timeout_ms: u64,
    pub max_quote_failure_ratio: f64,

    // ========== Subgraph ==========
    pub subgraph_retries: u32,
    pub subgraph_timeout_ms: u64,
    pub subgraph_rollback: bool,
    pub subgraph_rollback_blocks: u64,
    pub subgraph_page_size: usize,
    pub min_tvl_eth: f64,

    // ========== Route Cache ==========
    pub route_cache_ttl_secs: u64,
    pub route_cache_blocks_to_live: u64,

    // ========== Gas ==========
    pub fallback_gas_price_gwei: f64,

    // ========== Token Filters ==========
    /// Never route through pools holding these
    pub blacklisted_tokens: Vec<String>,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|s| {
        s.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let protocols = match env_list("PROTOCOLS") {
            Some(items) => items
                .iter()
                .map(|p| Protocol::from_str(p).map_err(|e| eyre::eyre!(e)))
                .collect::<Result<Vec<_>>>()?,
            None => defaults.protocols.clone(),
        };

        Ok(Self {
            // Network
            rpc_url: env::var("RPC_URL").unwrap_or(defaults.rpc_url),
            chain_id: env_or("CHAIN_ID", defaults.chain_id),
            subgraph_url: env::var("SUBGRAPH_URL").ok(),
            v2_subgraph_url: env::var("V2_SUBGRAPH_URL").ok(),
            quote_source: match env::var("QUOTE_SOURCE")
                .unwrap_or_else(|_| "onchain".to_string())
                .to_lowercase()
                .as_str()
            {
                "local" => QuoteSource::Local,
                _ => QuoteSource::OnChain,
            },
            quoter_address: env::var("QUOTER_ADDRESS").ok(),
            swap_router_address: env::var("SWAP_ROUTER_ADDRESS").ok(),

            // Routing
            protocols,
            max_hops: env_or("MAX_HOPS", defaults.max_hops),
            max_splits: env_or("MAX_SPLITS", defaults.max_splits),
            distribution_percent: env_or("DISTRIBUTION_PERCENT", defaults.distribution_percent),
            max_candidate_paths: env_or("MAX_CANDIDATE_PATHS", defaults.max_candidate_paths),
            top_n: env_or("TOP_N", defaults.top_n),
            top_n_direct: env_or("TOP_N_DIRECT", defaults.top_n_direct),
            top_n_token_in_out: env_or("TOP_N_TOKEN_IN_OUT", defaults.top_n_token_in_out),
            top_n_with_base: env_or("TOP_N_WITH_BASE", defaults.top_n_with_base),
            max_candidate_pools: env_or("MAX_CANDIDATE_POOLS", defaults.max_candidate_pools),

            // Quoting
            multicall_chunk: env_or("MULTICALL_CHUNK", defaults.multicall_chunk),
            max_gas_per_batch: env_or("MAX_GAS_PER_BATCH", defaults.max_gas_per_batch),
            gas_per_quote_call: env_or("GAS_PER_QUOTE_CALL", defaults.gas_per_quote_call),
            gas_per_quote_hop: env_or("GAS_PER_QUOTE_HOP", defaults.gas_per_quote_hop),
            quote_timeout_ms: env_or("QUOTE_TIMEOUT_MS", defaults.quote_timeout_ms),
            max_quote_failure_ratio: env_or("MAX_QUOTE_FAILURE_RATIO", defaults.max_quote_failure_ratio),

            // Subgraph
            subgraph_retries: env_or("SUBGRAPH_RETRIES", defaults.subgraph_retries),
            subgraph_timeout_ms: env_or("SUBGRAPH_TIMEOUT_MS", defaults.subgraph_timeout_ms),
            subgraph_rollback: env_or("SUBGRAPH_ROLLBACK", defaults.subgraph_rollback),
            subgraph_rollback_blocks: env_or("SUBGRAPH_ROLLBACK_BLOCKS", defaults.subgraph_rollback_blocks),
            subgraph_page_size: env_or("SUBGRAPH_PAGE_SIZE", defaults.subgraph_page_size),
            min_tvl_eth: env_or("MIN_TVL_ETH", defaults.min_tvl_eth),

            // Route cache
            route_cache_ttl_secs: env_or("ROUTE_CACHE_TTL_SECS", defaults.route_cache_ttl_secs),
            route_cache_blocks_to_live: env_or("ROUTE_CACHE_BLOCKS_TO_LIVE", defaults.route_cache_blocks_to_live),

            // Gas
            fallback_gas_price_gwei: env_or("FALLBACK_GAS_PRICE_GWEI", defaults.fallback_gas_price_gwei),

            // Token filters
            blacklisted_tokens: env_list("BLACKLISTED_TOKENS").unwrap_or_default(),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn chain(&self) -> Result<ChainId> {
        ChainId::try_from(self.chain_id).map_err(|e| eyre::eyre!(e))
    }

    /// Chain registry with the configured contract overrides applied
    pub fn registry(&self) -> Result<TokenRegistry> {
        let mut registry = TokenRegistry::for_chain(self.chain()?);
        if let Some(quoter) = &self.quoter_address {
            registry = registry.with_quoter(Address::from_str(quoter)?);
        }
        if let Some(router) = &self.swap_router_address {
            registry = registry.with_swap_router(Address::from_str(router)?);
        }
        Ok(registry)
    }

    /// Configured URL, else the chain default
    pub fn effective_subgraph_url(&self, registry: &TokenRegistry) -> Option<String> {
        self.subgraph_url
            .clone()
            .or_else(|| registry.default_subgraph_url.clone())
    }

    /// Blacklisted token addresses; unparseable entries are skipped
    pub fn blacklist(&self) -> HashSet<Address> {
        self.blacklisted_tokens
            .iter()
            .filter_map(|s| Address::from_str(s.trim()).ok())
            .collect()
    }

    pub fn subgraph_config(&self) -> SubgraphConfig {
        SubgraphConfig {
            retries: self.subgraph_retries,
            timeout: Duration::from_millis(self.subgraph_timeout_ms),
            rollback: self.subgraph_rollback,
            rollback_blocks: self.subgraph_rollback_blocks,
            page_size: self.subgraph_page_size,
            min_tvl_eth: self.min_tvl_eth,
            ..SubgraphConfig::default()
        }
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_calls_per_batch: self.multicall_chunk,
            max_gas_per_batch: self.max_gas_per_batch,
            gas_per_call: self.gas_per_quote_call,
            gas_per_hop: self.gas_per_quote_hop,
            timeout: Duration::from_millis(self.quote_timeout_ms),
            max_failure_ratio: self.max_quote_failure_ratio,
        }
    }

    pub fn candidate_pool_config(&self) -> CandidatePoolConfig {
        CandidatePoolConfig {
            top_n: self.top_n,
            top_n_direct: self.top_n_direct,
            top_n_token_in_out: self.top_n_token_in_out,
            top_n_with_base: self.top_n_with_base,
            max_candidate_pools: self.max_candidate_pools,
        }
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            distribution_percent: self.distribution_percent,
            max_candidate_paths: self.max_candidate_paths,
        }
    }

    pub fn routing_options(&self) -> RoutingOptions {
        RoutingOptions {
            max_splits: self.max_splits,
            max_hops: self.max_hops,
            block_number: None,
            protocols: self.protocols.clone(),
            swap_config: None,
        }
    }

    pub fn route_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.route_cache_ttl_secs)
    }

    /// Validate configuration before wiring providers
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre::eyre!("Invalid RPC_URL - please set a reachable RPC endpoint"));
        }

        let registry = self.registry()?;
        if self.effective_subgraph_url(&registry).is_none() {
            return Err(eyre::eyre!(
                "No SUBGRAPH_URL set and chain {} has no default indexer",
                self.chain_id
            ));
        }
        if self.protocols.is_empty() {
            return Err(eyre::eyre!("PROTOCOLS must name at least one of v3, v2"));
        }

        // Sanity checks
        if self.distribution_percent == 0 || 100 % self.distribution_percent != 0 {
            return Err(eyre::eyre!(
                "DISTRIBUTION_PERCENT must divide 100 (currently {})",
                self.distribution_percent
            ));
        }
        if self.max_hops == 0 || self.max_hops > 6 {
            return Err(eyre::eyre!("MAX_HOPS must be between 1 and 6 (currently {})", self.max_hops));
        }
        if self.max_splits == 0 {
            return Err(eyre::eyre!("MAX_SPLITS must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.max_quote_failure_ratio) {
            return Err(eyre::eyre!(
                "MAX_QUOTE_FAILURE_RATIO must be within 0..=1 (currently {})",
                self.max_quote_failure_ratio
            ));
        }
        if self.multicall_chunk == 0 || self.subgraph_page_size == 0 {
            return Err(eyre::eyre!("MULTICALL_CHUNK and SUBGRAPH_PAGE_SIZE must be positive"));
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let protocols: Vec<String> = self.protocols.iter().map(|p| p.to_string()).collect();
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              SWAP ROUTER - CONFIGURATION                   ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chain ID:          {:^40} ║", self.chain_id);
        println!("║ Quote Source:      {:^40} ║", self.quote_source);
        println!("║ Protocols:         {:^40} ║", protocols.join(", "));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ ROUTING                                                    ║");
        println!("║ • Max Hops:        {:^40} ║", self.max_hops);
        println!("║ • Max Splits:      {:^40} ║", self.max_splits);
        println!("║ • Distribution:    {:>38}% ║", self.distribution_percent);
        println!("║ • Candidate Pools: {:^40} ║", self.max_candidate_pools);
        println!("║ • Candidate Paths: {:^40} ║", self.max_candidate_paths);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ QUOTING                                                    ║");
        println!("║ • Calls / Batch:   {:^40} ║", self.multicall_chunk);
        println!("║ • Gas / Batch:     {:^40} ║", self.max_gas_per_batch);
        println!("║ • Timeout:         {:>37}ms ║", self.quote_timeout_ms);
        println!("║ • Max Failures:    {:>37.0}% ║", self.max_quote_failure_ratio * 100.0);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SUBGRAPH                                                   ║");
        println!("║ • URL:             {:^40} ║",
            if self.subgraph_url.is_some() { "✓ Configured" } else { "Chain default" }
        );
        println!("║ • Retries:         {:^40} ║", self.subgraph_retries);
        println!("║ • Rollback:        {:^40} ║",
            if self.subgraph_rollback { format!("{} blocks", self.subgraph_rollback_blocks) } else { "✗ Disabled".to_string() }
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ CACHE & GAS                                                ║");
        println!("║ • Route TTL:       {:>39}s ║", self.route_cache_ttl_secs);
        println!("║ • Blocks to Live:  {:^40} ║", self.route_cache_blocks_to_live);
        println!("║ • Fallback Gas:    {:>35.4} gwei ║", self.fallback_gas_price_gwei);
        println!("║ • Blacklisted:     {:^40} ║", self.blacklisted_tokens.len());
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "https://mainnet.mode.network".to_string(),
            chain_id: 919,
            subgraph_url: None,
            v2_subgraph_url: None,
            quote_source: QuoteSource::OnChain,
            quoter_address: None,
            swap_router_address: None,
            protocols: vec![Protocol::V3],
            max_hops: 3,
            max_splits: 3,
            distribution_percent: 5,
            max_candidate_paths: 32,
            top_n: 2,
            top_n_direct: 2,
            top_n_token_in_out: 2,
            top_n_with_base: 2,
            max_candidate_pools: 64,
            multicall_chunk: 100,
            max_gas_per_batch: 12_000_000,
            gas_per_quote_call: 120_000,
            gas_per_quote_hop: 80_000,
            quote_timeout_ms: 10_000,
            max_quote_failure_ratio: 0.5,
            subgraph_retries: 2,
            subgraph_timeout_ms: 30_000,
            subgraph_rollback: true,
            subgraph_rollback_blocks: 10,
            subgraph_page_size: 1000,
            min_tvl_eth: 0.01,
            route_cache_ttl_secs: 60,
            route_cache_blocks_to_live: 2,
            fallback_gas_price_gwei: 0.01,
            blacklisted_tokens: vec![],
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chain().unwrap(), ChainId::Mode);
        assert_eq!(config.quote_source, QuoteSource::OnChain);
        assert_eq!(config.distribution_percent, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.distribution_percent = 0;
        assert!(config.validate().is_err());

        // grid must land on 100
        for step in [30, 7, 15, 101] {
            let mut config = Config::default();
            config.distribution_percent = step;
            assert!(config.validate().is_err(), "step {}", step);
        }
        for step in [1, 10, 25, 100] {
            let mut config = Config::default();
            config.distribution_percent = step;
            assert!(config.validate().is_ok(), "step {}", step);
        }

        let mut config = Config::default();
        config.max_quote_failure_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.chain_id = 56;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_and_blacklist() {
        let mut config = Config::default();
        config.quoter_address = Some("0x0000000000000000000000000000000000000abc".to_string());
        config.blacklisted_tokens = vec![
            "0x0000000000000000000000000000000000000001".to_string(),
            "not-an-address".to_string(),
        ];

        let registry = config.registry().unwrap();
        assert_eq!(
            registry.contracts.quoter_v2,
            Some(Address::from_str("0x0000000000000000000000000000000000000abc").unwrap())
        );
        assert_eq!(config.blacklist().len(), 1);
        assert_eq!(config.batch_config().max_calls_per_batch, 100);
        assert_eq!(config.subgraph_config().rollback_blocks, 10);
    }
}
