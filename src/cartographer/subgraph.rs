//! Subgraph Pool Provider
//!
//! Pulls every pool from the indexer, 1000 at a time keyed by pool id, as of
//! an optional block. The whole paginated fetch is one attempt: it runs under
//! a hard timeout and is restarted from the first page on failure. When the
//! indexer reports it has not reached the requested block, the next attempt
//! asks for an earlier one.

use alloy_primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::pool::Protocol;
use crate::error::{ProviderError, ProviderResult, RouterError, RouterResult};

// ============================================
// CONSTANTS
// ============================================

pub const PAGE_SIZE: usize = 1000;

const POOLS_QUERY: &str = r#"
query getPools($pageSize: Int!, $id: String) {
  pools(first: $pageSize, __BLOCK__ where: { id_gt: $id }) {
    id
    token0 { symbol id }
    token1 { symbol id }
    feeTier
    liquidity
    totalValueLockedUSD
    totalValueLockedETH
  }
}
"#;

// ============================================
// RECORDS
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawToken {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
}

/// A pool record exactly as the indexer returns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSubgraphPool {
    pub id: String,
    pub token0: RawToken,
    pub token1: RawToken,
    pub fee_tier: String,
    pub liquidity: String,
    #[serde(rename = "totalValueLockedUSD", default)]
    pub total_value_locked_usd: String,
    #[serde(rename = "totalValueLockedETH", default)]
    pub total_value_locked_eth: String,
}

/// Normalized pool metadata. Value-locked figures only rank pools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphPool {
    pub id: Address,
    pub token0: Address,
    pub token1: Address,
    pub fee_tier: u32,
    pub liquidity: u128,
    pub tvl_eth: f64,
    pub tvl_usd: f64,
    pub protocol: Protocol,
}

impl SubgraphPool {
    fn from_raw(raw: &RawSubgraphPool, protocol: Protocol) -> Option<Self> {
        let parse_address = |s: &str| Address::from_str(&s.to_lowercase()).ok();
        Some(Self {
            id: parse_address(&raw.id)?,
            token0: parse_address(&raw.token0.id)?,
            token1: parse_address(&raw.token1.id)?,
            fee_tier: raw.fee_tier.parse().ok()?,
            liquidity: raw.liquidity.parse().unwrap_or(0),
            tvl_eth: raw.total_value_locked_eth.parse().unwrap_or(0.0),
            tvl_usd: raw.total_value_locked_usd.parse().unwrap_or(0.0),
            protocol,
        })
    }
}

// ============================================
// TRANSPORT
// ============================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub page_size: usize,
    pub last_id: String,
    pub block_number: Option<u64>,
}

/// One page request against the indexer. Policy lives in the provider.
#[async_trait]
pub trait SubgraphTransport: Send + Sync {
    async fn query_pools(&self, query: &PageQuery) -> ProviderResult<Vec<RawSubgraphPool>>;
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<PoolsData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct PoolsData {
    pools: Vec<RawSubgraphPool>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

pub struct GraphQlTransport {
    client: Client,
    url: String,
}

impl GraphQlTransport {
    pub fn new(url: impl Into<String>) -> eyre::Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Classify an indexer error. Lag errors become a typed variant here so
    /// nothing downstream inspects message text.
    fn classify(message: String) -> ProviderError {
        let lower = message.to_lowercase();
        match lower.find("indexed up to") {
            Some(pos) => {
                let indexed_up_to = lower[pos..]
                    .split(|c: char| !c.is_ascii_digit())
                    .find(|s| !s.is_empty())
                    .and_then(|s| s.parse().ok());
                ProviderError::IndexLag {
                    indexed_up_to,
                    message,
                }
            }
            None => ProviderError::Transport(message),
        }
    }
}

#[async_trait]
impl SubgraphTransport for GraphQlTransport {
    async fn query_pools(&self, query: &PageQuery) -> ProviderResult<Vec<RawSubgraphPool>> {
        let block_clause = query
            .block_number
            .map(|n| format!("block: {{ number: {} }},", n))
            .unwrap_or_default();
        let body = serde_json::json!({
            "query": POOLS_QUERY.replace("__BLOCK__", &block_clause),
            "variables": { "pageSize": query.page_size, "id": query.last_id },
        });

        let response: GraphQlResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::transport)?
            .json()
            .await
            .map_err(ProviderError::decode)?;

        if let Some(error) = response.errors.into_iter().next() {
            return Err(Self::classify(error.message));
        }

        response
            .data
            .map(|d| d.pools)
            .ok_or_else(|| ProviderError::decode("response has neither data nor errors"))
    }
}

// ============================================
// PROVIDER
// ============================================

#[derive(Debug, Clone)]
pub struct SubgraphConfig {
    /// Additional attempts after the first
    pub retries: u32,
    pub timeout: Duration,
    pub rollback: bool,
    pub rollback_blocks: u64,
    pub page_size: usize,
    pub min_tvl_eth: f64,
    pub backoff: Duration,
}

impl Default for SubgraphConfig {
    fn default() -> Self {
        Self {
            retries: 2,
            timeout: Duration::from_millis(30_000),
            rollback: true,
            rollback_blocks: 10,
            page_size: PAGE_SIZE,
            min_tvl_eth: 0.01,
            backoff: Duration::from_millis(100),
        }
    }
}

/// What one paginated attempt produced
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(Vec<RawSubgraphPool>),
    /// Retry at this earlier block
    IndexLag(u64),
    Failure(String),
}

/// Source of raw pool metadata for one protocol
#[async_trait]
pub trait PoolSource: Send + Sync {
    fn protocol(&self) -> Protocol;

    async fn get_pools(&self, block_number: Option<u64>) -> RouterResult<Vec<SubgraphPool>>;
}

pub struct SubgraphPoolProvider {
    transport: Arc<dyn SubgraphTransport>,
    config: SubgraphConfig,
    protocol: Protocol,
}

impl SubgraphPoolProvider {
    pub fn new(transport: Arc<dyn SubgraphTransport>, config: SubgraphConfig, protocol: Protocol) -> Self {
        Self {
            transport,
            config,
            protocol,
        }
    }

    async fn fetch_all_pages(&self, block_number: Option<u64>) -> ProviderResult<Vec<RawSubgraphPool>> {
        let mut pools = Vec::new();
        let mut last_id = String::new();
        let mut pages = 0usize;

        loop {
            let page = self
                .transport
                .query_pools(&PageQuery {
                    page_size: self.config.page_size,
                    last_id: last_id.clone(),
                    block_number,
                })
                .await?;
            pages += 1;

            let Some(last) = page.last() else {
                break;
            };
            last_id = last.id.clone();
            pools.extend(page);
        }

        debug!("Subgraph: {} pools over {} page request(s)", pools.len(), pages);
        Ok(pools)
    }

    async fn attempt(&self, block_number: Option<u64>) -> AttemptOutcome {
        match tokio::time::timeout(self.config.timeout, self.fetch_all_pages(block_number)).await {
            Ok(Ok(pools)) => AttemptOutcome::Success(pools),
            Ok(Err(ProviderError::IndexLag { message, .. })) => match block_number {
                Some(block) if self.config.rollback => {
                    AttemptOutcome::IndexLag(block.saturating_sub(self.config.rollback_blocks))
                }
                _ => AttemptOutcome::Failure(message),
            },
            Ok(Err(e)) => AttemptOutcome::Failure(e.to_string()),
            Err(_) => AttemptOutcome::Failure(
                ProviderError::Timeout(self.config.timeout).to_string(),
            ),
        }
    }

    /// Keep pools with any active liquidity or value locked above the floor
    fn filter_and_normalize(&self, raw: Vec<RawSubgraphPool>) -> Vec<SubgraphPool> {
        let total = raw.len();
        let pools: Vec<SubgraphPool> = raw
            .iter()
            .filter_map(|r| SubgraphPool::from_raw(r, self.protocol))
            .filter(|p| p.liquidity > 0 || p.tvl_eth > self.config.min_tvl_eth)
            .collect();
        info!(
            "Subgraph: kept {}/{} {} pools after liquidity filter",
            pools.len(),
            total,
            self.protocol
        );
        pools
    }
}

#[async_trait]
impl PoolSource for SubgraphPoolProvider {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn get_pools(&self, block_number: Option<u64>) -> RouterResult<Vec<SubgraphPool>> {
        let attempts = self.config.retries + 1;
        let mut block = block_number;
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=attempts {
            match self.attempt(block).await {
                AttemptOutcome::Success(raw) => return Ok(self.filter_and_normalize(raw)),
                AttemptOutcome::IndexLag(earlier) => {
                    info!(
                        "Subgraph lagging at block {:?}, rolling back to {} (attempt {}/{})",
                        block, earlier, attempt, attempts
                    );
                    last_error = format!("indexer behind block {:?}", block);
                    block = Some(earlier);
                }
                AttemptOutcome::Failure(e) => {
                    warn!("Subgraph attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e;
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.config.backoff * 2u32.saturating_pow(attempt - 1)).await;
            }
        }

        Err(RouterError::PoolSourceUnavailable {
            attempts,
            reason: last_error,
        })
    }
}
