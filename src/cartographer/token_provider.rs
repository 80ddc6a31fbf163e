//! ERC-20 metadata provider
//!
//! Resolves token addresses into `Token`s with one multicall of
//! `symbol()` + `decimals()` per uncached address. Tokens where either call
//! fails are dropped. Resolved tokens are cached for the life of the process.

use alloy_primitives::{Address, Bytes, FixedBytes};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::multicall::{CallResult, MulticallProvider};
use crate::error::ProviderResult;
use crate::tokens::{ChainId, Token, TokenRegistry};

sol! {
    interface IERC20Metadata {
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }

    /// Pre-standard tokens (MKR, SAI) return bytes32
    interface IERC20Bytes32 {
        function symbol() external view returns (bytes32);
    }
}

// ============================================
// ACCESSOR
// ============================================

/// Lookup view over a resolved set of tokens
#[derive(Debug, Clone, Default)]
pub struct TokenAccessor {
    by_address: HashMap<Address, Token>,
}

impl TokenAccessor {
    pub fn from_tokens(tokens: impl IntoIterator<Item = Token>) -> Self {
        Self {
            by_address: tokens.into_iter().map(|t| (t.address, t)).collect(),
        }
    }

    pub fn get_by_address(&self, address: &Address) -> Option<&Token> {
        self.by_address.get(address)
    }

    /// Case-insensitive
    pub fn get_by_symbol(&self, symbol: &str) -> Option<&Token> {
        let wanted = symbol.to_lowercase();
        self.by_address
            .values()
            .find(|t| t.symbol.to_lowercase() == wanted)
    }

    pub fn get_all_tokens(&self) -> Vec<&Token> {
        self.by_address.values().collect()
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_tokens(&self, addresses: &[Address]) -> ProviderResult<TokenAccessor>;
}

// ============================================
// ON-CHAIN PROVIDER
// ============================================

pub struct OnChainTokenProvider {
    chain_id: ChainId,
    multicall: Arc<dyn MulticallProvider>,
    cache: RwLock<HashMap<Address, Token>>,
}

impl OnChainTokenProvider {
    pub fn new(registry: &TokenRegistry, multicall: Arc<dyn MulticallProvider>) -> Self {
        let seeded = registry
            .known_tokens()
            .map(|t| (t.address, t.clone()))
            .collect();
        Self {
            chain_id: registry.chain_id,
            multicall,
            cache: RwLock::new(seeded),
        }
    }

    fn decode_symbol(result: &CallResult) -> Option<String> {
        if let Some(symbol) = result.decode::<IERC20Metadata::symbolCall>() {
            return Some(symbol);
        }
        let raw: FixedBytes<32> = result.decode::<IERC20Bytes32::symbolCall>()?;
        let trimmed: Vec<u8> = raw.iter().copied().take_while(|b| *b != 0).collect();
        String::from_utf8(trimmed).ok().filter(|s| !s.is_empty())
    }
}

#[async_trait]
impl TokenProvider for OnChainTokenProvider {
    async fn get_tokens(&self, addresses: &[Address]) -> ProviderResult<TokenAccessor> {
        let unique: Vec<Address> = addresses
            .iter()
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let missing: Vec<Address> = {
            let cache = self.cache.read().await;
            unique.iter().filter(|a| !cache.contains_key(*a)).copied().collect()
        };

        if !missing.is_empty() {
            let symbol_data: Bytes = IERC20Metadata::symbolCall {}.abi_encode().into();
            let decimals_data: Bytes = IERC20Metadata::decimalsCall {}.abi_encode().into();
            let calls = missing
                .iter()
                .flat_map(|a| [(*a, symbol_data.clone()), (*a, decimals_data.clone())])
                .collect();

            let results = self.multicall.aggregate(calls, None, None).await?;

            let mut fetched = Vec::new();
            let mut dropped = Vec::new();
            for (i, address) in missing.iter().enumerate() {
                let symbol = results.get(i * 2).and_then(Self::decode_symbol);
                let decimals = results
                    .get(i * 2 + 1)
                    .and_then(|r| r.decode::<IERC20Metadata::decimalsCall>());

                match (symbol, decimals) {
                    (Some(symbol), Some(decimals)) => {
                        fetched.push(Token::new(self.chain_id, *address, decimals, symbol.clone(), symbol));
                    }
                    _ => dropped.push(*address),
                }
            }

            if !dropped.is_empty() {
                info!(
                    "Dropped {} token(s) with unreadable metadata: {:?}",
                    dropped.len(),
                    dropped
                );
            }
            debug!("Fetched metadata for {} new token(s)", fetched.len());

            let mut cache = self.cache.write().await;
            for token in fetched {
                cache.entry(token.address).or_insert(token);
            }
        }

        let cache = self.cache.read().await;
        Ok(TokenAccessor::from_tokens(
            unique.iter().filter_map(|a| cache.get(a).cloned()),
        ))
    }
}
