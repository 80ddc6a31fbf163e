//! Gas Price Oracle
//!
//! Current L2 execution gas price for costing routes. The RPC oracle caches
//! for a few seconds so back-to-back requests share one `eth_gasPrice` call,
//! and falls back to a configured price instead of failing the request.

use alloy_primitives::U256;
use alloy_provider::{DynProvider, Provider};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

// ============================================
// CONSTANTS
// ============================================

/// Cache duration for gas prices
const CACHE_DURATION_SECS: u64 = 10;

/// Anything above this is treated as a bad read (1000 gwei)
const MAX_GAS_WEI: u128 = 1_000_000_000_000;

const WEI_PER_GWEI: f64 = 1e9;

pub fn gwei_to_wei(gwei: f64) -> U256 {
    if !gwei.is_finite() || gwei <= 0.0 {
        return U256::ZERO;
    }
    U256::from((gwei * WEI_PER_GWEI).round() as u128)
}

// ============================================
// GAS PRICE INFO
// ============================================

#[derive(Debug, Clone)]
pub struct GasPriceInfo {
    pub gas_price_wei: U256,
    pub fetched_at: Instant,
    pub source: GasSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasSource {
    RpcProvider,
    Static,
    Fallback,
}

impl std::fmt::Display for GasSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GasSource::RpcProvider => write!(f, "RPC"),
            GasSource::Static => write!(f, "Static"),
            GasSource::Fallback => write!(f, "Fallback"),
        }
    }
}

impl GasPriceInfo {
    pub fn new(gas_price_wei: U256, source: GasSource) -> Self {
        Self {
            gas_price_wei,
            fetched_at: Instant::now(),
            source,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() > Duration::from_secs(CACHE_DURATION_SECS)
    }

    /// Lossy, for display
    pub fn gwei(&self) -> f64 {
        self.gas_price_wei.to_string().parse::<f64>().unwrap_or(0.0) / WEI_PER_GWEI
    }
}

#[async_trait]
pub trait GasPriceProvider: Send + Sync {
    /// Never fails: implementations fall back to a default price
    async fn gas_price(&self) -> GasPriceInfo;
}

// ============================================
// RPC ORACLE
// ============================================

pub struct GasOracle {
    provider: DynProvider,
    fallback_wei: U256,
    cache: Arc<RwLock<Option<GasPriceInfo>>>,
}

impl GasOracle {
    pub fn new(provider: DynProvider, fallback_gwei: f64) -> Self {
        Self {
            provider,
            fallback_wei: gwei_to_wei(fallback_gwei),
            cache: Arc::new(RwLock::new(None)),
        }
    }

    async fn fetch_gas_price(&self) -> GasPriceInfo {
        match self.provider.get_gas_price().await {
            Ok(wei) if wei <= MAX_GAS_WEI => {
                let info = GasPriceInfo::new(U256::from(wei), GasSource::RpcProvider);
                debug!("⛽ Gas from RPC: {:.4} gwei", info.gwei());
                info
            }
            Ok(wei) => {
                warn!("RPC gas price {} wei out of range, using fallback", wei);
                GasPriceInfo::new(self.fallback_wei, GasSource::Fallback)
            }
            Err(e) => {
                warn!("RPC gas fetch failed: {}", e);
                GasPriceInfo::new(self.fallback_wei, GasSource::Fallback)
            }
        }
    }
}

#[async_trait]
impl GasPriceProvider for GasOracle {
    async fn gas_price(&self) -> GasPriceInfo {
        {
            let cache = self.cache.read().await;
            if let Some(ref info) = *cache {
                if !info.is_stale() {
                    trace!("Using cached gas price: {:.4} gwei", info.gwei());
                    return info.clone();
                }
            }
        }

        let info = self.fetch_gas_price().await;

        {
            let mut cache = self.cache.write().await;
            *cache = Some(info.clone());
        }

        info
    }
}

// ============================================
// STATIC PRICE
// ============================================

/// Fixed gas price, for offline quoting and tests
pub struct StaticGasPrice(pub U256);

#[async_trait]
impl GasPriceProvider for StaticGasPrice {
    async fn gas_price(&self) -> GasPriceInfo {
        GasPriceInfo::new(self.0, GasSource::Static)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_price_info_stale() {
        let info = GasPriceInfo::new(U256::from(1_000_000u64), GasSource::Fallback);
        assert!(!info.is_stale());

        let old = GasPriceInfo {
            fetched_at: Instant::now() - Duration::from_secs(CACHE_DURATION_SECS + 1),
            ..info
        };
        assert!(old.is_stale());
    }

    #[test]
    fn test_gwei_conversion() {
        assert_eq!(gwei_to_wei(0.01), U256::from(10_000_000u64));
        assert_eq!(gwei_to_wei(20.0), U256::from(20_000_000_000u64));
        assert_eq!(gwei_to_wei(-1.0), U256::ZERO);
        let info = GasPriceInfo::new(gwei_to_wei(2.5), GasSource::Static);
        assert!((info.gwei() - 2.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_static_provider() {
        let info = StaticGasPrice(U256::from(7u8)).gas_price().await;
        assert_eq!(info.gas_price_wei, U256::from(7u8));
        assert_eq!(info.source, GasSource::Static);
    }
}
