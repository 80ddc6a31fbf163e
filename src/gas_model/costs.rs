//! Per-chain gas constants for the heuristic swap cost.

use crate::cartographer::Protocol;
use crate::tokens::ChainId;

/// Wrapping native into WETH before the swap
pub const NATIVE_WRAP_OVERHEAD: u64 = 27_938;
/// Unwrapping WETH back to native after the swap
pub const NATIVE_UNWRAP_OVERHEAD: u64 = 36_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasCosts {
    pub base: u64,
    pub per_initialized_tick: u64,
    pub per_uninitialized_tick: u64,
    pub per_extra_hop: u64,
}

impl GasCosts {
    /// Concentrated-liquidity costs
    pub fn v3(chain: ChainId) -> Self {
        match chain {
            ChainId::Mainnet => Self {
                base: 2_000,
                per_initialized_tick: 31_000,
                per_uninitialized_tick: 0,
                per_extra_hop: 80_000,
            },
            ChainId::Mode => Self {
                base: 5_000,
                per_initialized_tick: 31_000,
                per_uninitialized_tick: 0,
                per_extra_hop: 80_000,
            },
        }
    }

    /// Constant-product pairs never cross ticks
    pub fn v2(_chain: ChainId) -> Self {
        Self {
            base: 135_000,
            per_initialized_tick: 0,
            per_uninitialized_tick: 0,
            per_extra_hop: 50_000,
        }
    }

    pub fn for_protocol(chain: ChainId, protocol: Protocol) -> Self {
        match protocol {
            Protocol::V3 => Self::v3(chain),
            Protocol::V2 => Self::v2(chain),
        }
    }

    /// base + tick cost + hop cost; native overhead is added by the caller
    pub fn swap_gas(&self, hops: usize, initialized_ticks: u32) -> u64 {
        let extra_hops = hops.saturating_sub(1) as u64;
        self.base
            .saturating_add(self.per_initialized_tick.saturating_mul(initialized_ticks as u64))
            .saturating_add(self.per_extra_hop.saturating_mul(extra_hops))
    }
}

pub fn native_overhead(wraps_input: bool, unwraps_output: bool) -> u64 {
    let mut overhead = 0;
    if wraps_input {
        overhead += NATIVE_WRAP_OVERHEAD;
    }
    if unwraps_output {
        overhead += NATIVE_UNWRAP_OVERHEAD;
    }
    overhead
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_hops_three_ticks() {
        let costs = GasCosts::v3(ChainId::Mode);
        assert_eq!(costs.swap_gas(2, 3), 5_000 + 31_000 * 3 + 80_000);
        assert_eq!(costs.swap_gas(1, 0), 5_000);
    }

    #[test]
    fn test_native_overhead() {
        assert_eq!(native_overhead(false, false), 0);
        assert_eq!(native_overhead(true, true), 27_938 + 36_000);
    }
}
