//! Swap Router - gas-aware split routing over Uniswap V2/V3 style pools
//!
//! The phases follow the data:
//! - `cartographer`: pool discovery, token metadata, block-pinned pool state
//! - `brain`: path enumeration and the split optimizer
//! - `simulator`: swap math and batched quoting
//! - `gas_model`: execution and L1 data costs
//! - `executor`: SwapRouter02 calldata
//!
//! `router::SwapRouter` ties them together.

pub mod amounts;
pub mod brain;
pub mod cache;
pub mod cartographer;
pub mod config;
pub mod error;
pub mod executor;
pub mod format;
pub mod gas_model;
pub mod gas_oracle;
pub mod router;
pub mod simulator;
pub mod tokens;

pub use amounts::{CurrencyAmount, Fraction, TradeType};
pub use error::{ProviderError, RouterError, RouterResult};
pub use router::{RouterConfig, RoutingOptions, SwapRequest, SwapRoute, SwapRouter};
pub use tokens::{ChainId, Currency, Token, TokenRegistry};
