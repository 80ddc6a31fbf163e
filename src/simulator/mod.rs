//! Phase 3: The Simulator
//!
//! Responsible for:
//! - Exact concentrated-liquidity and constant-product swap math
//! - Quoting routes on-chain (QuoterV2) or against local snapshots
//! - Batching quote requests against one pinned block

pub mod batch;
pub mod quoter;
pub mod swap_math;
pub mod tick_math;

pub use batch::{percent_grid, BatchConfig, BatchedQuoteFetcher, QuoteSet, RawQuote};
pub use quoter::{simulate_route, LocalQuoter, OnChainQuoter, QuoteProvider, QuoteRequest, RouteQuote};
pub use swap_math::MathError;
