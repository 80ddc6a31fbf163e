//! Phase 2: The Brain
//!
//! Responsible for:
//! - Enumerating candidate paths through the pool graph
//! - Attaching gas costs to quoted routes
//! - Choosing the best single route or split

pub mod optimizer;
pub mod paths;
pub mod valid_quote;

pub use optimizer::{get_best_swap_route, BestSwapRoute, CombinationCost, OptimizerConfig};
pub use paths::{PathConfig, PathFinder, Route};
pub use valid_quote::RouteWithValidQuote;
