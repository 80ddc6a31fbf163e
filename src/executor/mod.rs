//! Phase 4: The Executor
//!
//! Produces the calldata a wallet needs to submit the chosen route through
//! SwapRouter02. Signing and broadcasting are left to the caller.

pub mod method_parameters;

pub use method_parameters::{build_method_parameters, MethodParameters, SwapConfig};
