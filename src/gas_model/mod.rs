//! Gas Cost Model
//!
//! Execution gas per route from per-chain constants, priced into the quote
//! token and USD, plus the L1 data fee on rollups that charge one.

pub mod costs;
pub mod l1;
pub mod model;

pub use costs::{GasCosts, NATIVE_UNWRAP_OVERHEAD, NATIVE_WRAP_OVERHEAD};
pub use l1::{l1_fee, L1Fee, L1GasData, L2GasDataProvider, OnChainL2GasDataProvider};
pub use model::{GasCost, GasModel};
