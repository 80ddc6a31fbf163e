//! Phase 1: The Cartographer (Data Ingest)
//!
//! Indexed pool discovery, token metadata, block-pinned pool state via
//! Multicall3, and the token graph the search runs over.

pub mod fetcher;
pub mod graph;
pub mod multicall;
pub mod pool;
pub mod subgraph;
pub mod token_provider;

pub use fetcher::{OnChainPoolStateProvider, PoolDescriptor, PoolStateProvider};
pub use graph::{CandidatePoolConfig, CandidatePools, CandidatePoolsBuilder, PoolGraph};
pub use multicall::{BlockNumberProvider, CallResult, Multicall3Provider, MulticallProvider};
pub use pool::{Pool, PoolKind, PoolSwap, Protocol, Tick};
pub use subgraph::{
    GraphQlTransport, PoolSource, SubgraphConfig, SubgraphPool, SubgraphPoolProvider, SubgraphTransport,
};
pub use token_provider::{OnChainTokenProvider, TokenAccessor, TokenProvider};
