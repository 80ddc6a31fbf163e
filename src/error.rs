//! Error taxonomy for the router
//!
//! `RouterError` is what callers of `find_best_swap_route` see.
//! `ProviderError` is the transient failure of a single collaborator call;
//! the core absorbs it when it only concerns one item (one pool, one token,
//! one quote) and converts it into a `RouterError` only when a required
//! dependency is gone.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the routing core
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// Malformed token pair or amount. Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The indexer could not be read after exhausting retries
    #[error("pool source unavailable after {attempts} attempt(s): {reason}")]
    PoolSourceUnavailable { attempts: u32, reason: String },

    /// Too many individual quotes failed
    #[error("quotes unavailable: {failed}/{total} quote requests failed")]
    QuoteUnavailable { failed: usize, total: usize },

    /// Search completed but nothing valid came out of it
    #[error("no route found: {0}")]
    NoRouteFound(String),

    /// The block to pin quotes against could not be resolved
    #[error("block number unavailable: {0}")]
    BlockNumberUnavailable(String),
}

impl RouterError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        RouterError::InvalidRequest(msg.into())
    }

    pub fn no_route(msg: impl Into<String>) -> Self {
        RouterError::NoRouteFound(msg.into())
    }
}

/// A single external call failed. Recovered locally by dropping the item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The indexer has not caught up to the requested block
    #[error("indexer lagging: {message}")]
    IndexLag {
        indexed_up_to: Option<u64>,
        message: String,
    },
}

impl ProviderError {
    pub fn transport(e: impl std::fmt::Display) -> Self {
        ProviderError::Transport(e.to_string())
    }

    pub fn decode(e: impl std::fmt::Display) -> Self {
        ProviderError::Decode(e.to_string())
    }
}

pub type RouterResult<T> = std::result::Result<T, RouterError>;
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RouterError::QuoteUnavailable { failed: 7, total: 10 };
        assert_eq!(err.to_string(), "quotes unavailable: 7/10 quote requests failed");

        let err = RouterError::invalid("amount must be greater than zero");
        assert!(matches!(err, RouterError::InvalidRequest(_)));
    }
}
