//! Batch Call Execution - MULTICALL3 Edition
//!
//! Every on-chain read the router makes (token metadata, pool state, quotes,
//! L1 fee parameters) goes through `MulticallProvider`. Individual call
//! failures come back as `success: false`; only transport failures error.

use alloy_eips::BlockId;
use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, Bytes};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use eyre::{eyre, Result};
use futures::future::try_join_all;
use tracing::{debug, trace};

use crate::error::{ProviderError, ProviderResult};

// ============================================
// MULTICALL3 INTERFACE
// ============================================

sol! {
    /// Multicall3 - deployed at same address on all EVM chains
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external payable returns (Result[] memory returnData);
    }
}

/// Maximum calls per aggregate3 (to avoid gas limits)
pub const MAX_CALLS_PER_BATCH: usize = 100;

// ============================================
// PROVIDER CONTRACT
// ============================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    pub success: bool,
    pub return_data: Bytes,
}

impl CallResult {
    pub fn ok(data: impl Into<Bytes>) -> Self {
        Self {
            success: true,
            return_data: data.into(),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            return_data: Bytes::new(),
        }
    }

    /// Decode the return data of a successful call
    pub fn decode<C: SolCall>(&self) -> Option<C::Return> {
        if !self.success {
            return None;
        }
        C::abi_decode_returns(&self.return_data).ok()
    }
}

#[async_trait]
pub trait MulticallProvider: Send + Sync {
    /// Execute arbitrary calls in one logical batch. One result per call, in order.
    async fn aggregate(
        &self,
        calls: Vec<(Address, Bytes)>,
        block_number: Option<u64>,
        gas_limit: Option<u64>,
    ) -> ProviderResult<Vec<CallResult>>;

    async fn call_same_function_on_multiple_contracts(
        &self,
        addresses: &[Address],
        calldata: Bytes,
        block_number: Option<u64>,
    ) -> ProviderResult<Vec<CallResult>> {
        let calls = addresses.iter().map(|a| (*a, calldata.clone())).collect();
        self.aggregate(calls, block_number, None).await
    }

    async fn call_same_function_on_contract_with_multiple_params(
        &self,
        address: Address,
        calldatas: Vec<Bytes>,
        block_number: Option<u64>,
        gas_limit: Option<u64>,
    ) -> ProviderResult<Vec<CallResult>> {
        let calls = calldatas.into_iter().map(|data| (address, data)).collect();
        self.aggregate(calls, block_number, gas_limit).await
    }
}

#[async_trait]
pub trait BlockNumberProvider: Send + Sync {
    async fn block_number(&self) -> ProviderResult<u64>;
}

// ============================================
// ALLOY IMPLEMENTATION
// ============================================

pub struct Multicall3Provider {
    provider: DynProvider,
    multicall: Address,
    max_calls_per_batch: usize,
}

impl Multicall3Provider {
    pub fn new(rpc_url: &str, multicall: Address, max_calls_per_batch: usize) -> Result<Self> {
        let url = rpc_url
            .parse()
            .map_err(|e| eyre!("Invalid RPC url {}: {}", rpc_url, e))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self {
            provider,
            multicall,
            max_calls_per_batch: max_calls_per_batch.max(1),
        })
    }

    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    async fn execute_chunk(
        &self,
        calls: Vec<IMulticall3::Call3>,
        block_number: Option<u64>,
        gas_limit: Option<u64>,
    ) -> ProviderResult<Vec<CallResult>> {
        let expected = calls.len();
        let calldata = IMulticall3::aggregate3Call { calls }.abi_encode();

        let mut tx = TransactionRequest::default()
            .with_to(self.multicall)
            .with_input(calldata);
        if let Some(limit) = gas_limit {
            tx = tx.with_gas_limit(limit);
        }

        let call = self.provider.call(tx);
        let raw = match block_number {
            Some(n) => call.block(BlockId::number(n)).await,
            None => call.await,
        }
        .map_err(|e| ProviderError::transport(format!("Multicall3 failed: {}", e)))?;

        let decoded = IMulticall3::aggregate3Call::abi_decode_returns(&raw)
            .map_err(|e| ProviderError::decode(format!("multicall result: {}", e)))?;

        if decoded.len() != expected {
            return Err(ProviderError::decode(format!(
                "multicall returned {} results for {} calls",
                decoded.len(),
                expected
            )));
        }

        Ok(decoded
            .into_iter()
            .map(|r| CallResult {
                success: r.success,
                return_data: r.returnData,
            })
            .collect())
    }
}

#[async_trait]
impl MulticallProvider for Multicall3Provider {
    async fn aggregate(
        &self,
        calls: Vec<(Address, Bytes)>,
        block_number: Option<u64>,
        gas_limit: Option<u64>,
    ) -> ProviderResult<Vec<CallResult>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let chunks: Vec<Vec<IMulticall3::Call3>> = calls
            .chunks(self.max_calls_per_batch)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|(target, data)| IMulticall3::Call3 {
                        target: *target,
                        allowFailure: true,
                        callData: data.clone(),
                    })
                    .collect()
            })
            .collect();

        debug!(
            "Multicall: {} calls in {} chunk(s) at block {:?}",
            calls.len(),
            chunks.len(),
            block_number
        );

        let results = try_join_all(
            chunks
                .into_iter()
                .map(|chunk| self.execute_chunk(chunk, block_number, gas_limit)),
        )
        .await?;

        let flat: Vec<CallResult> = results.into_iter().flatten().collect();
        trace!(
            "Multicall: {}/{} calls succeeded",
            flat.iter().filter(|r| r.success).count(),
            flat.len()
        );
        Ok(flat)
    }
}

#[async_trait]
impl BlockNumberProvider for Multicall3Provider {
    async fn block_number(&self) -> ProviderResult<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(ProviderError::transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, U256};

    sol! {
        interface IProbe {
            function value() external view returns (uint256);
        }
    }

    #[test]
    fn test_decode_skips_failed_calls() {
        let ok = CallResult::ok(U256::from(42u64).to_be_bytes::<32>().to_vec());
        assert_eq!(ok.decode::<IProbe::valueCall>(), Some(U256::from(42u64)));
        assert_eq!(CallResult::failed().decode::<IProbe::valueCall>(), None);

        let garbage = CallResult::ok(vec![1u8, 2, 3]);
        assert_eq!(garbage.decode::<IProbe::valueCall>(), None);
    }

    struct Echo;

    #[async_trait]
    impl MulticallProvider for Echo {
        async fn aggregate(
            &self,
            calls: Vec<(Address, Bytes)>,
            _block_number: Option<u64>,
            _gas_limit: Option<u64>,
        ) -> ProviderResult<Vec<CallResult>> {
            Ok(calls
                .into_iter()
                .map(|(target, _)| CallResult::ok(target.to_vec()))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_same_function_helpers_preserve_order() {
        let a = address!("00000000000000000000000000000000000000aa");
        let b = address!("00000000000000000000000000000000000000bb");
        let results = Echo
            .call_same_function_on_multiple_contracts(&[a, b], Bytes::new(), None)
            .await
            .unwrap();
        assert_eq!(results[0].return_data.as_ref(), a.as_slice());
        assert_eq!(results[1].return_data.as_ref(), b.as_slice());
    }
}
