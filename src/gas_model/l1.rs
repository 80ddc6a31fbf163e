//! L1 Data Fee - OP Stack
//!
//! Rollups like Mode charge for publishing the transaction to L1 on top of
//! L2 execution. The fee depends on the serialized calldata, so it is only
//! known once a combination of routes is fixed.
//!
//! l1Gas = 4 × zero bytes + 16 × non-zero bytes + 16 × 68 (signature) + overhead
//! fee   = l1Gas × l1BaseFee × scalar / 10^decimals

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::amounts::{fraction_from_u256, Fraction};
use crate::cartographer::MulticallProvider;
use crate::error::{ProviderError, ProviderResult};

sol! {
    interface IGasPriceOracle {
        function l1BaseFee() external view returns (uint256);
        function overhead() external view returns (uint256);
        function scalar() external view returns (uint256);
        function decimals() external view returns (uint256);
    }
}

/// A signed transaction carries 68 bytes the unsigned calldata does not
const SIGNATURE_BYTES: u64 = 68;
const ZERO_BYTE_GAS: u64 = 4;
const NON_ZERO_BYTE_GAS: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L1GasData {
    pub l1_base_fee: U256,
    pub overhead: U256,
    pub scalar: U256,
    pub decimals: U256,
}

#[async_trait]
pub trait L2GasDataProvider: Send + Sync {
    async fn gas_data(&self, block_number: u64) -> ProviderResult<L1GasData>;
}

pub struct OnChainL2GasDataProvider {
    multicall: Arc<dyn MulticallProvider>,
    oracle: Address,
}

impl OnChainL2GasDataProvider {
    pub fn new(multicall: Arc<dyn MulticallProvider>, oracle: Address) -> Self {
        Self { multicall, oracle }
    }
}

#[async_trait]
impl L2GasDataProvider for OnChainL2GasDataProvider {
    async fn gas_data(&self, block_number: u64) -> ProviderResult<L1GasData> {
        let calldatas: Vec<Bytes> = vec![
            IGasPriceOracle::l1BaseFeeCall {}.abi_encode().into(),
            IGasPriceOracle::overheadCall {}.abi_encode().into(),
            IGasPriceOracle::scalarCall {}.abi_encode().into(),
            IGasPriceOracle::decimalsCall {}.abi_encode().into(),
        ];
        let results = self
            .multicall
            .call_same_function_on_contract_with_multiple_params(self.oracle, calldatas, Some(block_number), None)
            .await?;

        // all four getters return a single uint256
        let word = |i: usize, name: &str| -> ProviderResult<U256> {
            results
                .get(i)
                .and_then(|r| r.decode::<IGasPriceOracle::l1BaseFeeCall>())
                .ok_or_else(|| ProviderError::decode(format!("GasPriceOracle.{} unreadable", name)))
        };

        let data = L1GasData {
            l1_base_fee: word(0, "l1BaseFee")?,
            overhead: word(1, "overhead")?,
            scalar: word(2, "scalar")?,
            decimals: word(3, "decimals")?,
        };
        debug!(
            "L1 gas data at block {}: base fee {}, overhead {}, scalar {}, decimals {}",
            block_number, data.l1_base_fee, data.overhead, data.scalar, data.decimals
        );
        Ok(data)
    }
}

// ============================================
// FEE COMPUTATION
// ============================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L1Fee {
    pub l1_gas_used: U256,
    /// Exact fee in wei
    pub fee_wei: Fraction,
    /// The fee expressed as L2 gas at the current L2 gas price
    pub l2_gas_equivalent: U256,
}

pub fn l1_gas_used(calldata: &[u8], overhead: U256) -> U256 {
    let zeros = calldata.iter().filter(|b| **b == 0).count() as u64;
    let non_zeros = calldata.len() as u64 - zeros;
    let unsigned = zeros * ZERO_BYTE_GAS + non_zeros * NON_ZERO_BYTE_GAS;
    U256::from(unsigned + SIGNATURE_BYTES * NON_ZERO_BYTE_GAS).saturating_add(overhead)
}

pub fn l1_fee(calldata: &[u8], data: &L1GasData, l2_gas_price_wei: U256) -> L1Fee {
    let gas_used = l1_gas_used(calldata, data.overhead);
    let scale = u32::try_from(data.decimals)
        .ok()
        .map(|d| num_traits::pow(num_bigint::BigInt::from(10u8), d as usize))
        .unwrap_or_else(|| num_bigint::BigInt::from(1u8));
    let fee_wei = fraction_from_u256(gas_used) * fraction_from_u256(data.l1_base_fee) * fraction_from_u256(data.scalar)
        / Fraction::from_integer(scale);

    let l2_gas_equivalent = if l2_gas_price_wei.is_zero() {
        U256::ZERO
    } else {
        crate::amounts::fraction_floor_u256(&(&fee_wei / fraction_from_u256(l2_gas_price_wei)))
    };

    L1Fee {
        l1_gas_used: gas_used,
        fee_wei,
        l2_gas_equivalent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartographer::CallResult;

    #[test]
    fn test_byte_counting() {
        // 2 zero bytes, 3 non-zero bytes
        let data = [0u8, 1, 0, 2, 3];
        let expected = 2 * 4 + 3 * 16 + 68 * 16 + 188;
        assert_eq!(l1_gas_used(&data, U256::from(188u64)), U256::from(expected as u64));
    }

    #[test]
    fn test_fee_formula() {
        let data = L1GasData {
            l1_base_fee: U256::from(10_000_000_000u64),
            overhead: U256::from(188u64),
            scalar: U256::from(684_000u64),
            decimals: U256::from(6u8),
        };
        let calldata = [1u8; 10];
        let fee = l1_fee(&calldata, &data, U256::from(1_000u64));

        let gas = 10 * 16 + 68 * 16 + 188;
        assert_eq!(fee.l1_gas_used, U256::from(gas as u64));
        // gas × 1e10 × 0.684
        let expected_wei = gas as u128 * 10_000_000_000u128 * 684 / 1000;
        assert_eq!(
            crate::amounts::fraction_floor_u256(&fee.fee_wei),
            U256::from(expected_wei)
        );
        assert_eq!(fee.l2_gas_equivalent, U256::from(expected_wei / 1_000));
    }

    struct FakeOracle;

    #[async_trait]
    impl MulticallProvider for FakeOracle {
        async fn aggregate(
            &self,
            calls: Vec<(Address, Bytes)>,
            _block_number: Option<u64>,
            _gas_limit: Option<u64>,
        ) -> ProviderResult<Vec<CallResult>> {
            Ok(calls
                .iter()
                .enumerate()
                .map(|(i, _)| CallResult::ok(U256::from(i as u64 + 1).to_be_bytes::<32>().to_vec()))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_reads_oracle_in_order() {
        let provider = OnChainL2GasDataProvider::new(Arc::new(FakeOracle), Address::ZERO);
        let data = provider.gas_data(1).await.unwrap();
        assert_eq!(data.l1_base_fee, U256::from(1u8));
        assert_eq!(data.overhead, U256::from(2u8));
        assert_eq!(data.scalar, U256::from(3u8));
        assert_eq!(data.decimals, U256::from(4u8));
    }
}
