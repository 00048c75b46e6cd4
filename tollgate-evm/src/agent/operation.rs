//! Operation bundles for the smart account.
//!
//! An [`Operation`] is an ordered batch of calls executed atomically by the
//! account contract: all succeed or the whole bundle reverts. The builder
//! assembles the batch, obtains one gas estimate covering the entire
//! bundle, and freezes the result; any change after that invalidates the
//! signature because the digest covers every field.

use alloy_primitives::{Address, B256, Bytes, keccak256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::TransactionRequest;
use async_trait::async_trait;

use crate::encode::Call;

/// Fixed overhead added to the summed per-call estimates, covering the
/// account contract's bundle dispatch.
const BUNDLE_OVERHEAD_GAS: u64 = 21_000;

/// A signed (or yet-unsigned) batch of calls for the smart account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// The smart account executing the bundle.
    pub sender: Address,
    /// Account-level sequence number.
    pub nonce: u64,
    /// Calls executed in order, atomically.
    pub calls: Vec<Call>,
    /// Gas estimate for the whole bundle.
    pub gas_estimate: u64,
    /// Session-key signature over [`Self::signing_digest`], once signed.
    pub signature: Option<Bytes>,
}

impl Operation {
    /// Computes the digest the session key signs.
    ///
    /// Covers the chain id, sender, nonce, and every call's target, value,
    /// and calldata hash, so no field can change after signing.
    #[must_use]
    pub fn signing_digest(&self, chain_id: u64) -> B256 {
        let mut buf = Vec::with_capacity(8 + 20 + 8 + self.calls.len() * 84);
        buf.extend_from_slice(&chain_id.to_be_bytes());
        buf.extend_from_slice(self.sender.as_slice());
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        for call in &self.calls {
            buf.extend_from_slice(call.target.as_slice());
            buf.extend_from_slice(&call.value.to_be_bytes::<32>());
            buf.extend_from_slice(keccak256(&call.data).as_slice());
        }
        keccak256(buf)
    }

    /// Whether the operation carries a signature.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}

/// Errors building an operation.
#[derive(Debug, thiserror::Error)]
pub enum OperationBuildError {
    /// The builder held no calls.
    #[error("an operation must contain at least one call")]
    EmptyOperation,
    /// The gas estimator failed.
    #[error("gas estimation failed: {0}")]
    GasEstimation(String),
}

/// Estimates gas for a bundle of calls from a given sender.
#[async_trait]
pub trait EstimateGas: Send + Sync {
    /// Returns a gas estimate covering the whole bundle.
    ///
    /// # Errors
    ///
    /// Returns the estimator's failure as an opaque message; the builder
    /// wraps it in [`OperationBuildError::GasEstimation`].
    async fn estimate(&self, sender: Address, calls: &[Call]) -> Result<u64, String>;
}

/// Gas estimator backed by a provider's `eth_estimateGas`.
///
/// Estimates each call independently against the pending state and sums
/// them, plus a fixed dispatch overhead. Per-call estimation over-counts
/// warm storage shared between calls, which keeps the estimate on the safe
/// side for atomic execution.
#[derive(Debug)]
pub struct ProviderGasEstimator<P> {
    provider: P,
}

impl<P: Provider> ProviderGasEstimator<P> {
    /// Wraps a provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: Provider + Send + Sync + 'static> EstimateGas for ProviderGasEstimator<P> {
    async fn estimate(&self, sender: Address, calls: &[Call]) -> Result<u64, String> {
        let mut total = BUNDLE_OVERHEAD_GAS;
        for call in calls {
            let request = TransactionRequest::default()
                .from(sender)
                .to(call.target)
                .value(call.value)
                .input(call.data.clone().into());
            let gas = self
                .provider
                .estimate_gas(request)
                .await
                .map_err(|e| e.to_string())?;
            total = total.saturating_add(gas);
        }
        Ok(total)
    }
}

/// Assembles an [`Operation`] call by call.
#[derive(Debug)]
pub struct OperationBuilder {
    sender: Address,
    nonce: u64,
    calls: Vec<Call>,
}

impl OperationBuilder {
    /// Starts an empty bundle for `sender` at `nonce`.
    #[must_use]
    pub const fn new(sender: Address, nonce: u64) -> Self {
        Self {
            sender,
            nonce,
            calls: Vec::new(),
        }
    }

    /// Appends a call to the bundle.
    #[must_use]
    pub fn push(mut self, call: Call) -> Self {
        self.calls.push(call);
        self
    }

    /// Estimates gas and freezes the bundle into an unsigned operation.
    ///
    /// # Errors
    ///
    /// Returns [`OperationBuildError::EmptyOperation`] for an empty bundle
    /// and [`OperationBuildError::GasEstimation`] when the estimator fails;
    /// an operation with a failed estimate is never produced.
    pub async fn build<E: EstimateGas>(
        self,
        estimator: &E,
    ) -> Result<Operation, OperationBuildError> {
        if self.calls.is_empty() {
            return Err(OperationBuildError::EmptyOperation);
        }
        let gas_estimate = estimator
            .estimate(self.sender, &self.calls)
            .await
            .map_err(OperationBuildError::GasEstimation)?;
        Ok(Operation {
            sender: self.sender,
            nonce: self.nonce,
            calls: self.calls,
            gas_estimate,
            signature: None,
        })
    }
}
