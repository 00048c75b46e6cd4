//! The settlement gateway trait.
//!
//! Settlement commits a verified payment to the on-chain gateway ledger.
//! The chain-specific implementation lives in the EVM support crate; the
//! proxy depends only on this trait so settlement invariants are testable
//! with an in-process fake.

use async_trait::async_trait;

use crate::ledger::PaymentId;
use crate::proto::{PaymentProof, PaymentRequirements};
use alloy_primitives::B256;

/// A settlement submitted to the gateway, not yet confirmed.
#[derive(Debug, Clone, Copy)]
pub struct SettlementSubmitted {
    /// Deterministic payment identifier produced by the gateway call.
    pub payment_id: PaymentId,
    /// Hash of the settlement transaction.
    pub transaction_hash: B256,
}

/// Terminal outcome of a settlement transaction.
#[derive(Debug, Clone, Copy)]
pub struct SettlementConfirmation {
    /// The payment identifier.
    pub payment_id: PaymentId,
    /// Hash of the confirmed transaction.
    pub transaction_hash: B256,
    /// Whether the settlement executed successfully on-chain.
    pub success: bool,
}

/// Errors committing a payment to the gateway ledger.
///
/// Settlement failures are reported upward, never retried here: the caller
/// holds the idempotency key (`payment_id`) needed to retry safely.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettleError {
    /// The settlement transaction reverted on-chain.
    #[error("settlement reverted in transaction {transaction_hash}")]
    Reverted {
        /// Hash of the reverted transaction.
        transaction_hash: B256,
    },
    /// Confirmation did not arrive within the configured wait.
    #[error("settlement confirmation timed out for transaction {transaction_hash}")]
    ConfirmationTimeout {
        /// Hash of the still-unconfirmed transaction.
        transaction_hash: B256,
    },
    /// The gateway RPC endpoint failed before a transaction was accepted.
    #[error("gateway rpc error: {0}")]
    Rpc(String),
}

/// Commits verified payments to the on-chain gateway.
///
/// `settle` submits the settlement call and returns as soon as the
/// transaction is accepted; `confirm` drives it to a terminal receipt.
/// Implementations use a dedicated settlement signer, distinct from any
/// resource owner.
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    /// Submits the settlement call for a verified proof.
    ///
    /// # Errors
    ///
    /// Returns [`SettleError::Rpc`] if the transaction cannot be submitted.
    async fn settle(
        &self,
        proof: &PaymentProof,
        requirements: &PaymentRequirements,
    ) -> Result<SettlementSubmitted, SettleError>;

    /// Awaits the terminal receipt of a submitted settlement.
    ///
    /// # Errors
    ///
    /// Returns [`SettleError::ConfirmationTimeout`] when the receipt does
    /// not arrive within the implementation's bounded wait, or
    /// [`SettleError::Rpc`] on transport failure.
    async fn confirm(
        &self,
        submitted: &SettlementSubmitted,
    ) -> Result<SettlementConfirmation, SettleError>;
}
