//! On-chain settlement against the payment gateway contract.
//!
//! [`OnchainGateway`] implements [`SettlementGateway`] over an alloy
//! provider. `settle` submits the `settlePayment` call and returns as soon
//! as the transaction is in the mempool; `confirm` polls for the receipt
//! under a bounded deadline. The split keeps the proxy free to choose
//! between confirming inline and deferring confirmation to a watcher task.

use std::time::Duration;

use alloy_primitives::Address;
use alloy_provider::Provider;
use alloy_rpc_types_eth::TransactionRequest;
use async_trait::async_trait;
use tracing::{debug, warn};

use tollgate::gateway::{
    SettleError, SettlementConfirmation, SettlementGateway, SettlementSubmitted,
};
use tollgate::ledger::PaymentId;
use tollgate::proto::{PaymentProof, PaymentRequirements};

use crate::encode;

/// Confirmation polling knobs for [`OnchainGateway`].
#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    /// Upper bound on the wait for a settlement receipt.
    pub confirmation_timeout: Duration,
    /// Interval between receipt queries.
    pub poll_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Settlement gateway backed by a real EVM provider.
///
/// The provider is expected to carry the settlement wallet and the usual
/// fillers (gas, nonce, chain id), so a bare call-plus-target request is
/// enough to submit.
#[derive(Debug)]
pub struct OnchainGateway<P> {
    provider: P,
    gateway: Address,
    config: GatewayConfig,
}

impl<P: Provider> OnchainGateway<P> {
    /// Creates a gateway bound to the given contract address.
    pub fn new(provider: P, gateway: Address, config: GatewayConfig) -> Self {
        Self {
            provider,
            gateway,
            config,
        }
    }
}

#[async_trait]
impl<P: Provider + Send + Sync + 'static> SettlementGateway for OnchainGateway<P> {
    async fn settle(
        &self,
        proof: &PaymentProof,
        requirements: &PaymentRequirements,
    ) -> Result<SettlementSubmitted, SettleError> {
        let auth = &proof.payload.authorization;
        let payment_id = PaymentId::derive(auth.from, auth.nonce, &requirements.resource);

        let call = encode::settle_payment(self.gateway, proof, requirements);
        let request = TransactionRequest::default()
            .to(call.target)
            .input(call.data.into());

        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(|e| SettleError::Rpc(e.to_string()))?;
        let transaction_hash = *pending.tx_hash();

        debug!(%payment_id, %transaction_hash, "settlement submitted");
        Ok(SettlementSubmitted {
            payment_id,
            transaction_hash,
        })
    }

    async fn confirm(
        &self,
        submitted: &SettlementSubmitted,
    ) -> Result<SettlementConfirmation, SettleError> {
        let deadline = tokio::time::Instant::now() + self.config.confirmation_timeout;
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(submitted.transaction_hash)
                .await
                .map_err(|e| SettleError::Rpc(e.to_string()))?;

            if let Some(receipt) = receipt {
                let success = receipt.status();
                if !success {
                    warn!(
                        payment_id = %submitted.payment_id,
                        transaction_hash = %submitted.transaction_hash,
                        "settlement transaction reverted"
                    );
                }
                return Ok(SettlementConfirmation {
                    payment_id: submitted.payment_id,
                    transaction_hash: submitted.transaction_hash,
                    success,
                });
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(SettleError::ConfirmationTimeout {
                    transaction_hash: submitted.transaction_hash,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
