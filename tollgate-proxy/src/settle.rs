//! Settlement execution against the payment gateway.
//!
//! The executor owns the ledger transitions around one payment: record the
//! attempt, submit settlement, advance `pending -> verified` with the
//! transaction hash, then either confirm inline ([`SettleMode::Confirm`])
//! or spawn a watcher and let the caller proceed at `verified`
//! ([`SettleMode::Defer`]). No ledger lock is held across any gateway call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use tollgate::gateway::{SettleError, SettlementGateway, SettlementSubmitted};
use tollgate::ledger::{Ledger, PaymentId, Transaction, TxStatus};
use tollgate::proto::{PaymentProof, PaymentRequirements, SettlementEvidence, VerificationError};

use crate::error::ProxyError;
use crate::verify::Verified;

/// Whether the request waits for on-chain confirmation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettleMode {
    /// Hold the request until the settlement receipt arrives (default).
    #[default]
    Confirm,
    /// Forward once the settlement transaction is submitted; a spawned
    /// watcher drives the record to its terminal state. Clients may observe
    /// `verified`-but-not-`settled` evidence and poll the admin endpoint.
    Defer,
}

/// Executes settlements and keeps the ledger in step with the chain.
pub struct SettlementExecutor {
    gateway: Arc<dyn SettlementGateway>,
    ledger: Arc<dyn Ledger>,
    mode: SettleMode,
    network: String,
}

impl SettlementExecutor {
    /// Creates an executor for the configured network.
    pub fn new(
        gateway: Arc<dyn SettlementGateway>,
        ledger: Arc<dyn Ledger>,
        mode: SettleMode,
        network: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            ledger,
            mode,
            network: network.into(),
        }
    }

    /// Settles a verified payment and returns the evidence to attach to the
    /// proxied response.
    ///
    /// Idempotent per payment id: a retry that finds an existing record
    /// never re-submits. A record already at `settled` returns its evidence
    /// again; `pending` or `verified` returns in-flight evidence; `failed`
    /// reports the stored failure.
    ///
    /// # Errors
    ///
    /// [`ProxyError::Verification`] with `ReplayedPayment` when the nonce
    /// was consumed by a different payment, [`ProxyError::Settle`] when
    /// submission or confirmation fails.
    pub async fn execute(
        &self,
        verified: &Verified,
        proof: &PaymentProof,
        requirements: &PaymentRequirements,
    ) -> Result<SettlementEvidence, ProxyError> {
        let auth = &proof.payload.authorization;
        let id = PaymentId::derive(verified.payer, auth.nonce, &requirements.resource);

        let attempt = Transaction::attempt(
            id,
            requirements.resource.clone(),
            verified.payer,
            auth.nonce,
            verified.amount,
            proof.scheme.clone(),
        );
        match self.ledger.record_attempt(attempt) {
            Ok(()) => {}
            Err(_) => return self.resolve_existing(&id, verified),
        }

        let submitted = match self.gateway.settle(proof, requirements).await {
            Ok(submitted) => submitted,
            Err(err) => {
                self.mark_failed(&id, None);
                return Err(ProxyError::Settle(err));
            }
        };
        info!(payment_id = %id, transaction_hash = %submitted.transaction_hash,
            "Settlement submitted");
        self.ledger
            .advance(&id, TxStatus::Verified, Some(submitted.transaction_hash))?;

        match self.mode {
            SettleMode::Confirm => self.confirm_inline(&id, &submitted, verified).await,
            SettleMode::Defer => {
                self.spawn_watcher(submitted);
                Ok(SettlementEvidence {
                    success: false,
                    payment_id: id.inner(),
                    transaction_hash: Some(submitted.transaction_hash),
                    network: self.network.clone(),
                    payer: verified.payer,
                })
            }
        }
    }

    /// Resolves a retry that raced or repeated an already-recorded payment.
    ///
    /// The nonce guard fires for both a genuine replay (different payment id)
    /// and a retry of the same payment; the ledger record distinguishes them.
    fn resolve_existing(
        &self,
        id: &PaymentId,
        verified: &Verified,
    ) -> Result<SettlementEvidence, ProxyError> {
        let Some(record) = self.ledger.lookup(id) else {
            return Err(ProxyError::Verification(VerificationError::ReplayedPayment));
        };
        match record.status {
            TxStatus::Settled => Ok(SettlementEvidence {
                success: true,
                payment_id: id.inner(),
                transaction_hash: record.transaction_hash,
                network: self.network.clone(),
                payer: verified.payer,
            }),
            TxStatus::Pending | TxStatus::Verified => Ok(SettlementEvidence {
                success: false,
                payment_id: id.inner(),
                transaction_hash: record.transaction_hash,
                network: self.network.clone(),
                payer: verified.payer,
            }),
            TxStatus::Failed => Err(ProxyError::Settle(match record.transaction_hash {
                Some(transaction_hash) => SettleError::Reverted { transaction_hash },
                None => SettleError::Rpc("settlement previously failed".to_owned()),
            })),
        }
    }

    async fn confirm_inline(
        &self,
        id: &PaymentId,
        submitted: &SettlementSubmitted,
        verified: &Verified,
    ) -> Result<SettlementEvidence, ProxyError> {
        let confirmation = match self.gateway.confirm(submitted).await {
            Ok(confirmation) => confirmation,
            Err(err) => {
                self.mark_failed(id, Some(submitted.transaction_hash));
                return Err(ProxyError::Settle(err));
            }
        };
        if !confirmation.success {
            self.mark_failed(id, Some(submitted.transaction_hash));
            return Err(ProxyError::Settle(SettleError::Reverted {
                transaction_hash: submitted.transaction_hash,
            }));
        }
        self.ledger
            .advance(id, TxStatus::Settled, Some(submitted.transaction_hash))?;
        info!(payment_id = %id, "Settlement confirmed");
        Ok(SettlementEvidence {
            success: true,
            payment_id: id.inner(),
            transaction_hash: Some(submitted.transaction_hash),
            network: self.network.clone(),
            payer: verified.payer,
        })
    }

    /// Fire-and-forget confirmation watcher for deferred settlement.
    fn spawn_watcher(&self, submitted: SettlementSubmitted) {
        let gateway = Arc::clone(&self.gateway);
        let ledger = Arc::clone(&self.ledger);
        tokio::spawn(async move {
            let id = submitted.payment_id;
            match gateway.confirm(&submitted).await {
                Ok(confirmation) if confirmation.success => {
                    if let Err(err) =
                        ledger.advance(&id, TxStatus::Settled, Some(submitted.transaction_hash))
                    {
                        error!(payment_id = %id, error = %err,
                            "Watcher could not record settlement");
                    }
                }
                Ok(_) => {
                    warn!(payment_id = %id, "Deferred settlement reverted");
                    mark_failed_in(&*ledger, &id, Some(submitted.transaction_hash));
                }
                Err(err) => {
                    warn!(payment_id = %id, error = %err, "Deferred settlement unresolved");
                    mark_failed_in(&*ledger, &id, Some(submitted.transaction_hash));
                }
            }
        });
    }

    fn mark_failed(&self, id: &PaymentId, transaction_hash: Option<alloy_primitives::B256>) {
        mark_failed_in(&*self.ledger, id, transaction_hash);
    }
}

impl std::fmt::Debug for SettlementExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementExecutor")
            .field("mode", &self.mode)
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

fn mark_failed_in(
    ledger: &dyn Ledger,
    id: &PaymentId,
    transaction_hash: Option<alloy_primitives::B256>,
) {
    if let Err(err) = ledger.advance(id, TxStatus::Failed, transaction_hash) {
        error!(payment_id = %id, error = %err, "Could not record settlement failure");
    }
}
