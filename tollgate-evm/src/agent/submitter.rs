//! Drives a built operation to a terminal outcome.
//!
//! The submitter owns the session key and the state machine around one
//! operation: sign, submit through the relay, then poll for the receipt
//! under a bounded wait. Three terminal outcomes exist and they are kept
//! distinct on purpose:
//!
//! - [`SubmitOutcome::Included`] with `success: false` - the bundle landed
//!   on-chain and reverted; the nonce is consumed;
//! - [`SubmitOutcome::Rejected`] - the relay refused it; nothing was
//!   broadcast and the nonce is still free;
//! - [`SubmitOutcome::TimedOut`] - inclusion is unknown. The submitter
//!   never resubmits here: the operation may still land, and a later
//!   [`OperationSubmitter::check`] can resolve it to `Included`.

use std::time::Duration;

use alloy_primitives::B256;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use tracing::{info, warn};

use super::operation::Operation;
use super::relay::{Relay, RelayError};

/// Polling knobs for the receipt wait.
#[derive(Debug, Clone, Copy)]
pub struct SubmitterConfig {
    /// Interval between receipt queries.
    pub poll_interval: Duration,
    /// Upper bound on the wait before reporting [`SubmitOutcome::TimedOut`].
    pub max_wait: Duration,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(60),
        }
    }
}

/// Terminal outcome of one submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The operation was included on-chain.
    Included {
        /// Whether the bundle executed without reverting.
        success: bool,
        /// Hash of the including transaction.
        transaction_hash: B256,
        /// Revert reason, when execution failed.
        revert_reason: Option<String>,
    },
    /// No receipt arrived within the bounded wait; inclusion is unknown.
    TimedOut {
        /// Relay hash to resolve the operation later.
        operation_hash: B256,
    },
    /// The relay refused the operation; nothing was broadcast.
    Rejected {
        /// Relay-supplied rejection reason.
        reason: String,
    },
}

/// Errors that prevent reaching any outcome at all.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The session key failed to sign the operation digest.
    #[error("failed to sign operation: {0}")]
    Signing(#[from] alloy_signer::Error),
    /// The relay was unreachable; submission state is unknown.
    #[error("relay transport error: {0}")]
    Transport(String),
}

/// Signs operations with a session key and shepherds them through a relay.
#[derive(Debug)]
pub struct OperationSubmitter<R> {
    relay: R,
    signer: PrivateKeySigner,
    chain_id: u64,
    config: SubmitterConfig,
}

impl<R: Relay> OperationSubmitter<R> {
    /// Creates a submitter for the given chain.
    pub fn new(relay: R, signer: PrivateKeySigner, chain_id: u64, config: SubmitterConfig) -> Self {
        Self {
            relay,
            signer,
            chain_id,
            config,
        }
    }

    /// Signs the operation's digest with the session key.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Signing`] if the signer fails.
    pub fn sign(&self, operation: &mut Operation) -> Result<(), SubmitError> {
        let digest = operation.signing_digest(self.chain_id);
        let signature = self.signer.sign_hash_sync(&digest)?;
        operation.signature = Some(signature.as_bytes().to_vec().into());
        Ok(())
    }

    /// Signs (if needed), submits, and waits for a terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Transport`] when the relay is unreachable;
    /// relay rejections and timeouts are outcomes, not errors.
    pub async fn submit_and_wait(
        &self,
        mut operation: Operation,
    ) -> Result<SubmitOutcome, SubmitError> {
        if !operation.is_signed() {
            self.sign(&mut operation)?;
        }

        let operation_hash = match self.relay.submit(&operation).await {
            Ok(hash) => hash,
            Err(RelayError::Rejected { reason }) => {
                warn!(sender = %operation.sender, nonce = operation.nonce, %reason,
                    "relay rejected operation");
                return Ok(SubmitOutcome::Rejected { reason });
            }
            Err(RelayError::Transport(msg)) => return Err(SubmitError::Transport(msg)),
        };

        info!(sender = %operation.sender, nonce = operation.nonce, %operation_hash,
            "operation submitted");
        self.wait_for_receipt(operation_hash).await
    }

    /// Queries a previously submitted operation once.
    ///
    /// Resolves a prior [`SubmitOutcome::TimedOut`] to `Included` when the
    /// relay has since seen the operation land. `Ok(None)` means still
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Transport`] when the relay is unreachable.
    pub async fn check(&self, operation_hash: B256) -> Result<Option<SubmitOutcome>, SubmitError> {
        match self.relay.receipt(operation_hash).await {
            Ok(Some(receipt)) => Ok(Some(SubmitOutcome::Included {
                success: receipt.success,
                transaction_hash: receipt.transaction_hash,
                revert_reason: receipt.revert_reason,
            })),
            Ok(None) => Ok(None),
            Err(RelayError::Rejected { reason }) | Err(RelayError::Transport(reason)) => {
                Err(SubmitError::Transport(reason))
            }
        }
    }

    async fn wait_for_receipt(&self, operation_hash: B256) -> Result<SubmitOutcome, SubmitError> {
        let deadline = tokio::time::Instant::now() + self.config.max_wait;
        loop {
            if let Some(outcome) = self.check(operation_hash).await? {
                if let SubmitOutcome::Included { success, ref revert_reason, .. } = outcome {
                    if !success {
                        warn!(%operation_hash, reason = ?revert_reason,
                            "operation included but reverted");
                    }
                }
                return Ok(outcome);
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(%operation_hash, "no receipt within the bounded wait");
                return Ok(SubmitOutcome::TimedOut { operation_hash });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::operation::{EstimateGas, OperationBuilder};
    use crate::agent::relay::RelayReceipt;
    use crate::encode::Call;
    use alloy_primitives::{Address, Bytes, U256, address};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FixedEstimator;

    #[async_trait]
    impl EstimateGas for FixedEstimator {
        async fn estimate(&self, _sender: Address, calls: &[Call]) -> Result<u64, String> {
            Ok(50_000 * calls.len() as u64)
        }
    }

    /// Relay fake driven by a script of receipt answers.
    struct ScriptedRelay {
        reject: Option<String>,
        submissions: Mutex<Vec<Operation>>,
        receipts: Mutex<VecDeque<Option<RelayReceipt>>>,
    }

    impl ScriptedRelay {
        fn including(receipts: Vec<Option<RelayReceipt>>) -> Self {
            Self {
                reject: None,
                submissions: Mutex::new(Vec::new()),
                receipts: Mutex::new(receipts.into()),
            }
        }

        fn rejecting(reason: &str) -> Self {
            Self {
                reject: Some(reason.to_owned()),
                submissions: Mutex::new(Vec::new()),
                receipts: Mutex::new(VecDeque::new()),
            }
        }
    }

    #[async_trait]
    impl Relay for ScriptedRelay {
        async fn submit(&self, operation: &Operation) -> Result<B256, RelayError> {
            if let Some(reason) = &self.reject {
                return Err(RelayError::Rejected {
                    reason: reason.clone(),
                });
            }
            self.submissions.lock().expect("lock").push(operation.clone());
            Ok(B256::repeat_byte(0x77))
        }

        async fn receipt(&self, _hash: B256) -> Result<Option<RelayReceipt>, RelayError> {
            // Past the end of the script the operation stays pending.
            Ok(self.receipts.lock().expect("lock").pop_front().flatten())
        }
    }

    fn operation() -> Operation {
        Operation {
            sender: address!("0x5555555555555555555555555555555555555555"),
            nonce: 3,
            calls: vec![Call {
                target: address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
                value: U256::ZERO,
                data: Bytes::from(vec![0x01]),
            }],
            gas_estimate: 70_000,
            signature: None,
        }
    }

    fn submitter(relay: ScriptedRelay) -> OperationSubmitter<ScriptedRelay> {
        OperationSubmitter::new(
            relay,
            PrivateKeySigner::random(),
            84532,
            SubmitterConfig {
                poll_interval: Duration::from_millis(100),
                max_wait: Duration::from_secs(2),
            },
        )
    }

    fn good_receipt() -> RelayReceipt {
        RelayReceipt {
            success: true,
            transaction_hash: B256::repeat_byte(0x88),
            revert_reason: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn signs_then_reaches_inclusion() {
        let relay = ScriptedRelay::including(vec![None, None, Some(good_receipt())]);
        let outcome = submitter(relay)
            .submit_and_wait(operation())
            .await
            .expect("submit");
        assert_eq!(
            outcome,
            SubmitOutcome::Included {
                success: true,
                transaction_hash: B256::repeat_byte(0x88),
                revert_reason: None,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn submitted_operation_carries_a_signature() {
        let relay = ScriptedRelay::including(vec![Some(good_receipt())]);
        let sub = submitter(relay);
        sub.submit_and_wait(operation()).await.expect("submit");

        let submissions = sub.relay.submissions.lock().expect("lock");
        let signature = submissions[0].signature.as_ref().expect("signed");
        assert_eq!(signature.len(), 65);
    }

    #[tokio::test(start_paused = true)]
    async fn included_with_revert_is_not_a_rejection() {
        let receipt = RelayReceipt {
            success: false,
            transaction_hash: B256::repeat_byte(0x99),
            revert_reason: Some("allowance exceeded".into()),
        };
        let relay = ScriptedRelay::including(vec![Some(receipt)]);
        let outcome = submitter(relay)
            .submit_and_wait(operation())
            .await
            .expect("submit");
        match outcome {
            SubmitOutcome::Included {
                success,
                revert_reason,
                ..
            } => {
                assert!(!success);
                assert_eq!(revert_reason.as_deref(), Some("allowance exceeded"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn relay_rejection_is_terminal_without_broadcast() {
        let relay = ScriptedRelay::rejecting("stale nonce");
        let sub = submitter(relay);
        let outcome = sub.submit_and_wait(operation()).await.expect("submit");
        assert_eq!(
            outcome,
            SubmitOutcome::Rejected {
                reason: "stale nonce".into(),
            }
        );
        assert!(sub.relay.submissions.lock().expect("lock").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_the_operation_hash_and_never_resubmits() {
        let relay = ScriptedRelay::including(vec![]);
        let sub = submitter(relay);
        let outcome = sub.submit_and_wait(operation()).await.expect("submit");
        assert_eq!(
            outcome,
            SubmitOutcome::TimedOut {
                operation_hash: B256::repeat_byte(0x77),
            }
        );
        assert_eq!(sub.relay.submissions.lock().expect("lock").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn a_timed_out_operation_can_later_resolve_to_included() {
        let relay = ScriptedRelay::including(vec![Some(good_receipt())]);
        let sub = submitter(relay);
        let resolved = sub
            .check(B256::repeat_byte(0x77))
            .await
            .expect("check")
            .expect("included");
        assert!(matches!(resolved, SubmitOutcome::Included { success: true, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn built_bundle_flows_through_the_submitter() {
        let op = OperationBuilder::new(address!("0x5555555555555555555555555555555555555555"), 9)
            .push(crate::encode::pool_withdrawal(
                address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
                U256::from(1_000_000u64),
            ))
            .build(&FixedEstimator)
            .await
            .expect("build");
        let relay = ScriptedRelay::including(vec![Some(good_receipt())]);
        let outcome = submitter(relay).submit_and_wait(op).await.expect("submit");
        assert!(matches!(outcome, SubmitOutcome::Included { success: true, .. }));
    }
}
