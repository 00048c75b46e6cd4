//! Payment proof verification.
//!
//! Checks run in a fixed order and the first failure rejects the proof;
//! nothing is recorded as consumed on rejection. The replay check here is a
//! read-only precheck for a clean error message — the authoritative nonce
//! consumption happens atomically when the ledger records the attempt.

use alloy_primitives::Address;

use tollgate::ledger::Ledger;
use tollgate::proto::{PaymentProof, PaymentRequirements, VerificationError};
use tollgate::timestamp::UnixTimestamp;
use tollgate_evm::typed_data::{recover_payer, signing_domain};

/// Authorizations must stay valid at least this many seconds past `now` so
/// settlement has time to land on-chain.
const EXPIRY_GRACE_SECS: u64 = 6;

/// A successfully verified payment proof.
#[derive(Debug, Clone, Copy)]
pub struct Verified {
    /// The recovered payer address.
    pub payer: Address,
    /// The authorized amount in atomic token units.
    pub amount: u64,
}

/// Verifies a payment proof against the offered requirements.
///
/// Check order: scheme and network match, recipient, amount, signature,
/// validity window, replay. The window must both be open at `now` (with a
/// settlement grace) and not exceed the requirement's `maxTimeoutSeconds`.
///
/// # Errors
///
/// Returns the [`VerificationError`] of the first failing check.
pub fn verify_proof(
    proof: &PaymentProof,
    requirements: &PaymentRequirements,
    chain_id: u64,
    verifying_contract: Address,
    ledger: &dyn Ledger,
    now: UnixTimestamp,
) -> Result<Verified, VerificationError> {
    if proof.scheme != requirements.scheme {
        return Err(VerificationError::SchemeMismatch);
    }
    if proof.network != requirements.network {
        return Err(VerificationError::NetworkMismatch);
    }

    let auth = &proof.payload.authorization;
    if auth.to != requirements.pay_to {
        return Err(VerificationError::RecipientMismatch);
    }
    if auth.value < requirements.max_amount_required {
        return Err(VerificationError::InsufficientAmount);
    }

    let domain = signing_domain(&requirements.extra, chain_id, verifying_contract);
    let payer = recover_payer(&proof.payload, &domain)?;

    if auth.valid_after.as_secs() > now.as_secs() {
        return Err(VerificationError::Early);
    }
    if (now + EXPIRY_GRACE_SECS).as_secs() >= auth.valid_before.as_secs() {
        return Err(VerificationError::ExpiredRequirement);
    }
    if auth.valid_before - auth.valid_after > requirements.max_timeout_seconds {
        return Err(VerificationError::ExpiredRequirement);
    }

    if ledger.nonce_consumed(payer, auth.nonce) {
        return Err(VerificationError::ReplayedPayment);
    }

    Ok(Verified {
        payer,
        amount: auth.value.inner(),
    })
}
