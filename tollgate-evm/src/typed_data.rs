//! EIP-712 typed-data verification of payment authorizations.
//!
//! A payment proof's signature covers the canonical typed-data digest of its
//! authorization. The signing domain is rebuilt from the payment
//! requirement's `extra.name`/`extra.version` plus the chain id and the
//! gateway contract address, so a proof signed against a drifted domain
//! never recovers to the claimed payer.

use alloy_primitives::{Address, B256, Signature, U256};
use alloy_sol_types::{Eip712Domain, SolStruct, eip712_domain, sol};

use tollgate::proto::{ExactAuthorization, ExactPayload, SigningDomain, VerificationError};

sol! {
    /// The canonical signed message of the exact payment scheme.
    #[allow(missing_docs)]
    #[derive(Debug)]
    struct PaymentAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

/// Constructs the EIP-712 domain for a payment requirement.
#[must_use]
pub fn signing_domain(
    extra: &SigningDomain,
    chain_id: u64,
    verifying_contract: Address,
) -> Eip712Domain {
    eip712_domain! {
        name: extra.name.clone(),
        version: extra.version.clone(),
        chain_id: chain_id,
        verifying_contract: verifying_contract,
    }
}

/// Computes the typed-data signing digest of an authorization.
#[must_use]
pub fn authorization_digest(auth: &ExactAuthorization, domain: &Eip712Domain) -> B256 {
    let message = PaymentAuthorization {
        from: auth.from,
        to: auth.to,
        value: U256::from(auth.value.inner()),
        validAfter: U256::from(auth.valid_after.as_secs()),
        validBefore: U256::from(auth.valid_before.as_secs()),
        nonce: auth.nonce,
    };
    message.eip712_signing_hash(domain)
}

/// Recovers the signer of a payment payload and checks it is the claimed
/// payer.
///
/// # Errors
///
/// Returns [`VerificationError::InvalidSignature`] when the signature bytes
/// are malformed, recovery fails, or the recovered address differs from the
/// authorization's `from`.
pub fn recover_payer(
    payload: &ExactPayload,
    domain: &Eip712Domain,
) -> Result<Address, VerificationError> {
    let digest = authorization_digest(&payload.authorization, domain);
    let signature = Signature::from_raw(&payload.signature)
        .map_err(|e| VerificationError::InvalidSignature(e.to_string()))?;
    let recovered = signature
        .recover_address_from_prehash(&digest)
        .map_err(|e| VerificationError::InvalidSignature(e.to_string()))?;
    if recovered != payload.authorization.from {
        return Err(VerificationError::InvalidSignature(format!(
            "signature recovers to {recovered}, claimed payer is {}",
            payload.authorization.from
        )));
    }
    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use tollgate::timestamp::UnixTimestamp;

    fn domain() -> Eip712Domain {
        signing_domain(
            &SigningDomain {
                name: "USDC".into(),
                version: "2".into(),
            },
            84532,
            address!("0x3333333333333333333333333333333333333333"),
        )
    }

    fn authorization(from: Address) -> ExactAuthorization {
        ExactAuthorization {
            from,
            to: address!("0x1111111111111111111111111111111111111111"),
            value: 1_000_000.into(),
            valid_after: UnixTimestamp::from_secs(0),
            valid_before: UnixTimestamp::from_secs(2_000_000_000),
            nonce: B256::repeat_byte(0x42),
        }
    }

    fn signed_payload(signer: &PrivateKeySigner) -> ExactPayload {
        let auth = authorization(signer.address());
        let digest = authorization_digest(&auth, &domain());
        let signature = signer.sign_hash_sync(&digest).expect("sign");
        ExactPayload {
            signature: signature.as_bytes().to_vec().into(),
            authorization: auth,
        }
    }

    #[test]
    fn valid_signature_recovers_the_payer() {
        let signer = PrivateKeySigner::random();
        let payload = signed_payload(&signer);
        let payer = recover_payer(&payload, &domain()).expect("valid");
        assert_eq!(payer, signer.address());
    }

    #[test]
    fn wrong_domain_invalidates_the_signature() {
        let signer = PrivateKeySigner::random();
        let payload = signed_payload(&signer);
        let other_domain = signing_domain(
            &SigningDomain {
                name: "USDC".into(),
                version: "1".into(),
            },
            84532,
            address!("0x3333333333333333333333333333333333333333"),
        );
        let err = recover_payer(&payload, &other_domain).expect_err("domain drift");
        assert!(matches!(err, VerificationError::InvalidSignature(_)));
    }

    #[test]
    fn claimed_payer_must_match_recovery() {
        let signer = PrivateKeySigner::random();
        let mut payload = signed_payload(&signer);
        payload.authorization.from = address!("0x9999999999999999999999999999999999999999");
        let err = recover_payer(&payload, &domain()).expect_err("impersonation");
        assert!(matches!(err, VerificationError::InvalidSignature(_)));
    }

    #[test]
    fn tampered_value_invalidates_the_signature() {
        let signer = PrivateKeySigner::random();
        let mut payload = signed_payload(&signer);
        payload.authorization.value = 1.into();
        let err = recover_payer(&payload, &domain()).expect_err("tamper");
        assert!(matches!(err, VerificationError::InvalidSignature(_)));
    }
}
