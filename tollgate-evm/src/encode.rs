//! Call encoders for the agent's smart-account operations.
//!
//! A [`Call`] is one ABI-encoded invocation: target, attached value, and
//! calldata. The three builders here are the single source of truth for
//! encoding against the fixed interfaces in [`crate::contract`]; callers
//! never hand-construct these payloads, so a signature change lands in
//! exactly one place.

use alloy_primitives::{Address, Bytes, U256, keccak256};
use alloy_sol_types::SolCall;

use crate::contract::{IERC20, IPaymentGateway, IServiceRegistry, ISpendingPool};
use tollgate::proto::{PaymentProof, PaymentRequirements};

/// One ABI-encoded contract invocation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Target contract address.
    pub target: Address,
    /// Native value attached to the call.
    pub value: U256,
    /// ABI-encoded calldata.
    pub data: Bytes,
}

/// Derives the 32-byte registry key of a string service identifier.
#[must_use]
pub fn service_key(service_id: &str) -> alloy_primitives::B256 {
    keccak256(service_id.as_bytes())
}

/// Encodes a withdrawal of `amount` from the spending pool.
///
/// The pool enforces the capped daily allowance on-chain; the agent only
/// states how much it pulls.
#[must_use]
pub fn pool_withdrawal(pool: Address, amount: U256) -> Call {
    Call {
        target: pool,
        value: U256::ZERO,
        data: ISpendingPool::withdrawCall { amount }.abi_encode().into(),
    }
}

/// Encodes an ERC-20 `approve(spender, amount)`.
#[must_use]
pub fn erc20_approval(token: Address, spender: Address, amount: U256) -> Call {
    Call {
        target: token,
        value: U256::ZERO,
        data: IERC20::approveCall { spender, amount }.abi_encode().into(),
    }
}

/// Encodes a registry `payForService(serviceId, quantity)` call.
#[must_use]
pub fn pay_for_service(registry: Address, service_id: &str, quantity: U256) -> Call {
    Call {
        target: registry,
        value: U256::ZERO,
        data: IServiceRegistry::payForServiceCall {
            serviceId: service_key(service_id),
            quantity,
        }
        .abi_encode()
        .into(),
    }
}

/// Encodes the gateway `settlePayment` call for a verified proof.
///
/// Used by the settlement executor; shares the encoding discipline of the
/// agent-side builders.
#[must_use]
pub fn settle_payment(
    gateway: Address,
    proof: &PaymentProof,
    requirements: &PaymentRequirements,
) -> Call {
    let auth = &proof.payload.authorization;
    Call {
        target: gateway,
        value: U256::ZERO,
        data: IPaymentGateway::settlePaymentCall {
            from: auth.from,
            to: auth.to,
            asset: requirements.asset,
            value: U256::from(auth.value.inner()),
            validAfter: U256::from(auth.valid_after.as_secs()),
            validBefore: U256::from(auth.valid_before.as_secs()),
            nonce: auth.nonce,
            signature: proof.payload.signature.clone(),
        }
        .abi_encode()
        .into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const POOL: Address = address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    const TOKEN: Address = address!("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
    const REGISTRY: Address = address!("0xcccccccccccccccccccccccccccccccccccccccc");

    #[test]
    fn pool_withdrawal_encodes_against_the_fixed_signature() {
        let call = pool_withdrawal(POOL, U256::from(5_000_000u64));
        assert_eq!(call.target, POOL);
        assert_eq!(call.value, U256::ZERO);
        assert_eq!(&call.data[..4], ISpendingPool::withdrawCall::SELECTOR.as_slice());

        let decoded = ISpendingPool::withdrawCall::abi_decode(&call.data).expect("decode");
        assert_eq!(decoded.amount, U256::from(5_000_000u64));
    }

    #[test]
    fn approval_encodes_spender_and_amount() {
        let call = erc20_approval(TOKEN, REGISTRY, U256::from(1_000_000u64));
        assert_eq!(&call.data[..4], IERC20::approveCall::SELECTOR.as_slice());

        let decoded = IERC20::approveCall::abi_decode(&call.data).expect("decode");
        assert_eq!(decoded.spender, REGISTRY);
        assert_eq!(decoded.amount, U256::from(1_000_000u64));
    }

    #[test]
    fn pay_for_service_uses_the_derived_service_key() {
        let call = pay_for_service(REGISTRY, "svc-weather", U256::from(1u64));
        let decoded = IServiceRegistry::payForServiceCall::abi_decode(&call.data).expect("decode");
        assert_eq!(decoded.serviceId, service_key("svc-weather"));
        assert_eq!(decoded.quantity, U256::from(1u64));
    }

    #[test]
    fn service_key_is_deterministic() {
        assert_eq!(service_key("svc"), service_key("svc"));
        assert_ne!(service_key("svc"), service_key("svc2"));
    }
}
