//! Solidity interface definitions for on-chain interactions.
//!
//! Contains the minimal ABI surface the gateway and agent touch:
//!
//! - [`IPaymentGateway`] — settles verified payment authorizations
//! - [`ISpendingPool`] — capped-allowance pool the smart account draws from
//! - [`IERC20`] — minimal ERC-20 subset for approvals
//! - [`IServiceRegistry`] — pay-for-service entry point of the registry
//!
//! These contracts are external collaborators; nothing here implements
//! them. The agent-side encoders in [`crate::encode`] are the single source
//! of truth for their calldata — payloads are never hand-constructed
//! elsewhere.

use alloy_sol_types::sol;

sol! {
    /// Payment gateway ledger contract.
    ///
    /// `settlePayment` transfers the authorized amount from the payer and
    /// records the payment id. Authorizations follow the time-bounded,
    /// nonce-guarded transfer pattern of ERC-3009.
    #[allow(missing_docs)]
    #[allow(clippy::too_many_arguments)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IPaymentGateway {
        function settlePayment(
            address from,
            address to,
            address asset,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            bytes signature
        ) external returns (bytes32 paymentId);
    }
}

sol! {
    /// Spending pool with a capped daily allowance per spender.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface ISpendingPool {
        function withdraw(uint256 amount) external;
    }
}

sol! {
    /// Minimal ERC-20 interface for token approvals.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
    }
}

sol! {
    /// Service registry pay-for-service entry point.
    ///
    /// Service ids are 32-byte keys; see [`crate::encode::service_key`] for
    /// the derivation from a string identifier.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IServiceRegistry {
        function payForService(bytes32 serviceId, uint256 quantity) external;
    }
}
