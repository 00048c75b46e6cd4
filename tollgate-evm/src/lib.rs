//! EVM chain support for the tollgate gateway.
//!
//! Two halves live here:
//!
//! - the **gateway side**: [`contract`] bindings for the on-chain payment
//!   gateway, [`typed_data`] verification of EIP-712 payment authorizations,
//!   and the [`gateway::OnchainGateway`] settlement implementation;
//! - the **agent side**: the [`encode`] call builders, the
//!   [`agent::operation`] bundle builder, and the [`agent::submitter`] that
//!   signs operations and drives them through a relay to a terminal receipt.

pub mod agent;
pub mod chain;
pub mod contract;
pub mod encode;
pub mod gateway;
pub mod typed_data;
