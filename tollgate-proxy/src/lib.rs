//! The tollgate reverse proxy.
//!
//! Sits in front of pay-per-use HTTP resources and enforces the x402
//! payment flow: a request without a payment proof receives a 402 challenge
//! listing the payment requirements; a request carrying a valid proof is
//! verified, settled against the on-chain gateway, recorded in the ledger,
//! and forwarded to the resource origin with settlement evidence attached.

pub mod challenge;
pub mod config;
pub mod error;
pub mod forward;
pub mod handlers;
pub mod settle;
pub mod verify;
