//! Core types for the tollgate pay-per-use gateway protocol.
//!
//! Tollgate mediates pay-per-use access to networked resources over an
//! HTTP-402-based payment protocol. An unpaid request for a resource is
//! answered with a 402 challenge enumerating acceptable payment terms; the
//! client retries with a signed payment proof, which the gateway verifies,
//! settles on a ledger, and only then proxies through to the origin service.
//!
//! This crate holds the chain-agnostic foundation shared by the proxy server
//! and the EVM support crate:
//!
//! - [`proto`] - Wire format types: 402 bodies, payment requirements,
//!   payment proofs, settlement evidence
//! - [`catalog`] - Resource catalog lookups and registry loading
//! - [`ledger`] - The transaction ledger with its forward-only status lattice
//! - [`gateway`] - The settlement gateway trait implemented per chain
//! - [`timestamp`] - Unix timestamps for authorization validity windows

pub mod catalog;
pub mod gateway;
pub mod ledger;
pub mod proto;
pub mod timestamp;
