//! Client-side smart-account operation pipeline.
//!
//! The agent never sends raw transactions: it bundles [`encode`] calls into
//! an [`operation::Operation`], signs the bundle digest with its session
//! key, and hands it to a [`relay::Relay`] for on-chain execution. The
//! [`submitter::OperationSubmitter`] drives one operation from signing to a
//! terminal outcome.
//!
//! [`encode`]: crate::encode

pub mod operation;
pub mod relay;
pub mod submitter;
