//! The transaction ledger: every payment attempt and its lifecycle state.
//!
//! The ledger is the only shared mutable state in the gateway. It is keyed
//! by [`PaymentId`], derived deterministically from payer, nonce, and
//! resource so that retries of the same payment collapse onto one record.
//!
//! Records move strictly forward through the status lattice
//!
//! ```text
//! pending -> verified -> settled
//!     \         |
//!      `--> failed <--'
//! ```
//!
//! Terminal states (`settled`, `failed`) are never left. Advancement of the
//! same id is serialized per key; distinct ids advance independently.
//!
//! Storage is behind the [`Ledger`] trait so the invariants are testable
//! without a live network: [`InMemoryLedger`] serves tests and
//! single-process deployments, durable backends can be added behind the same
//! trait.

use alloy_primitives::{Address, B256, keccak256};
use dashmap::{DashMap, DashSet};
use std::fmt;

use crate::timestamp::UnixTimestamp;

/// Deterministic payment identifier: `keccak256(payer ‖ nonce ‖ resource)`.
///
/// Retries carrying the same authorization for the same resource derive the
/// same id, which is what makes settlement idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PaymentId(B256);

impl PaymentId {
    /// Derives the payment id for an authorization targeting a resource.
    #[must_use]
    pub fn derive(payer: Address, nonce: B256, resource: &str) -> Self {
        let mut buf = Vec::with_capacity(20 + 32 + resource.len());
        buf.extend_from_slice(payer.as_slice());
        buf.extend_from_slice(nonce.as_slice());
        buf.extend_from_slice(resource.as_bytes());
        Self(keccak256(buf))
    }

    /// Returns the raw 32-byte identifier.
    #[must_use]
    pub const fn inner(&self) -> B256 {
        self.0
    }
}

impl From<B256> for PaymentId {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Recorded, settlement not yet submitted.
    Pending,
    /// Proof verified and settlement submitted on-chain.
    Verified,
    /// Settlement confirmed. Terminal.
    Settled,
    /// Settlement reverted or timed out. Terminal.
    Failed,
}

impl TxStatus {
    /// Returns `true` for states no record may ever leave.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Failed)
    }

    /// Whether `self -> to` is a legal forward transition.
    #[must_use]
    pub const fn allows(&self, to: Self) -> bool {
        match (self, to) {
            (Self::Pending, Self::Verified | Self::Failed)
            | (Self::Verified, Self::Settled | Self::Failed) => true,
            _ => false,
        }
    }

    /// Snake-case name for wire responses and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Settled => "settled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payment attempt and its lifecycle state.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// The payment identifier (ledger key).
    pub id: PaymentId,
    /// The resource the payment covers.
    pub resource: String,
    /// The payer address.
    pub payer: Address,
    /// The authorized amount, in atomic token units.
    pub amount: u64,
    /// The payment scheme used (e.g., `"exact"`).
    pub scheme: String,
    /// The single-use authorization nonce (replay key, with `payer`).
    pub nonce: B256,
    /// Current lifecycle state.
    pub status: TxStatus,
    /// When the attempt was first recorded.
    pub created_at: UnixTimestamp,
    /// On-chain settlement transaction hash, once known.
    pub transaction_hash: Option<B256>,
}

/// Errors raised by ledger operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    /// No record exists for the given id.
    #[error("no ledger record for payment {0}")]
    NotFound(PaymentId),
    /// A record for this id already exists.
    #[error("payment {0} was already recorded")]
    DuplicateAttempt(PaymentId),
    /// The `(payer, nonce)` pair was consumed by an earlier attempt.
    #[error("nonce already consumed for payer {payer}")]
    NonceConsumed {
        /// The payer whose nonce was reused.
        payer: Address,
    },
    /// The record is in a terminal state and cannot move.
    #[error("payment {id} is terminal ({status})")]
    Terminal {
        /// The payment identifier.
        id: PaymentId,
        /// The terminal state the record is in.
        status: TxStatus,
    },
    /// The requested transition is not forward in the lattice.
    #[error("illegal transition {from} -> {to} for payment {id}")]
    IllegalTransition {
        /// The payment identifier.
        id: PaymentId,
        /// Current state.
        from: TxStatus,
        /// Requested state.
        to: TxStatus,
    },
}

/// Keyed store of payment attempts enforcing the forward-only lattice.
///
/// Implementations must serialize concurrent [`advance`](Ledger::advance)
/// calls for the same id, and must make
/// [`record_attempt`](Ledger::record_attempt) consume the `(payer, nonce)`
/// pair atomically so a replayed proof can never be recorded twice.
pub trait Ledger: Send + Sync {
    /// Records a new payment attempt in `pending` state, consuming its
    /// `(payer, nonce)` pair.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NonceConsumed`] if the pair was used before;
    /// [`LedgerError::DuplicateAttempt`] if the id is already present.
    fn record_attempt(&self, tx: Transaction) -> Result<(), LedgerError>;

    /// Advances a record to `to`, optionally attaching the settlement
    /// transaction hash.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for unknown ids, [`LedgerError::Terminal`]
    /// when the record already reached `settled` or `failed`, and
    /// [`LedgerError::IllegalTransition`] for any non-forward move.
    fn advance(
        &self,
        id: &PaymentId,
        to: TxStatus,
        transaction_hash: Option<B256>,
    ) -> Result<Transaction, LedgerError>;

    /// Looks up the current record for an id.
    fn lookup(&self, id: &PaymentId) -> Option<Transaction>;

    /// Returns `true` if the `(payer, nonce)` pair was already consumed.
    fn nonce_consumed(&self, payer: Address, nonce: B256) -> bool;
}

/// In-memory [`Ledger`] backed by concurrent hash maps.
///
/// Per-key serialization comes from the map's sharded entry locks: an
/// in-flight `advance` for an id holds that entry exclusively, while other
/// ids proceed on their own shards.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    records: DashMap<PaymentId, Transaction>,
    consumed_nonces: DashSet<(Address, B256)>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ledger for InMemoryLedger {
    fn record_attempt(&self, tx: Transaction) -> Result<(), LedgerError> {
        // Nonce consumption is the atomic guard: insert returns false if the
        // pair was already present.
        if !self.consumed_nonces.insert((tx.payer, tx.nonce)) {
            return Err(LedgerError::NonceConsumed { payer: tx.payer });
        }
        let id = tx.id;
        if self.records.contains_key(&id) {
            return Err(LedgerError::DuplicateAttempt(id));
        }
        tracing::debug!(payment_id = %id, resource = %tx.resource, "Recorded payment attempt");
        self.records.insert(id, tx);
        Ok(())
    }

    fn advance(
        &self,
        id: &PaymentId,
        to: TxStatus,
        transaction_hash: Option<B256>,
    ) -> Result<Transaction, LedgerError> {
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or(LedgerError::NotFound(*id))?;
        let from = entry.status;
        if from.is_terminal() {
            return Err(LedgerError::Terminal { id: *id, status: from });
        }
        if !from.allows(to) {
            return Err(LedgerError::IllegalTransition { id: *id, from, to });
        }
        entry.status = to;
        if let Some(hash) = transaction_hash {
            entry.transaction_hash = Some(hash);
        }
        tracing::debug!(payment_id = %id, %from, %to, "Advanced payment");
        Ok(entry.clone())
    }

    fn lookup(&self, id: &PaymentId) -> Option<Transaction> {
        self.records.get(id).map(|r| r.clone())
    }

    fn nonce_consumed(&self, payer: Address, nonce: B256) -> bool {
        self.consumed_nonces.contains(&(payer, nonce))
    }
}

impl Transaction {
    /// Creates a fresh `pending` record for a verified proof.
    #[must_use]
    pub fn attempt(
        id: PaymentId,
        resource: impl Into<String>,
        payer: Address,
        nonce: B256,
        amount: u64,
        scheme: impl Into<String>,
    ) -> Self {
        Self {
            id,
            resource: resource.into(),
            payer,
            amount,
            scheme: scheme.into(),
            status: TxStatus::Pending,
            created_at: UnixTimestamp::now(),
            transaction_hash: None,
            nonce,
        }
    }
}
