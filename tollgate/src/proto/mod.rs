//! Wire format types for the tollgate payment protocol.
//!
//! Defines the JSON messages exchanged between clients and the gateway
//! proxy:
//!
//! - [`PaymentRequired`] - HTTP 402 challenge body
//! - [`PaymentRequirements`] - one acceptable way to pay, listed in `accepts`
//! - [`PaymentProof`] - signed authorization presented by the client on retry
//! - [`SettlementEvidence`] - settlement confirmation attached to proxied
//!   responses
//! - [`VerificationError`] - typed rejection reasons for invalid proofs
//!
//! All types serialize to JSON with camelCase field names. Amounts and
//! timestamps serialize as strings to survive `JavaScript` number parsing.

use alloy_primitives::{Address, B256, Bytes};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::timestamp::UnixTimestamp;

pub mod encoding;

use encoding::Base64Bytes;

/// Protocol version carried in the `x402Version` field.
pub const X402_VERSION: u8 = 1;

/// Request header carrying a base64-encoded [`PaymentProof`].
pub const PAYMENT_HEADER: &str = "Payment-Signature";

/// Response header carrying base64-encoded [`SettlementEvidence`].
pub const SETTLEMENT_HEADER: &str = "Payment-Response";

/// A `u64` amount that serializes as a string.
///
/// Atomic token amounts can exceed what a JSON `Number` represents exactly,
/// so the wire format stringifies them (`"1000000"`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct U64String(u64);

impl U64String {
    /// Returns the inner `u64` value.
    #[must_use]
    pub const fn inner(&self) -> u64 {
        self.0
    }
}

impl FromStr for U64String {
    type Err = <u64 as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

impl From<u64> for U64String {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<U64String> for u64 {
    fn from(value: U64String) -> Self {
        value.0
    }
}

impl fmt::Display for U64String {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for U64String {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for U64String {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<u64>().map(Self).map_err(serde::de::Error::custom)
    }
}

/// EIP-712 signing domain parameters attached to payment requirements.
///
/// Clients construct the typed-data domain for their authorization signature
/// from these values; the verifier rebuilds the same domain, so any drift
/// invalidates the signature.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningDomain {
    /// Domain name (typically the payment token's EIP-712 name).
    pub name: String,
    /// Domain version string.
    pub version: String,
}

/// Payment terms for one acceptable scheme/network combination.
///
/// Generated fresh for every 402 challenge; never persisted.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// The payment scheme (e.g., `"exact"`).
    pub scheme: String,
    /// CAIP-2 network identifier (e.g., `"eip155:84532"`).
    pub network: String,
    /// The maximum amount required, in atomic token units.
    pub max_amount_required: U64String,
    /// Identifier of the resource being paid for.
    pub resource: String,
    /// Human-readable description of the resource.
    pub description: String,
    /// MIME type of the resource.
    pub mime_type: String,
    /// The recipient address for the payment.
    pub pay_to: Address,
    /// How long, in seconds, the client has to produce a proof before this
    /// requirement is considered stale.
    pub max_timeout_seconds: u64,
    /// The token asset contract address.
    pub asset: Address,
    /// EIP-712 domain parameters for the authorization signature.
    pub extra: SigningDomain,
}

/// HTTP 402 Payment Required response body.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version.
    pub x402_version: u8,
    /// Human-readable explanation of why payment is required.
    pub error: String,
    /// Acceptable ways to pay, in preference order.
    pub accepts: Vec<PaymentRequirements>,
    /// Address of the payment gateway contract that settles proofs.
    pub gateway_contract: Address,
    /// The service identifier of the challenged resource.
    pub service_id: String,
}

/// A time-bounded transfer authorization signed by the payer.
///
/// The canonical EIP-712 message under the payment proof signature. The
/// `nonce` makes the authorization single-use: the ledger refuses to verify
/// the same `(from, nonce)` pair twice.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactAuthorization {
    /// The payer address.
    pub from: Address,
    /// The payment recipient.
    pub to: Address,
    /// Authorized amount in atomic token units.
    pub value: U64String,
    /// Start of the validity window (inclusive).
    pub valid_after: UnixTimestamp,
    /// End of the validity window (exclusive).
    pub valid_before: UnixTimestamp,
    /// 32-byte single-use nonce.
    pub nonce: B256,
}

/// Scheme-specific payload of a payment proof: the authorization plus the
/// payer's signature over its typed-data digest.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactPayload {
    /// EIP-712 signature bytes (65-byte r‖s‖v).
    pub signature: Bytes,
    /// The signed authorization.
    pub authorization: ExactAuthorization,
}

/// A signed payment authorization presented by the client on retry.
///
/// Travels base64-encoded in the [`PAYMENT_HEADER`] request header.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProof {
    /// Protocol version.
    pub x402_version: u8,
    /// The payment scheme this proof answers.
    pub scheme: String,
    /// CAIP-2 network identifier the payment settles on.
    pub network: String,
    /// The signed authorization payload.
    pub payload: ExactPayload,
}

impl PaymentProof {
    /// Decodes a proof from raw header bytes (base64-encoded JSON).
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::MalformedProof`] if the header is not
    /// valid base64 or does not decode to a proof.
    pub fn from_header(header: &[u8]) -> Result<Self, VerificationError> {
        let raw = Base64Bytes::from(header)
            .decode()
            .map_err(|e| VerificationError::MalformedProof(e.to_string()))?;
        serde_json::from_slice(&raw).map_err(|e| VerificationError::MalformedProof(e.to_string()))
    }

    /// Encodes the proof as base64 header bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_header(&self) -> Result<Base64Bytes, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(Base64Bytes::encode(json))
    }
}

/// Settlement confirmation attached to a successfully proxied response.
///
/// Travels base64-encoded in the [`SETTLEMENT_HEADER`] response header.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementEvidence {
    /// Whether the settlement has been confirmed on-chain.
    pub success: bool,
    /// Deterministic payment identifier (ledger key).
    pub payment_id: B256,
    /// On-chain settlement transaction hash, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
    /// Network the payment settled on.
    pub network: String,
    /// The payer address.
    pub payer: Address,
}

impl SettlementEvidence {
    /// Encodes the evidence as base64 header bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_header(&self) -> Result<Base64Bytes, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(Base64Bytes::encode(json))
    }
}

/// Reasons a payment proof fails verification.
///
/// Verification never partially applies a payment: the first failing check
/// rejects the proof with one of these variants and nothing is recorded as
/// consumed (except a replayed nonce, which was consumed by its first use).
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum VerificationError {
    /// The proof header was unparseable or structurally invalid.
    #[error("malformed payment proof: {0}")]
    MalformedProof(String),
    /// The proof's scheme does not match any offered requirement.
    #[error("payment scheme does not match the payment requirements")]
    SchemeMismatch,
    /// The proof's network does not match any offered requirement.
    #[error("payment network does not match the payment requirements")]
    NetworkMismatch,
    /// The authorized recipient is not the required `payTo` address.
    #[error("payment recipient does not match the payment requirements")]
    RecipientMismatch,
    /// The authorized amount is below the required amount.
    #[error("authorized amount is below the required payment amount")]
    InsufficientAmount,
    /// The signature does not recover to the claimed payer.
    #[error("invalid payment signature: {0}")]
    InvalidSignature(String),
    /// The authorization's validity window has not opened yet.
    #[error("payment authorization is not yet valid")]
    Early,
    /// The authorization expired, or its window exceeds the requirement's
    /// `maxTimeoutSeconds` bound.
    #[error("payment authorization is expired")]
    ExpiredRequirement,
    /// The `(payer, nonce)` pair was already consumed by a prior payment.
    #[error("payment nonce was already used")]
    ReplayedPayment,
}

impl VerificationError {
    /// Machine-readable reason code for wire responses.
    #[must_use]
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::MalformedProof(_) => "malformed_proof",
            Self::SchemeMismatch => "scheme_mismatch",
            Self::NetworkMismatch => "network_mismatch",
            Self::RecipientMismatch => "recipient_mismatch",
            Self::InsufficientAmount => "insufficient_amount",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::Early => "authorization_early",
            Self::ExpiredRequirement => "expired_requirement",
            Self::ReplayedPayment => "replayed_payment",
        }
    }
}
