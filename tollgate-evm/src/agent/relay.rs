//! Relay transport for signed operations.
//!
//! The account contract only executes bundles delivered by its relay, so
//! the agent speaks to the relay's HTTP API instead of the chain directly.
//! [`Relay`] is the seam: the submitter is tested against an in-process
//! fake, and [`HttpRelay`] is the production implementation.

use alloy_primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use super::operation::Operation;
use crate::encode::Call;

/// Errors talking to the relay.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RelayError {
    /// The relay refused the operation outright (bad signature, stale
    /// nonce, policy violation). The operation was never broadcast.
    #[error("relay rejected the operation: {reason}")]
    Rejected {
        /// Relay-supplied rejection reason.
        reason: String,
    },
    /// Transport or relay-side failure; submission state is unknown.
    #[error("relay transport error: {0}")]
    Transport(String),
}

/// Terminal execution record of a relayed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayReceipt {
    /// Whether the bundle executed without reverting.
    pub success: bool,
    /// Hash of the including transaction.
    pub transaction_hash: B256,
    /// Revert reason reported by the relay, when execution failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
}

/// Submits signed operations and answers receipt queries.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Submits a signed operation; returns the relay's operation hash.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Rejected`] when the relay refuses the
    /// operation, [`RelayError::Transport`] on delivery failure.
    async fn submit(&self, operation: &Operation) -> Result<B256, RelayError>;

    /// Queries the receipt of a previously submitted operation.
    ///
    /// `Ok(None)` means the operation is known but not yet included; a
    /// caller that timed out earlier can keep asking and still reach a
    /// terminal answer.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] on delivery failure.
    async fn receipt(&self, operation_hash: B256) -> Result<Option<RelayReceipt>, RelayError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest<'a> {
    sender: Address,
    nonce: u64,
    calls: Vec<WireCall<'a>>,
    gas_estimate: u64,
    signature: &'a Bytes,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireCall<'a> {
    target: Address,
    value: U256,
    data: &'a Bytes,
}

impl<'a> From<&'a Call> for WireCall<'a> {
    fn from(call: &'a Call) -> Self {
        Self {
            target: call.target,
            value: call.value,
            data: &call.data,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    operation_hash: B256,
}

/// HTTP client for a relay endpoint.
///
/// `POST {base}/operations` submits, `GET {base}/operations/{hash}/receipt`
/// polls; a 404 on the receipt route means "not yet included".
#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: reqwest::Client,
    base: Url,
}

impl HttpRelay {
    /// Creates a relay client for the given base URL.
    #[must_use]
    pub fn new(base: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, RelayError> {
        self.base
            .join(path)
            .map_err(|e| RelayError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Relay for HttpRelay {
    async fn submit(&self, operation: &Operation) -> Result<B256, RelayError> {
        let signature = operation.signature.as_ref().ok_or_else(|| RelayError::Rejected {
            reason: "operation is unsigned".to_owned(),
        })?;
        let body = SubmitRequest {
            sender: operation.sender,
            nonce: operation.nonce,
            calls: operation.calls.iter().map(WireCall::from).collect(),
            gas_estimate: operation.gas_estimate,
            signature,
        };

        let response = self
            .client
            .post(self.endpoint("operations")?)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let reason = response.text().await.unwrap_or_default();
            return Err(RelayError::Rejected { reason });
        }
        if !status.is_success() {
            return Err(RelayError::Transport(format!("relay returned {status}")));
        }

        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(parsed.operation_hash)
    }

    async fn receipt(&self, operation_hash: B256) -> Result<Option<RelayReceipt>, RelayError> {
        let response = self
            .client
            .get(self.endpoint(&format!("operations/{operation_hash}/receipt"))?)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let receipt: RelayReceipt = response
                    .json()
                    .await
                    .map_err(|e| RelayError::Transport(e.to_string()))?;
                Ok(Some(receipt))
            }
            status => Err(RelayError::Transport(format!("relay returned {status}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn signed_operation() -> Operation {
        Operation {
            sender: address!("0x5555555555555555555555555555555555555555"),
            nonce: 7,
            calls: vec![Call {
                target: address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
                value: U256::ZERO,
                data: Bytes::from(vec![0x01, 0x02]),
            }],
            gas_estimate: 90_000,
            signature: Some(Bytes::from(vec![0xab; 65])),
        }
    }

    fn relay_for(server: &MockServer) -> HttpRelay {
        HttpRelay::new(Url::parse(&server.uri()).expect("mock server url"))
    }

    #[tokio::test]
    async fn submit_posts_the_operation_and_returns_its_hash() {
        let server = MockServer::start().await;
        let hash = B256::repeat_byte(0x11);
        Mock::given(method("POST"))
            .and(path("/operations"))
            .and(body_partial_json(json!({
                "sender": "0x5555555555555555555555555555555555555555",
                "nonce": 7,
                "gasEstimate": 90000,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "operationHash": hash,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let submitted = relay_for(&server)
            .submit(&signed_operation())
            .await
            .expect("submit");
        assert_eq!(submitted, hash);
    }

    #[tokio::test]
    async fn client_errors_surface_as_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/operations"))
            .respond_with(ResponseTemplate::new(400).set_body_string("stale nonce"))
            .mount(&server)
            .await;

        let err = relay_for(&server)
            .submit(&signed_operation())
            .await
            .expect_err("rejected");
        match err {
            RelayError::Rejected { reason } => assert_eq!(reason, "stale nonce"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unsigned_operations_are_rejected_locally() {
        let server = MockServer::start().await;
        let mut operation = signed_operation();
        operation.signature = None;

        let err = relay_for(&server)
            .submit(&operation)
            .await
            .expect_err("unsigned");
        assert!(matches!(err, RelayError::Rejected { .. }));
    }

    #[tokio::test]
    async fn missing_receipt_is_none_not_an_error() {
        let server = MockServer::start().await;
        let hash = B256::repeat_byte(0x22);
        Mock::given(method("GET"))
            .and(path(format!("/operations/{hash}/receipt")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let receipt = relay_for(&server).receipt(hash).await.expect("query");
        assert!(receipt.is_none());
    }

    #[tokio::test]
    async fn receipt_reports_reverted_execution() {
        let server = MockServer::start().await;
        let hash = B256::repeat_byte(0x33);
        let tx_hash = B256::repeat_byte(0x44);
        Mock::given(method("GET"))
            .and(path(format!("/operations/{hash}/receipt")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "transactionHash": tx_hash,
                "revertReason": "allowance exceeded",
            })))
            .mount(&server)
            .await;

        let receipt = relay_for(&server)
            .receipt(hash)
            .await
            .expect("query")
            .expect("included");
        assert!(!receipt.success);
        assert_eq!(receipt.transaction_hash, tx_hash);
        assert_eq!(receipt.revert_reason.as_deref(), Some("allowance exceeded"));
    }
}
