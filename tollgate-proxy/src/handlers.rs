//! Axum routes: the paywalled proxy itself plus health and admin lookups.
//!
//! Request flow for `/{service_id}[/...]`:
//!
//! 1. resolve the resource or 404;
//! 2. no `Payment-Signature` header: answer 402 with a fresh challenge;
//! 3. parse and verify the proof; any failure re-challenges with the reason;
//! 4. settle through the executor (ledger recording, idempotency, replay);
//! 5. forward to the origin with the settlement evidence header attached.

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, Method, Uri};
use axum::response::Response;
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use tollgate::catalog::{Resource, ResourceCatalog, StaticCatalog};
use tollgate::ledger::{Ledger, PaymentId, Transaction};
use tollgate::proto::{PAYMENT_HEADER, PaymentProof, U64String};
use tollgate::timestamp::UnixTimestamp;

use crate::challenge::{build_challenge, requirements_for};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::forward::Forwarder;
use crate::settle::SettlementExecutor;
use crate::verify::verify_proof;

/// Shared application state, built once at startup.
pub struct AppState {
    /// The immutable configuration.
    pub config: Arc<ProxyConfig>,
    /// Published resources.
    pub catalog: StaticCatalog,
    /// The payment ledger.
    pub ledger: Arc<dyn Ledger>,
    /// Settlement executor.
    pub executor: SettlementExecutor,
    /// Origin forwarder.
    pub forwarder: Forwarder,
    /// Numeric chain id of the settlement network.
    pub chain_id: u64,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("chain_id", &self.chain_id)
            .field("resources", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

/// State handle passed to every handler.
pub type SharedState = Arc<AppState>;

/// Builds the proxy router with all routes and layers.
pub fn proxy_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);
    Router::new()
        .route("/health", get(health))
        .route("/admin/ledger/{payment_id}", get(admin_ledger))
        .route("/{service_id}", any(proxy_root))
        .route("/{service_id}/{*rest}", any(proxy_nested))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> cors::CorsLayer {
    let layer = cors::CorsLayer::new()
        .allow_methods(cors::Any)
        .allow_headers(cors::Any);
    if allowed_origins.is_empty() {
        layer.allow_origin(cors::Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer.allow_origin(origins)
    }
}

/// Health check endpoint.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn proxy_root(
    State(state): State<SharedState>,
    Path(service_id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, ProxyError> {
    proxy_request(&state, &service_id, None, &uri, method, &headers, body).await
}

async fn proxy_nested(
    State(state): State<SharedState>,
    Path((service_id, rest)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, ProxyError> {
    proxy_request(&state, &service_id, Some(&rest), &uri, method, &headers, body).await
}

async fn proxy_request(
    state: &AppState,
    service_id: &str,
    rest: Option<&str>,
    uri: &Uri,
    method: Method,
    headers: &HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, ProxyError> {
    let resource = state
        .catalog
        .resolve(service_id)
        .ok_or_else(|| ProxyError::UnknownResource(service_id.to_owned()))?;
    let requirements = requirements_for(&resource, &state.config);

    let Some(header_value) = headers.get(PAYMENT_HEADER) else {
        info!(service = %service_id, "Challenging unpaid request");
        return Err(challenge_error(&resource, &state.config, "payment required"));
    };

    let proof = match PaymentProof::from_header(header_value.as_bytes()) {
        Ok(proof) => proof,
        Err(err) => {
            warn!(service = %service_id, error = %err, "Rejecting malformed proof");
            return Err(challenge_error(&resource, &state.config, err.to_string()));
        }
    };

    let verified = match verify_proof(
        &proof,
        &requirements,
        state.chain_id,
        state.config.gateway_contract,
        &*state.ledger,
        UnixTimestamp::now(),
    ) {
        Ok(verified) => verified,
        Err(err) => {
            warn!(service = %service_id, reason = err.reason_code(), "Rejecting payment proof");
            return Err(challenge_error(&resource, &state.config, err.to_string()));
        }
    };

    let evidence = state
        .executor
        .execute(&verified, &proof, &requirements)
        .await?;

    state
        .forwarder
        .forward(
            &resource.origin_url,
            rest,
            uri.query(),
            method,
            headers,
            body,
            &evidence,
        )
        .await
        .map_err(Into::into)
}

fn challenge_error(
    resource: &Resource,
    config: &ProxyConfig,
    error: impl Into<String>,
) -> ProxyError {
    ProxyError::PaymentRequired(Box::new(build_challenge(resource, config, error)))
}

/// Read-only ledger record exposed to the admin endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecordView {
    payment_id: B256,
    resource: String,
    payer: Address,
    amount: U64String,
    scheme: String,
    status: &'static str,
    created_at: UnixTimestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_hash: Option<B256>,
}

impl From<Transaction> for LedgerRecordView {
    fn from(tx: Transaction) -> Self {
        Self {
            payment_id: tx.id.inner(),
            resource: tx.resource,
            payer: tx.payer,
            amount: tx.amount.into(),
            scheme: tx.scheme,
            status: tx.status.as_str(),
            created_at: tx.created_at,
            transaction_hash: tx.transaction_hash,
        }
    }
}

/// `GET /admin/ledger/{payment_id}` — ledger record lookup, guarded by the
/// configured admin bearer token. Disabled entirely when no token is set.
async fn admin_ledger(
    State(state): State<SharedState>,
    Path(payment_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<LedgerRecordView>, ProxyError> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Err(ProxyError::UnknownResource(payment_id));
    };
    let provided = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if provided != Some(expected) {
        return Err(ProxyError::Unauthorized);
    }

    let raw: B256 = payment_id
        .parse()
        .map_err(|_| ProxyError::UnknownResource(payment_id.clone()))?;
    let record = state
        .ledger
        .lookup(&PaymentId::from(raw))
        .ok_or(ProxyError::UnknownResource(payment_id))?;
    Ok(Json(record.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use async_trait::async_trait;
    use wiremock::matchers::{method as http_method, path as http_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use tollgate::gateway::{
        SettleError, SettlementConfirmation, SettlementGateway, SettlementSubmitted,
    };
    use tollgate::ledger::InMemoryLedger;
    use tollgate::proto::{
        ExactAuthorization, ExactPayload, PaymentRequired, SettlementEvidence, X402_VERSION,
        encoding::Base64Bytes, SETTLEMENT_HEADER,
    };
    use tollgate_evm::typed_data::{authorization_digest, signing_domain};

    use crate::settle::SettleMode;

    const ADMIN_TOKEN: &str = "test-admin-token";

    struct FakeGateway;

    #[async_trait]
    impl SettlementGateway for FakeGateway {
        async fn settle(
            &self,
            proof: &PaymentProof,
            requirements: &tollgate::proto::PaymentRequirements,
        ) -> Result<SettlementSubmitted, SettleError> {
            let auth = &proof.payload.authorization;
            Ok(SettlementSubmitted {
                payment_id: PaymentId::derive(auth.from, auth.nonce, &requirements.resource),
                transaction_hash: B256::repeat_byte(0xcc),
            })
        }

        async fn confirm(
            &self,
            submitted: &SettlementSubmitted,
        ) -> Result<SettlementConfirmation, SettleError> {
            Ok(SettlementConfirmation {
                payment_id: submitted.payment_id,
                transaction_hash: submitted.transaction_hash,
                success: true,
            })
        }
    }

    /// Serves the full proxy on an ephemeral port in front of `origin`.
    async fn spawn_proxy(origin_url: &str) -> String {
        let toml = format!(
            r#"
            rpc_url = "https://sepolia.base.org"
            gateway_contract = "0x3333333333333333333333333333333333333333"
            settlement_signer_key = "0xdeadbeef"
            admin_token = "{ADMIN_TOKEN}"

            [resources.svc-weather]
            owner = "0x1111111111111111111111111111111111111111"
            origin_url = "{origin_url}"
            price_per_call = 1000000
            asset = "0x2222222222222222222222222222222222222222"
            "#
        );
        let config: Arc<ProxyConfig> = Arc::new(toml::from_str(&toml).expect("config"));
        let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new());
        let executor = SettlementExecutor::new(
            Arc::new(FakeGateway),
            Arc::clone(&ledger),
            SettleMode::Confirm,
            config.network.clone(),
        );
        let state = Arc::new(AppState {
            catalog: config.catalog(),
            chain_id: config.chain_id().expect("chain id"),
            ledger,
            executor,
            forwarder: Forwarder::new(),
            config,
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = proxy_router(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{addr}")
    }

    async fn start_origin() -> MockServer {
        let origin = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(http_path("/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_string("sunny"))
            .mount(&origin)
            .await;
        origin
    }

    /// Signs a proof answering the given challenge.
    fn answer_challenge(challenge: &PaymentRequired, signer: &PrivateKeySigner) -> String {
        let terms = &challenge.accepts[0];
        let now = UnixTimestamp::now();
        let auth = ExactAuthorization {
            from: signer.address(),
            to: terms.pay_to,
            value: terms.max_amount_required,
            valid_after: UnixTimestamp::from_secs(now.as_secs() - 10),
            valid_before: now + 200,
            // Unique per test run: every test draws a fresh signer.
            nonce: keccak256(signer.address()),
        };
        let domain = signing_domain(&terms.extra, 84532, challenge.gateway_contract);
        let digest = authorization_digest(&auth, &domain);
        let signature = signer.sign_hash_sync(&digest).expect("sign");
        let proof = PaymentProof {
            x402_version: X402_VERSION,
            scheme: terms.scheme.clone(),
            network: terms.network.clone(),
            payload: ExactPayload {
                signature: signature.as_bytes().to_vec().into(),
                authorization: auth,
            },
        };
        proof.to_header().expect("encode").to_string()
    }

    #[tokio::test]
    async fn unknown_service_is_not_found() {
        let proxy = spawn_proxy("http://127.0.0.1:1/").await;
        let response = reqwest::get(format!("{proxy}/svc-nope"))
            .await
            .expect("request");
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn unpaid_request_receives_a_covering_challenge() {
        let origin = start_origin().await;
        let proxy = spawn_proxy(&origin.uri()).await;

        let response = reqwest::get(format!("{proxy}/svc-weather/forecast"))
            .await
            .expect("request");
        assert_eq!(response.status(), 402);

        let challenge: PaymentRequired = response.json().await.expect("body");
        assert_eq!(challenge.x402_version, 1);
        assert_eq!(challenge.service_id, "svc-weather");
        assert!(challenge.accepts[0].max_amount_required.inner() >= 1_000_000);
        // Origin never saw the unpaid request.
        assert!(origin.received_requests().await.expect("reqs").is_empty());
    }

    #[tokio::test]
    async fn paid_request_settles_and_forwards() {
        let origin = start_origin().await;
        let proxy = spawn_proxy(&origin.uri()).await;
        let signer = PrivateKeySigner::random();
        let client = reqwest::Client::new();

        let challenge: PaymentRequired = client
            .get(format!("{proxy}/svc-weather/forecast"))
            .send()
            .await
            .expect("challenge request")
            .json()
            .await
            .expect("challenge body");

        let response = client
            .get(format!("{proxy}/svc-weather/forecast"))
            .header(PAYMENT_HEADER, answer_challenge(&challenge, &signer))
            .send()
            .await
            .expect("paid request");
        assert_eq!(response.status(), 200);

        let evidence_header = response
            .headers()
            .get(SETTLEMENT_HEADER)
            .expect("settlement header")
            .clone();
        let raw = Base64Bytes::from(evidence_header.as_bytes())
            .decode()
            .expect("base64");
        let evidence: SettlementEvidence = serde_json::from_slice(&raw).expect("evidence");
        assert!(evidence.success);
        assert_eq!(evidence.payer, signer.address());
        assert_eq!(evidence.transaction_hash, Some(B256::repeat_byte(0xcc)));

        assert_eq!(response.text().await.expect("body"), "sunny");
    }

    #[tokio::test]
    async fn replayed_proof_is_rejected_once_used() {
        let origin = start_origin().await;
        let proxy = spawn_proxy(&origin.uri()).await;
        let signer = PrivateKeySigner::random();
        let client = reqwest::Client::new();

        let challenge: PaymentRequired = client
            .get(format!("{proxy}/svc-weather/forecast"))
            .send()
            .await
            .expect("challenge request")
            .json()
            .await
            .expect("challenge body");
        let header = answer_challenge(&challenge, &signer);

        let first = client
            .get(format!("{proxy}/svc-weather/forecast"))
            .header(PAYMENT_HEADER, &header)
            .send()
            .await
            .expect("first");
        assert_eq!(first.status(), 200);

        let second = client
            .get(format!("{proxy}/svc-weather/forecast"))
            .header(PAYMENT_HEADER, &header)
            .send()
            .await
            .expect("second");
        assert_eq!(second.status(), 402, "nonce must not verify twice");
        assert_eq!(
            origin.received_requests().await.expect("reqs").len(),
            1,
            "replay must not reach the origin"
        );
    }

    #[tokio::test]
    async fn admin_endpoint_exposes_the_settled_record() {
        let origin = start_origin().await;
        let proxy = spawn_proxy(&origin.uri()).await;
        let signer = PrivateKeySigner::random();
        let client = reqwest::Client::new();

        let challenge: PaymentRequired = client
            .get(format!("{proxy}/svc-weather/forecast"))
            .send()
            .await
            .expect("challenge request")
            .json()
            .await
            .expect("challenge body");
        let paid = client
            .get(format!("{proxy}/svc-weather/forecast"))
            .header(PAYMENT_HEADER, answer_challenge(&challenge, &signer))
            .send()
            .await
            .expect("paid");
        let raw = Base64Bytes::from(
            paid.headers()
                .get(SETTLEMENT_HEADER)
                .expect("header")
                .as_bytes(),
        )
        .decode()
        .expect("base64");
        let evidence: SettlementEvidence = serde_json::from_slice(&raw).expect("evidence");

        let unauthorized = client
            .get(format!("{proxy}/admin/ledger/{}", evidence.payment_id))
            .send()
            .await
            .expect("unauthorized");
        assert_eq!(unauthorized.status(), 401);

        let record: serde_json::Value = client
            .get(format!("{proxy}/admin/ledger/{}", evidence.payment_id))
            .bearer_auth(ADMIN_TOKEN)
            .send()
            .await
            .expect("lookup")
            .json()
            .await
            .expect("record");
        assert_eq!(record["status"], "settled");
        assert_eq!(record["resource"], "svc-weather");
        assert_eq!(record["amount"], "1000000");
    }
}
