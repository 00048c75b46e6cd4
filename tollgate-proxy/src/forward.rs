//! Forwards settled requests to the resource origin.
//!
//! The forwarder relays method, headers, and body to the origin, streams
//! the origin's response back, and attaches the settlement evidence header.
//! Payment headers never reach the origin; hop-by-hop headers never reach
//! the client. Origin failures after settlement are passed through as a
//! 502 without reversing the payment.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::response::Response;
use url::Url;

use tollgate::proto::{PAYMENT_HEADER, SETTLEMENT_HEADER, SettlementEvidence};

/// Errors forwarding to the origin.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The origin could not be reached or did not answer.
    #[error("origin unavailable: {0}")]
    OriginUnavailable(String),
    /// The proxied response could not be assembled.
    #[error("invalid origin response: {0}")]
    InvalidResponse(String),
}

/// Reverse-proxy client for resource origins.
#[derive(Debug, Clone, Default)]
pub struct Forwarder {
    client: reqwest::Client,
}

impl Forwarder {
    /// Creates a forwarder with a fresh connection pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Relays one request to `origin` (plus optional sub-path and query)
    /// and returns the origin's response with evidence attached.
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError::OriginUnavailable`] when the origin cannot
    /// be reached.
    pub async fn forward(
        &self,
        origin: &Url,
        rest: Option<&str>,
        query: Option<&str>,
        method: Method,
        headers: &HeaderMap,
        body: axum::body::Bytes,
        evidence: &SettlementEvidence,
    ) -> Result<Response, ForwardError> {
        let target = join_origin(origin, rest, query)?;

        let mut request = self
            .client
            .request(method, target)
            .headers(strip_request_headers(headers));
        if !body.is_empty() {
            request = request.body(body);
        }

        let upstream = request
            .send()
            .await
            .map_err(|e| ForwardError::OriginUnavailable(e.to_string()))?;

        let status = upstream.status();
        let mut response = Response::builder().status(status);
        if let Some(response_headers) = response.headers_mut() {
            copy_response_headers(upstream.headers(), response_headers);
            let header = evidence
                .to_header()
                .map_err(|e| ForwardError::InvalidResponse(e.to_string()))?;
            let value = HeaderValue::from_bytes(header.as_ref())
                .map_err(|e| ForwardError::InvalidResponse(e.to_string()))?;
            response_headers.insert(SETTLEMENT_HEADER, value);
        }

        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| ForwardError::InvalidResponse(e.to_string()))
    }
}

fn join_origin(origin: &Url, rest: Option<&str>, query: Option<&str>) -> Result<Url, ForwardError> {
    let mut target = origin.clone();
    if let Some(rest) = rest.filter(|r| !r.is_empty()) {
        let joined = format!("{}/{}", target.path().trim_end_matches('/'), rest);
        target.set_path(&joined);
    }
    // The origin URL may carry its own query (API keys and the like); the
    // request's query is appended to it, never replaces it.
    let combined = match (
        origin.query().filter(|q| !q.is_empty()),
        query.filter(|q| !q.is_empty()),
    ) {
        (Some(base), Some(request)) => Some(format!("{base}&{request}")),
        (Some(base), None) => Some(base.to_owned()),
        (None, Some(request)) => Some(request.to_owned()),
        (None, None) => None,
    };
    target.set_query(combined.as_deref());
    // reqwest rejects non-http schemes itself; nothing else can fail here.
    if target.cannot_be_a_base() {
        return Err(ForwardError::InvalidResponse(format!(
            "origin {origin} cannot be a base URL"
        )));
    }
    Ok(target)
}

/// Drops the payment header and connection-scoped headers before relaying.
fn strip_request_headers(headers: &HeaderMap) -> HeaderMap {
    let payment_header = PAYMENT_HEADER.to_lowercase();
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let skip = name.as_str() == payment_header
            || *name == http::header::HOST
            || *name == http::header::CONTENT_LENGTH
            || *name == http::header::CONNECTION;
        if !skip {
            // append, not insert: repeated names (Cookie, Accept) keep every
            // value.
            out.append(name.clone(), value.clone());
        }
    }
    out
}

fn copy_response_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        let skip = *name == http::header::TRANSFER_ENCODING || *name == http::header::CONNECTION;
        if !skip {
            // Multi-valued headers like Set-Cookie must all reach the client.
            to.append(name.clone(), value.clone());
        }
    }
}
