//! Builds 402 Payment Required challenges.
//!
//! A challenge is a pure function of the resolved resource and the static
//! configuration; nothing is recorded when one is issued. The ledger only
//! learns about a payment once a proof arrives and verifies.

use tollgate::catalog::{Resource, display_name_or_default};
use tollgate::proto::{PaymentRequired, PaymentRequirements, X402_VERSION};

use crate::config::ProxyConfig;

const DEFAULT_MIME_TYPE: &str = "application/json";

/// Payment terms for one resource under the configured network and domain.
#[must_use]
pub fn requirements_for(resource: &Resource, config: &ProxyConfig) -> PaymentRequirements {
    PaymentRequirements {
        scheme: "exact".to_owned(),
        network: config.network.clone(),
        max_amount_required: resource.price_per_call.into(),
        resource: resource.id.clone(),
        description: display_name_or_default(resource.origin_url.as_str(), &resource.id),
        mime_type: DEFAULT_MIME_TYPE.to_owned(),
        pay_to: resource.owner,
        max_timeout_seconds: config.max_timeout_seconds,
        asset: resource.asset,
        extra: config.payment_domain.clone(),
    }
}

/// Builds the full 402 response body for a resource.
#[must_use]
pub fn build_challenge(
    resource: &Resource,
    config: &ProxyConfig,
    error: impl Into<String>,
) -> PaymentRequired {
    PaymentRequired {
        x402_version: X402_VERSION,
        error: error.into(),
        accepts: vec![requirements_for(resource, config)],
        gateway_contract: config.gateway_contract,
        service_id: resource.id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use url::Url;

    fn config() -> ProxyConfig {
        toml::from_str(
            r#"
            rpc_url = "https://sepolia.base.org"
            gateway_contract = "0x3333333333333333333333333333333333333333"
            settlement_signer_key = "0xdeadbeef"
            "#,
        )
        .expect("config")
    }

    fn resource() -> Resource {
        Resource {
            id: "svc-weather".to_owned(),
            owner: address!("0x1111111111111111111111111111111111111111"),
            origin_url: Url::parse("https://api.example.com/v1/weather").expect("url"),
            price_per_call: 1_000_000,
            asset: address!("0x2222222222222222222222222222222222222222"),
            service_type: "api".to_owned(),
        }
    }

    #[test]
    fn challenge_covers_the_resource_price() {
        let challenge = build_challenge(&resource(), &config(), "payment required");
        assert_eq!(challenge.x402_version, 1);
        assert_eq!(challenge.service_id, "svc-weather");
        assert_eq!(challenge.accepts.len(), 1);

        let terms = &challenge.accepts[0];
        assert!(terms.max_amount_required.inner() >= resource().price_per_call);
        assert_eq!(terms.pay_to, resource().owner);
        assert_eq!(terms.network, "eip155:84532");
        assert_eq!(terms.description, "weather");
    }

    #[test]
    fn challenge_carries_the_signing_domain() {
        let challenge = build_challenge(&resource(), &config(), "payment required");
        let extra = &challenge.accepts[0].extra;
        assert_eq!(extra.name, "USDC");
        assert_eq!(extra.version, "2");
    }
}
