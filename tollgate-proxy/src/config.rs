//! Proxy server configuration.
//!
//! Loads configuration from a TOML file with support for environment
//! variable expansion in string values. Variables use `$VAR` or `${VAR}`
//! syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4402
//! network = "eip155:84532"
//! rpc_url = "https://sepolia.base.org"
//! gateway_contract = "0x3333333333333333333333333333333333333333"
//! settlement_signer_key = "$SETTLEMENT_KEY"
//! admin_token = "$ADMIN_TOKEN"
//! settle_mode = "confirm"
//!
//! [payment_domain]
//! name = "USDC"
//! version = "2"
//!
//! [resources.svc-weather]
//! owner = "0x1111111111111111111111111111111111111111"
//! origin_url = "https://api.example.com/v1/weather"
//! price_per_call = 1000000
//! asset = "0x2222222222222222222222222222222222222222"
//! service_type = "api"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` — Path to configuration file (default: `config.toml`)
//! - `HOST` / `PORT` — Override server bind address and port
//! - Secrets referenced by `$VAR` in the config file

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::settle::SettleMode;
use tollgate::catalog::{Resource, StaticCatalog};
use tollgate::proto::SigningDomain;
use tollgate_evm::chain::parse_caip2;

/// Top-level proxy configuration. Loaded once at startup, immutable after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4402`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// CAIP-2 identifier of the settlement network.
    #[serde(default = "default_network")]
    pub network: String,

    /// HTTP RPC endpoint of the settlement chain.
    pub rpc_url: String,

    /// Address of the on-chain payment gateway contract.
    pub gateway_contract: Address,

    /// Private key of the settlement signer (hex). Supports `$VAR` /
    /// `${VAR}` expansion; distinct from any resource owner key.
    pub settlement_signer_key: String,

    /// Bearer token guarding the admin ledger endpoint. When unset the
    /// endpoint is disabled.
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Origins allowed by CORS. Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Whether to hold the request until settlement confirms.
    #[serde(default)]
    pub settle_mode: SettleMode,

    /// Seconds a client has to produce a proof for a challenge.
    #[serde(default = "default_max_timeout_seconds")]
    pub max_timeout_seconds: u64,

    /// EIP-712 domain parameters advertised in payment requirements.
    #[serde(default = "default_payment_domain")]
    pub payment_domain: SigningDomain,

    /// Published resources keyed by service id.
    #[serde(default)]
    pub resources: HashMap<String, ResourceEntry>,
}

/// One published resource in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEntry {
    /// Address of the resource owner (payment recipient).
    pub owner: Address,
    /// Origin URL requests are proxied to after settlement.
    pub origin_url: Url,
    /// Price per call in atomic token units.
    pub price_per_call: u64,
    /// Token asset the price is denominated in.
    pub asset: Address,
    /// Service category (default: `"api"`).
    #[serde(default = "default_service_type")]
    pub service_type: String,
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    4402
}

fn default_network() -> String {
    "eip155:84532".to_owned()
}

fn default_max_timeout_seconds() -> u64 {
    300
}

fn default_payment_domain() -> SigningDomain {
    SigningDomain {
        name: "USDC".to_owned(),
        version: "2".to_owned(),
    }
}

fn default_service_type() -> String {
    "api".to_owned()
}

impl ProxyConfig {
    /// Loads configuration from the path given by the `CONFIG` environment
    /// variable, falling back to `config.toml` in the current directory.
    ///
    /// After loading, all string values with `$VAR` / `${VAR}` references
    /// are expanded from the process environment. `HOST` and `PORT` env
    /// vars override the file values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path)?
        } else {
            String::new()
        };

        let expanded = expand_env_vars(&content);
        let mut config: Self = toml::from_str(&expanded)?;

        if let Ok(host) = std::env::var("HOST") {
            if let Ok(addr) = host.parse() {
                config.host = addr;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }

        Ok(config)
    }

    /// Numeric chain id of the configured network.
    ///
    /// # Errors
    ///
    /// Returns an error when the network is not an `eip155:<id>` identifier.
    pub fn chain_id(&self) -> Result<u64, String> {
        parse_caip2(&self.network)
            .ok_or_else(|| format!("network {} is not an eip155 CAIP-2 identifier", self.network))
    }

    /// Builds the resource catalog from the configured resource table.
    #[must_use]
    pub fn catalog(&self) -> StaticCatalog {
        StaticCatalog::new(self.resources.iter().map(|(id, entry)| Resource {
            id: id.clone(),
            owner: entry.owner,
            origin_url: entry.origin_url.clone(),
            price_per_call: entry.price_per_call,
            asset: entry.asset,
            service_type: entry.service_type.clone(),
        }))
    }
}

/// Expands `$VAR` and `${VAR}` patterns in a string from environment
/// variables. Unresolved variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            let braced = chars.peek() == Some(&'{');
            if braced {
                chars.next();
            }

            let mut var_name = String::new();
            while let Some(&c) = chars.peek() {
                if braced {
                    if c == '}' {
                        chars.next();
                        break;
                    }
                } else if !c.is_ascii_alphanumeric() && c != '_' {
                    break;
                }
                var_name.push(c);
                chars.next();
            }

            if var_name.is_empty() {
                result.push('$');
                if braced {
                    result.push('{');
                }
            } else if let Ok(val) = std::env::var(&var_name) {
                result.push_str(&val);
            } else {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&var_name);
                if braced {
                    result.push('}');
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}
