//! Tollgate payment gateway proxy server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p tollgate-proxy --release
//!
//! # Run with custom config path
//! CONFIG=/path/to/config.toml cargo run -p tollgate-proxy
//!
//! # Configure logging level
//! RUST_LOG=info cargo run -p tollgate-proxy
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` — Path to TOML configuration file (default: `config.toml`)
//! - `HOST` / `PORT` — Override bind address and port
//! - `RUST_LOG` — Log level filter (default: `info`)
//! - Secrets referenced by `$VAR` in the config file (settlement signer
//!   key, admin token)

use std::net::SocketAddr;
use std::sync::Arc;

use alloy_network::EthereumWallet;
use alloy_provider::ProviderBuilder;
use alloy_signer_local::PrivateKeySigner;
use tracing_subscriber::EnvFilter;
use url::Url;

use tollgate::ledger::{InMemoryLedger, Ledger};
use tollgate_evm::gateway::{GatewayConfig, OnchainGateway};
use tollgate_proxy::config::ProxyConfig;
use tollgate_proxy::forward::Forwarder;
use tollgate_proxy::handlers::{AppState, proxy_router};
use tollgate_proxy::settle::SettlementExecutor;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Proxy failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(ProxyConfig::load()?);
    tracing::info!(
        host = %config.host,
        port = config.port,
        network = %config.network,
        resources = config.resources.len(),
        "Loaded configuration"
    );

    if config.resources.is_empty() {
        tracing::warn!("No resources configured — every request will be a 404");
    }

    let chain_id = config.chain_id()?;
    let signer: PrivateKeySigner = config
        .settlement_signer_key
        .trim()
        .parse()
        .map_err(|e| format!("Invalid settlement signer key: {e}"))?;
    tracing::info!(signer = %signer.address(), chain_id, "Settlement signer ready");

    let rpc_url: Url = config
        .rpc_url
        .parse()
        .map_err(|e| format!("Invalid RPC URL: {e}"))?;
    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(signer))
        .connect_http(rpc_url);
    let gateway = OnchainGateway::new(provider, config.gateway_contract, GatewayConfig::default());

    let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new());
    let executor = SettlementExecutor::new(
        Arc::new(gateway),
        Arc::clone(&ledger),
        config.settle_mode,
        config.network.clone(),
    );

    let state = Arc::new(AppState {
        catalog: config.catalog(),
        chain_id,
        ledger,
        executor,
        forwarder: Forwarder::new(),
        config: Arc::clone(&config),
    });

    let app = proxy_router(state);
    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Tollgate proxy listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Proxy shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
