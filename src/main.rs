//! split-pay service binary.
//!
//! Reads configuration from the environment (and `.env` if present), checks
//! it, and serves the HTTP API.
//!
//! Environment variables:
//! - PRIVATE_KEY: key of the paying account (required)
//! - OWNER_API_KEY: credential callers must send in `x-owner-key`
//! - OWNER_AUTH_MODE: `required` (default) or `open`
//! - COMMISSION_ADDRESS: recipient of the commission leg
//! - COMMISSION_RATE: decimal fraction, default 0.005
//! - IDENTITY_SERVICE_URL: optional identity service
//! - ETHEREUM_RPC_URL, BASE_RPC_URL, POLYGON_RPC_URL, ARBITRUM_RPC_URL
//! - CONFIRMATION_TIMEOUT_SECS (default 60), REQUIRED_CONFIRMATIONS (default 1)
//! - HOST (default 0.0.0.0), PORT (default 3000)

use anyhow::Context;
use split_pay::chain::evm::EvmChainClient;
use split_pay::config::{AuthMode, ServiceConfig};
use split_pay::orchestrator::PaymentOrchestrator;
use split_pay::server;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    if config.owner_credential.is_none() && config.auth_mode == AuthMode::Open {
        tracing::warn!("OWNER_API_KEY is not set and OWNER_AUTH_MODE=open: every request will be accepted");
    }
    if config.commission_address.is_none() {
        tracing::warn!("COMMISSION_ADDRESS is not set: payment requests will fail until it is configured");
    }

    let chain_client = EvmChainClient::from_config(&config).context("failed to build chain client")?;

    tracing::info!(
        signer = ?chain_client.address(),
        commission_rate = config.commission_rate.as_f64(),
        chains = ?config.chains.keys().collect::<Vec<_>>(),
        "Starting split-pay"
    );

    let listen_addr = config.listen_addr.clone();
    let orchestrator = PaymentOrchestrator::new(Arc::new(config), Arc::new(chain_client));

    server::serve(&listen_addr, Arc::new(orchestrator))
        .await
        .context("server error")?;

    Ok(())
}
