//! # split-pay
//!
//! An HTTP service that takes a single stablecoin payment request, splits it
//! into an operator commission and a merchant remainder, and settles both as
//! ERC20 transfers from a pre-configured account.
//!
//! ## Flow
//!
//! 1. **Authorize**: the `x-owner-key` header must match the configured owner
//!    credential (and, optionally, be accepted by an identity service)
//! 2. **Validate**: fields, chain, token and token deployment are checked with
//!    no network access
//! 3. **Split**: `commission = floor(total * rate)`, the merchant gets the rest
//! 4. **Commission leg**: submitted and confirmed on-chain first
//! 5. **Merchant leg**: submitted only after the commission leg confirmed
//! 6. **Respond**: both transaction hashes, amounts and explorer links
//!
//! ## Example
//!
//! ```rust,no_run
//! use split_pay::chain::evm::EvmChainClient;
//! use split_pay::config::ServiceConfig;
//! use split_pay::orchestrator::PaymentOrchestrator;
//! use split_pay::types::PaymentRequest;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceConfig::new("0.005".parse()?)
//!     .with_owner_credential("owner-secret")
//!     .with_commission_address("0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb".parse()?)
//!     .with_signer_key("0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80");
//! let chain = EvmChainClient::from_config(&config)?;
//! let orchestrator = PaymentOrchestrator::new(Arc::new(config), Arc::new(chain));
//!
//! let request = PaymentRequest {
//!     merchant_address: Some("0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string()),
//!     total_amount: Some("15000000".to_string()),
//!     token: Some("USDC".to_string()),
//!     chain: Some("base".to_string()),
//! };
//! let result = orchestrator.execute(Some("owner-secret"), &request).await?;
//! println!("merchant tx: {:?}", result.merchant.tx_hash);
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure semantics
//!
//! - Validation and authorization failures happen before any network call
//! - A reverted commission leg stops the run; the merchant is never paid
//! - A failed merchant leg is reported with the already-confirmed commission
//!   transaction; nothing is reversed automatically and resubmitting pays the
//!   commission again
//! - A confirmation timeout is reported separately from a failure; the
//!   transaction may still be mined later

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod auth;
pub mod chain;
pub mod config;
pub mod errors;
pub mod orchestrator;
pub mod response;
pub mod server;
pub mod split;
pub mod types;
pub mod utils;
pub mod validation;

// Re-export commonly used items
pub use config::ServiceConfig;
pub use errors::{PaymentError, Result};
pub use orchestrator::{PaymentOrchestrator, PaymentResult};
pub use types::{
    Chain, CommissionSplit, LegRole, PaymentRequest, SignPaymentResponse, Token, TransferLeg,
    TransferOutcome,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_accessibility() {
        let config = ServiceConfig::new("0.005".parse().unwrap());
        let _ = split::split(1u64.into(), &config.commission_rate);
        let _ = validation::validate(&PaymentRequest::default(), &config);
        let _ = auth::OwnerAuthorizer::new(None, config.auth_mode);
        let _ = response::format_supported(&config);
    }
}
