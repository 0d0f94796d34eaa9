//! Response formatting.
//!
//! Turns a [`PaymentResult`] or a [`PaymentError`] into the JSON documents
//! returned by `/sign-payment`. Display amounts are derived here and only here.

use crate::config::ServiceConfig;
use crate::errors::{ErrorCategory, PaymentError};
use crate::orchestrator::PaymentResult;
use crate::types::{
    ErrorResponse, SignPaymentResponse, SupportedChain, SupportedResponse, SupportedToken,
};
use crate::utils::{explorer_tx_url, format_address, format_tx_hash, now_rfc3339, to_display_amount};
use axum::http::StatusCode;

/// HTTP status for an error category.
pub fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::Validation => StatusCode::BAD_REQUEST,
        ErrorCategory::MissingCredential => StatusCode::UNAUTHORIZED,
        ErrorCategory::Unauthorized => StatusCode::FORBIDDEN,
        ErrorCategory::ConfirmationTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCategory::Configuration
        | ErrorCategory::CommissionFailed
        | ErrorCategory::MerchantFailed
        | ErrorCategory::InsufficientFunds
        | ErrorCategory::Chain => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Builds the success document for a completed payment.
pub fn format_success(result: &PaymentResult, config: &ServiceConfig) -> SignPaymentResponse {
    let request = &result.request;
    let explorer = config.explorer_url(request.chain).unwrap_or_default();
    let decimals = request.decimals;

    SignPaymentResponse {
        success: true,
        tx_hash: format_tx_hash(result.merchant.tx_hash),
        tx_hash_commission: format_tx_hash(result.commission.tx_hash),
        merchant_amount: result.split.merchant_amount.to_string(),
        commission_amount: result.split.commission_amount.to_string(),
        commission_rate: config.commission_rate.as_f64(),
        total_amount: request.total_amount.to_string(),
        total_usd: to_display_amount(request.total_amount, decimals),
        merchant_usd: to_display_amount(result.split.merchant_amount, decimals),
        commission_usd: to_display_amount(result.split.commission_amount, decimals),
        token: request.token,
        chain: request.chain,
        merchant_address: format_address(request.merchant_address),
        commission_address: format_address(result.commission_address),
        block_number: result.merchant.block_number,
        block_number_commission: result.commission.block_number,
        gas_used: result.merchant.gas_used.map(|g| g.to_string()),
        gas_used_commission: result.commission.gas_used.map(|g| g.to_string()),
        explorer_url: explorer_tx_url(explorer, result.merchant.tx_hash),
        explorer_url_commission: explorer_tx_url(explorer, result.commission.tx_hash),
        processed_at: now_rfc3339(),
    }
}

/// Builds the error document and status for a failed payment.
///
/// `explorer_base` is used to link any commission transaction the error has
/// to disclose.
pub fn format_error(err: &PaymentError, explorer_base: Option<&str>) -> (StatusCode, ErrorResponse) {
    let category = err.category();
    let commission = err.confirmed_commission();

    let tx_hash = match err {
        PaymentError::MerchantFailed { tx_hash, .. } => *tx_hash,
        PaymentError::CommissionFailed { tx_hash, .. } => *tx_hash,
        PaymentError::ConfirmationTimeout { tx_hash, .. } => Some(*tx_hash),
        PaymentError::UnexpectedChainError { tx_hash, .. } => *tx_hash,
        _ => None,
    };

    let mut message = err.to_string();
    if matches!(err, PaymentError::MerchantFailed { .. }) {
        message.push_str(
            ". The commission transfer was not reversed; reconcile manually before retrying, \
             a resubmission pays commission again",
        );
    }

    let body = ErrorResponse {
        success: false,
        error: category.as_str().to_string(),
        message,
        tx_hash_commission: commission.map(format_tx_hash),
        explorer_url_commission: commission
            .zip(explorer_base)
            .map(|(hash, base)| explorer_tx_url(base, hash)),
        tx_hash: tx_hash.map(format_tx_hash),
    };

    (status_for(category), body)
}

/// Builds the `/supported` listing from the configuration.
pub fn format_supported(config: &ServiceConfig) -> SupportedResponse {
    let chains = config
        .chains
        .iter()
        .map(|(chain, chain_config)| SupportedChain {
            chain: *chain,
            chain_id: chain.chain_id(),
            explorer: chain_config.explorer_url.clone(),
        })
        .collect();

    let tokens = config
        .tokens
        .iter()
        .map(|(token, token_config)| SupportedToken {
            token: *token,
            decimals: token_config.decimals,
            contracts: token_config
                .contracts
                .iter()
                .filter(|(chain, _)| config.chains.contains_key(*chain))
                .map(|(chain, address)| (*chain, format_address(*address)))
                .collect(),
        })
        .collect();

    SupportedResponse {
        chains,
        tokens,
        commission_rate: config.commission_rate.as_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Chain, CommissionSplit, LegRole, PaymentStage, Token, TransferOutcome,
    };
    use crate::validation::ValidatedRequest;
    use ethers::types::{Address, H256, U256};

    fn config() -> ServiceConfig {
        ServiceConfig::new("0.005".parse().unwrap())
    }

    fn result() -> PaymentResult {
        let config = config();
        PaymentResult {
            request: ValidatedRequest {
                merchant_address: Address::repeat_byte(0x11),
                total_amount: U256::from(15_000_000u64),
                token: Token::Usdc,
                chain: Chain::Base,
                token_contract: config.token_contract(Token::Usdc, Chain::Base).unwrap(),
                decimals: 6,
            },
            split: CommissionSplit {
                commission_amount: U256::from(75_000u64),
                merchant_amount: U256::from(14_925_000u64),
            },
            commission_address: Address::repeat_byte(0xcc),
            commission: TransferOutcome {
                tx_hash: H256::repeat_byte(0xaa),
                block_number: Some(10),
                confirmed: true,
                gas_used: Some(U256::from(45_000u64)),
            },
            merchant: TransferOutcome {
                tx_hash: H256::repeat_byte(0xbb),
                block_number: Some(11),
                confirmed: true,
                gas_used: None,
            },
            stages: vec![PaymentStage::MerchantConfirmed],
        }
    }

    #[test]
    fn test_success_document() {
        let response = format_success(&result(), &config());

        assert!(response.success);
        assert_eq!(response.commission_amount, "75000");
        assert_eq!(response.merchant_amount, "14925000");
        assert_eq!(response.total_amount, "15000000");
        assert_eq!(response.commission_rate, 0.005);
        assert_eq!(response.total_usd, 15.0);
        assert_eq!(response.commission_usd, 0.075);
        assert_eq!(response.merchant_usd, 14.925);
        assert_eq!(response.block_number, Some(11));
        assert_eq!(response.block_number_commission, Some(10));
        assert_eq!(response.gas_used_commission.as_deref(), Some("45000"));
        assert_eq!(
            response.explorer_url,
            format!("https://basescan.org/tx/0x{}", "bb".repeat(32))
        );
        assert_eq!(
            response.tx_hash_commission,
            format!("0x{}", "aa".repeat(32))
        );

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["token"], "USDC");
        assert_eq!(json["chain"], "base");
        assert!(json.get("gas_used").is_none());
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (PaymentError::InvalidAmount("0".into()), StatusCode::BAD_REQUEST),
            (PaymentError::MissingCredential, StatusCode::UNAUTHORIZED),
            (PaymentError::Unauthorized("no".into()), StatusCode::FORBIDDEN),
            (
                PaymentError::MisconfiguredCommission,
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                PaymentError::InsufficientFunds("low".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                PaymentError::ConfirmationTimeout {
                    leg: LegRole::Commission,
                    tx_hash: H256::zero(),
                    commission_tx_hash: None,
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(format_error(&err, None).0, status, "{:?}", err);
        }
    }

    #[test]
    fn test_merchant_failure_document() {
        let err = PaymentError::MerchantFailed {
            reason: "merchant transfer reverted on-chain".into(),
            commission_tx_hash: H256::repeat_byte(0xaa),
            tx_hash: Some(H256::repeat_byte(0xbb)),
        };
        let (status, body) = format_error(&err, Some("https://basescan.org"));

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "merchant_failed");
        assert_eq!(
            body.tx_hash_commission,
            Some(format!("0x{}", "aa".repeat(32)))
        );
        assert_eq!(
            body.explorer_url_commission,
            Some(format!("https://basescan.org/tx/0x{}", "aa".repeat(32)))
        );
        assert_eq!(body.tx_hash, Some(format!("0x{}", "bb".repeat(32))));
        assert!(body.message.contains("reconcile"));
    }

    #[test]
    fn test_unconfirmed_commission_hash_is_reported() {
        let err = PaymentError::UnexpectedChainError {
            reason: "while confirming commission: Network error: connection reset".into(),
            tx_hash: Some(H256::repeat_byte(0xab)),
        };
        let (status, body) = format_error(&err, Some("https://basescan.org"));

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "chain_error");
        assert_eq!(body.tx_hash, Some(format!("0x{}", "ab".repeat(32))));
        assert!(body.tx_hash_commission.is_none());

        let dropped = PaymentError::CommissionFailed {
            reason: "dropped".into(),
            tx_hash: Some(H256::repeat_byte(0xab)),
        };
        let (_, body) = format_error(&dropped, None);
        assert_eq!(body.tx_hash, Some(format!("0x{}", "ab".repeat(32))));
    }

    #[test]
    fn test_validation_error_document() {
        let (status, body) = format_error(&PaymentError::MissingFields(vec!["chain"]), None);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "validation_error");
        assert_eq!(body.message, "Missing required fields: chain");
        assert!(body.tx_hash_commission.is_none());
    }

    #[test]
    fn test_supported_listing() {
        let listing = format_supported(&config().without_chain(Chain::Ethereum));
        assert_eq!(listing.chains.len(), 3);
        assert_eq!(listing.commission_rate, 0.005);

        let usdt = listing
            .tokens
            .iter()
            .find(|t| t.token == Token::Usdt)
            .unwrap();
        // Ethereum disabled, Base never deployed
        assert_eq!(usdt.contracts.len(), 2);
        assert!(usdt.contracts.iter().all(|(c, _)| *c != Chain::Base));
    }
}
