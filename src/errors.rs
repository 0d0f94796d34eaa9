//! Error types for the split-pay service.
//!
//! [`PaymentError`] is the client-visible taxonomy of a payment run. The
//! collaborator errors ([`ChainError`], [`IdentityError`]) and startup
//! [`ConfigError`] are folded into it, or reported at boot, respectively.

use crate::types::{Chain, LegRole, Token};
use ethers::types::H256;
use thiserror::Error;

/// Everything that can go wrong while handling a single payment request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// One or more required request fields were absent or blank
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    /// Chain is not present in the configured chain table
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    /// Token is not present in the configured token table
    #[error("Unsupported token: {0}")]
    UnsupportedToken(String),

    /// Token exists but has no contract deployed on the requested chain
    #[error("Token {token} is not available on {chain}")]
    TokenNotOnChain {
        /// Requested token
        token: Token,
        /// Requested chain
        chain: Chain,
    },

    /// Total amount is not a positive decimal integer
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Merchant address is not a usable EVM address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// No owner credential header on the request
    #[error("Missing owner credential")]
    MissingCredential,

    /// Credential did not match, or the identity service refused it
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The service is not configured to accept requests
    #[error("Configuration error: {0}")]
    Misconfigured(String),

    /// No commission recipient address is configured
    #[error("Commission address is not configured")]
    MisconfiguredCommission,

    /// The commission leg was rejected or reverted; nothing was paid to the merchant
    #[error("Commission transfer failed: {reason}")]
    CommissionFailed {
        /// Failure description from the chain client or receipt
        reason: String,
        /// Hash of the reverted commission transaction, if it was mined
        tx_hash: Option<H256>,
    },

    /// The commission leg confirmed but the merchant leg did not
    #[error("Merchant transfer failed after commission {commission_tx_hash:?} confirmed: {reason}")]
    MerchantFailed {
        /// Failure description from the chain client or receipt
        reason: String,
        /// Hash of the already-confirmed commission transaction
        commission_tx_hash: H256,
        /// Hash of the failed merchant transaction, if it was mined
        tx_hash: Option<H256>,
    },

    /// A leg was submitted but did not confirm within the configured bound
    #[error("Timed out waiting for {leg} transfer {tx_hash:?} to confirm")]
    ConfirmationTimeout {
        /// Leg that timed out
        leg: LegRole,
        /// Hash of the outstanding transaction
        tx_hash: H256,
        /// Commission hash when the merchant leg is the one outstanding
        commission_tx_hash: Option<H256>,
    },

    /// The signing account cannot cover the payment
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Any other chain client failure; the outcome of `tx_hash`, if set, is unknown
    #[error("Chain error: {reason}")]
    UnexpectedChainError {
        /// Failure description from the chain client
        reason: String,
        /// Transaction that was already broadcast when the failure happened
        tx_hash: Option<H256>,
    },
}

/// Result type alias for payment operations.
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Client-facing error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Request body failed validation
    Validation,
    /// Credential header absent
    MissingCredential,
    /// Credential rejected
    Unauthorized,
    /// Service misconfigured
    Configuration,
    /// Commission leg failed
    CommissionFailed,
    /// Merchant leg failed after commission confirmed
    MerchantFailed,
    /// Confirmation did not arrive in time
    ConfirmationTimeout,
    /// Signing account underfunded
    InsufficientFunds,
    /// Other chain failure
    Chain,
}

impl ErrorCategory {
    /// Wire name of the category, used as the `error` field of error responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation_error",
            ErrorCategory::MissingCredential => "missing_credential",
            ErrorCategory::Unauthorized => "unauthorized",
            ErrorCategory::Configuration => "configuration_error",
            ErrorCategory::CommissionFailed => "commission_failed",
            ErrorCategory::MerchantFailed => "merchant_failed",
            ErrorCategory::ConfirmationTimeout => "confirmation_timeout",
            ErrorCategory::InsufficientFunds => "insufficient_funds",
            ErrorCategory::Chain => "chain_error",
        }
    }
}

impl PaymentError {
    /// Maps the error to its client-facing category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            PaymentError::MissingFields(_)
            | PaymentError::UnsupportedChain(_)
            | PaymentError::UnsupportedToken(_)
            | PaymentError::TokenNotOnChain { .. }
            | PaymentError::InvalidAmount(_)
            | PaymentError::InvalidAddress(_) => ErrorCategory::Validation,
            PaymentError::MissingCredential => ErrorCategory::MissingCredential,
            PaymentError::Unauthorized(_) => ErrorCategory::Unauthorized,
            PaymentError::Misconfigured(_) | PaymentError::MisconfiguredCommission => {
                ErrorCategory::Configuration
            }
            PaymentError::CommissionFailed { .. } => ErrorCategory::CommissionFailed,
            PaymentError::MerchantFailed { .. } => ErrorCategory::MerchantFailed,
            PaymentError::ConfirmationTimeout { .. } => ErrorCategory::ConfirmationTimeout,
            PaymentError::InsufficientFunds(_) => ErrorCategory::InsufficientFunds,
            PaymentError::UnexpectedChainError { .. } => ErrorCategory::Chain,
        }
    }

    /// Commission transaction that already confirmed, when the error has to disclose it.
    pub fn confirmed_commission(&self) -> Option<H256> {
        match self {
            PaymentError::MerchantFailed {
                commission_tx_hash, ..
            } => Some(*commission_tx_hash),
            PaymentError::ConfirmationTimeout {
                commission_tx_hash, ..
            } => *commission_tx_hash,
            _ => None,
        }
    }
}

/// Errors surfaced by a [`ChainClient`](crate::chain::ChainClient).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The client holds no provider for this chain
    #[error("No provider configured for {0}")]
    NoProvider(Chain),

    /// The node refused the transaction
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// The signer cannot pay for the transfer or its gas
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Transport or RPC failure
    #[error("Network error: {0}")]
    Network(String),

    /// Transaction disappeared from the mempool before being mined
    #[error("Transaction {0:?} was dropped before confirmation")]
    Dropped(H256),

    /// Confirmation did not arrive in time
    #[error("Timed out waiting for confirmation")]
    Timeout,
}

impl ChainError {
    /// Classifies a raw node or contract error message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        if lowered.contains("insufficient funds") || lowered.contains("exceeds balance") {
            ChainError::InsufficientFunds(message)
        } else {
            ChainError::Rejected(message)
        }
    }
}

impl From<ethers::providers::ProviderError> for ChainError {
    fn from(err: ethers::providers::ProviderError) -> Self {
        ChainError::Network(err.to_string())
    }
}

/// Errors surfaced by an [`IdentityVerifier`](crate::auth::IdentityVerifier).
#[derive(Error, Debug)]
pub enum IdentityError {
    /// The identity service answered but refused the credential
    #[error("Identity service rejected credential with status {0}")]
    Rejected(u16),

    /// The identity service could not be reached
    #[error("Identity service unavailable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Errors raised while loading or validating configuration at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required variable is absent
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// A variable is present but malformed
    #[error("Invalid value for {key}: {reason}")]
    Invalid {
        /// Setting name
        key: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Error parsing a URL setting
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PaymentError::MissingFields(vec!["merchant_address", "chain"]);
        assert_eq!(
            err.to_string(),
            "Missing required fields: merchant_address, chain"
        );

        let err = PaymentError::TokenNotOnChain {
            token: Token::Usdt,
            chain: Chain::Base,
        };
        assert_eq!(err.to_string(), "Token USDT is not available on base");
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            PaymentError::InvalidAmount("0".into()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            PaymentError::MissingCredential.category().as_str(),
            "missing_credential"
        );
        assert_eq!(
            PaymentError::MisconfiguredCommission.category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            PaymentError::UnexpectedChainError {
                reason: "boom".into(),
                tx_hash: None,
            }
            .category()
            .as_str(),
            "chain_error"
        );
    }

    #[test]
    fn test_confirmed_commission_disclosure() {
        let commission = H256::repeat_byte(0xaa);
        let err = PaymentError::MerchantFailed {
            reason: "reverted".into(),
            commission_tx_hash: commission,
            tx_hash: None,
        };
        assert_eq!(err.confirmed_commission(), Some(commission));

        let err = PaymentError::ConfirmationTimeout {
            leg: LegRole::Commission,
            tx_hash: commission,
            commission_tx_hash: None,
        };
        assert_eq!(err.confirmed_commission(), None);

        let err = PaymentError::CommissionFailed {
            reason: "reverted".into(),
            tx_hash: Some(commission),
        };
        assert_eq!(err.confirmed_commission(), None);
    }

    #[test]
    fn test_chain_error_classification() {
        assert!(matches!(
            ChainError::from_message("insufficient funds for gas * price + value"),
            ChainError::InsufficientFunds(_)
        ));
        assert!(matches!(
            ChainError::from_message("execution reverted: ERC20: transfer amount exceeds balance"),
            ChainError::InsufficientFunds(_)
        ));
        assert!(matches!(
            ChainError::from_message("nonce too low"),
            ChainError::Rejected(_)
        ));
    }
}
