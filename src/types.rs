//! Core type definitions for split payments.
//!
//! This module contains the wire types of the `/sign-payment` endpoint and the
//! internal types that flow between validation, splitting and settlement.

use crate::errors::PaymentError;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Header carrying the owner credential on incoming requests.
pub const OWNER_KEY_HEADER: &str = "x-owner-key";

/// Chains the service knows how to settle on.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Ethereum mainnet
    Ethereum,
    /// Base mainnet
    Base,
    /// Polygon PoS mainnet
    Polygon,
    /// Arbitrum One
    Arbitrum,
}

impl Chain {
    /// Every known chain, in display order.
    pub const ALL: [Chain; 4] = [Chain::Ethereum, Chain::Base, Chain::Polygon, Chain::Arbitrum];

    /// Wire name of the chain.
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Base => "base",
            Chain::Polygon => "polygon",
            Chain::Arbitrum => "arbitrum",
        }
    }

    /// EIP-155 chain id.
    pub fn chain_id(&self) -> u64 {
        match self {
            Chain::Ethereum => 1,
            Chain::Base => 8453,
            Chain::Polygon => 137,
            Chain::Arbitrum => 42161,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ethereum" => Ok(Chain::Ethereum),
            "base" => Ok(Chain::Base),
            "polygon" => Ok(Chain::Polygon),
            "arbitrum" => Ok(Chain::Arbitrum),
            _ => Err(PaymentError::UnsupportedChain(s.to_string())),
        }
    }
}

/// Stablecoins accepted for payment.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Token {
    /// USD Coin
    Usdc,
    /// Tether USD
    Usdt,
    /// Dai Stablecoin
    Dai,
}

impl Token {
    /// Every known token, in display order.
    pub const ALL: [Token; 3] = [Token::Usdc, Token::Usdt, Token::Dai];

    /// Ticker symbol of the token.
    pub fn symbol(&self) -> &'static str {
        match self {
            Token::Usdc => "USDC",
            Token::Usdt => "USDT",
            Token::Dai => "DAI",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Token {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USDC" => Ok(Token::Usdc),
            "USDT" => Ok(Token::Usdt),
            "DAI" => Ok(Token::Dai),
            _ => Err(PaymentError::UnsupportedToken(s.to_string())),
        }
    }
}

/// Body of a `POST /sign-payment` request.
///
/// Every field is optional on the wire so that missing fields can be reported
/// together, by name, instead of failing deserialization.
///
/// # Examples
///
/// ```
/// use split_pay::types::PaymentRequest;
///
/// let request: PaymentRequest = serde_json::from_str(r#"{
///     "merchant_address": "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb",
///     "total_amount": "15000000",
///     "token": "USDC",
///     "chain": "base"
/// }"#).unwrap();
/// assert_eq!(request.total_amount.as_deref(), Some("15000000"));
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PaymentRequest {
    /// Address that receives the merchant leg
    #[serde(default)]
    pub merchant_address: Option<String>,

    /// Total amount in atomic token units, as a decimal string
    #[serde(default)]
    pub total_amount: Option<String>,

    /// Token symbol (USDC, USDT, DAI)
    #[serde(default)]
    pub token: Option<String>,

    /// Chain name (ethereum, base, polygon, arbitrum)
    #[serde(default)]
    pub chain: Option<String>,
}

/// Server-computed division of a total into commission and merchant amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionSplit {
    /// Amount paid to the commission address
    pub commission_amount: U256,
    /// Amount paid to the merchant
    pub merchant_amount: U256,
}

impl CommissionSplit {
    /// Sum of both legs. Always equal to the total that was split.
    pub fn total(&self) -> U256 {
        self.commission_amount + self.merchant_amount
    }
}

/// Which side of the split a transfer pays.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LegRole {
    /// Operator fee
    Commission,
    /// Merchant remainder
    Merchant,
}

impl fmt::Display for LegRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegRole::Commission => f.write_str("commission"),
            LegRole::Merchant => f.write_str("merchant"),
        }
    }
}

/// One of the two transfers composing a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLeg {
    recipient: Address,
    amount: U256,
    role: LegRole,
}

impl TransferLeg {
    /// Creates a leg paying `amount` atomic units to `recipient`.
    pub fn new(recipient: Address, amount: U256, role: LegRole) -> Self {
        Self {
            recipient,
            amount,
            role,
        }
    }

    /// Recipient of the transfer.
    pub fn recipient(&self) -> Address {
        self.recipient
    }

    /// Amount in atomic units.
    pub fn amount(&self) -> U256 {
        self.amount
    }

    /// Side of the split this leg pays.
    pub fn role(&self) -> LegRole {
        self.role
    }
}

/// Handle to a submitted transfer that has not been confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransfer {
    /// Transaction hash assigned at submission
    pub tx_hash: H256,
    /// Leg the transaction pays
    pub role: LegRole,
}

/// Final state of a mined transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Transaction hash
    pub tx_hash: H256,
    /// Block the transaction was included in
    pub block_number: Option<u64>,
    /// Whether the receipt reports success
    pub confirmed: bool,
    /// Gas consumed by the transaction
    pub gas_used: Option<U256>,
}

/// Stages of a payment run.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStage {
    /// Checking the owner credential
    Authorizing,
    /// Checking the request body
    Validating,
    /// Computing the commission split
    Splitting,
    /// Commission leg submitted, awaiting confirmation
    CommissionPending,
    /// Commission leg confirmed on-chain
    CommissionConfirmed,
    /// Merchant leg submitted, awaiting confirmation
    MerchantPending,
    /// Merchant leg confirmed on-chain; the payment is complete
    MerchantConfirmed,
    /// The run stopped with an error
    Failed,
}

/// Successful response of `POST /sign-payment`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SignPaymentResponse {
    /// Always `true`
    pub success: bool,

    /// Merchant leg transaction hash
    pub tx_hash: String,

    /// Commission leg transaction hash
    pub tx_hash_commission: String,

    /// Merchant amount in atomic units
    pub merchant_amount: String,

    /// Commission amount in atomic units
    pub commission_amount: String,

    /// Commission rate applied
    pub commission_rate: f64,

    /// Total amount in atomic units
    pub total_amount: String,

    /// Total in USD, display only
    pub total_usd: f64,

    /// Merchant amount in USD, display only
    pub merchant_usd: f64,

    /// Commission amount in USD, display only
    pub commission_usd: f64,

    /// Token paid
    pub token: Token,

    /// Chain settled on
    pub chain: Chain,

    /// Merchant recipient
    pub merchant_address: String,

    /// Commission recipient
    pub commission_address: String,

    /// Block of the merchant leg
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,

    /// Block of the commission leg
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number_commission: Option<u64>,

    /// Gas used by the merchant leg
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<String>,

    /// Gas used by the commission leg
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used_commission: Option<String>,

    /// Explorer link for the merchant leg
    pub explorer_url: String,

    /// Explorer link for the commission leg
    pub explorer_url_commission: String,

    /// RFC 3339 time the response was produced
    pub processed_at: String,
}

/// Error body returned by every endpoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,

    /// Error category (e.g. `validation_error`)
    pub error: String,

    /// Human-readable description
    pub message: String,

    /// Commission transaction already confirmed, for manual reconciliation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash_commission: Option<String>,

    /// Explorer link for the confirmed commission transaction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url_commission: Option<String>,

    /// Transaction hash of the leg that failed or timed out, if it was submitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

/// One chain entry of the `/supported` listing.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SupportedChain {
    /// Chain name
    pub chain: Chain,
    /// EIP-155 chain id
    pub chain_id: u64,
    /// Block explorer base URL
    pub explorer: String,
}

/// One token entry of the `/supported` listing.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SupportedToken {
    /// Token symbol
    pub token: Token,
    /// Decimal places
    pub decimals: u8,
    /// Contract address per chain the token is deployed on
    pub contracts: Vec<(Chain, String)>,
}

/// Response from the `/supported` endpoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SupportedResponse {
    /// Chains with a configured RPC endpoint
    pub chains: Vec<SupportedChain>,
    /// Tokens and their deployments
    pub tokens: Vec<SupportedToken>,
    /// Commission rate applied to every payment
    pub commission_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_parsing() {
        assert_eq!("base".parse::<Chain>().unwrap(), Chain::Base);
        assert_eq!("Arbitrum".parse::<Chain>().unwrap(), Chain::Arbitrum);
        assert!(matches!(
            "solana".parse::<Chain>(),
            Err(PaymentError::UnsupportedChain(name)) if name == "solana"
        ));
    }

    #[test]
    fn test_token_parsing() {
        assert_eq!("usdc".parse::<Token>().unwrap(), Token::Usdc);
        assert_eq!("DAI".parse::<Token>().unwrap(), Token::Dai);
        assert!(matches!(
            "WETH".parse::<Token>(),
            Err(PaymentError::UnsupportedToken(_))
        ));
    }

    #[test]
    fn test_request_with_missing_fields_deserializes() {
        let request: PaymentRequest = serde_json::from_str(r#"{"token": "USDC"}"#).unwrap();
        assert_eq!(request.token.as_deref(), Some("USDC"));
        assert!(request.merchant_address.is_none());
        assert!(request.chain.is_none());
    }

    #[test]
    fn test_split_total() {
        let split = CommissionSplit {
            commission_amount: U256::from(75_000u64),
            merchant_amount: U256::from(14_925_000u64),
        };
        assert_eq!(split.total(), U256::from(15_000_000u64));
    }

    #[test]
    fn test_error_response_skips_empty_fields() {
        let body = ErrorResponse {
            success: false,
            error: "validation_error".to_string(),
            message: "Invalid amount: 0".to_string(),
            tx_hash_commission: None,
            explorer_url_commission: None,
            tx_hash: None,
        };

        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("tx_hash_commission"));
        assert!(json.contains("validation_error"));
    }
}
