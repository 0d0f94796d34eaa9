//! Request validation.
//!
//! Turns a loosely-typed [`PaymentRequest`] into a [`ValidatedRequest`] or the
//! first policy violation found. Checks run in a fixed order and never touch
//! the network.

use crate::config::ServiceConfig;
use crate::errors::{PaymentError, Result};
use crate::types::{Chain, PaymentRequest, Token};
use crate::utils::{parse_address, parse_atomic_amount};
use ethers::types::{Address, U256};

/// A payment request that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    /// Merchant recipient
    pub merchant_address: Address,
    /// Total in atomic units, strictly positive
    pub total_amount: U256,
    /// Token to pay in
    pub token: Token,
    /// Chain to settle on
    pub chain: Chain,
    /// Token contract on `chain`
    pub token_contract: Address,
    /// Token decimal places
    pub decimals: u8,
}

/// Validates `request` against the configured chain and token tables.
///
/// Order: field presence, chain, token, token-on-chain, amount, merchant address.
pub fn validate(request: &PaymentRequest, config: &ServiceConfig) -> Result<ValidatedRequest> {
    let fields = [
        ("merchant_address", request.merchant_address.as_deref()),
        ("total_amount", request.total_amount.as_deref()),
        ("token", request.token.as_deref()),
        ("chain", request.chain.as_deref()),
    ];
    let missing: Vec<&'static str> = fields
        .iter()
        .filter(|(_, value)| value.map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(PaymentError::MissingFields(missing));
    }

    // Presence was checked above.
    let merchant_address = request.merchant_address.as_deref().unwrap_or_default();
    let total_amount = request.total_amount.as_deref().unwrap_or_default();
    let token = request.token.as_deref().unwrap_or_default();
    let chain = request.chain.as_deref().unwrap_or_default();

    let chain: Chain = chain.parse()?;
    if !config.chains.contains_key(&chain) {
        return Err(PaymentError::UnsupportedChain(chain.to_string()));
    }

    let token: Token = token.parse()?;
    let decimals = config
        .token_decimals(token)
        .ok_or_else(|| PaymentError::UnsupportedToken(token.to_string()))?;

    let token_contract = config
        .token_contract(token, chain)
        .ok_or(PaymentError::TokenNotOnChain { token, chain })?;

    let total_amount = parse_atomic_amount(total_amount.trim())?;

    let merchant_address = parse_address(merchant_address)?;
    if merchant_address.is_zero() {
        return Err(PaymentError::InvalidAddress(
            "merchant address cannot be the zero address".to_string(),
        ));
    }

    Ok(ValidatedRequest {
        merchant_address,
        total_amount,
        token,
        chain,
        token_contract,
        decimals,
    })
}
