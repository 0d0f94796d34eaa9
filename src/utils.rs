//! Utility functions shared by validation, settlement and response formatting.

use crate::errors::{PaymentError, Result};
use ethers::types::{Address, H256, U256};
use ethers::utils::format_units;
use sha3::{Digest, Keccak256};
use std::str::FromStr;

/// Parses a strictly positive decimal integer amount in atomic units.
///
/// Signs, whitespace, decimal points and hex are all rejected; the value has
/// to fit in a uint256.
///
/// # Examples
///
/// ```
/// use split_pay::utils::parse_atomic_amount;
/// use ethers::types::U256;
///
/// assert_eq!(parse_atomic_amount("15000000").unwrap(), U256::from(15_000_000u64));
/// assert!(parse_atomic_amount("0").is_err());
/// assert!(parse_atomic_amount("1.5").is_err());
/// ```
pub fn parse_atomic_amount(s: &str) -> Result<U256> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PaymentError::InvalidAmount(format!(
            "'{}' is not a decimal integer",
            s
        )));
    }

    let value = U256::from_dec_str(s)
        .map_err(|_| PaymentError::InvalidAmount(format!("'{}' does not fit in uint256", s)))?;

    if value.is_zero() {
        return Err(PaymentError::InvalidAmount(
            "amount must be greater than zero".to_string(),
        ));
    }

    Ok(value)
}

/// Validates and parses an Ethereum address.
///
/// # Examples
///
/// ```
/// use split_pay::utils::parse_address;
///
/// assert!(parse_address("0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb").is_ok());
/// assert!(parse_address("invalid").is_err());
/// ```
pub fn parse_address(addr: &str) -> Result<Address> {
    Address::from_str(addr.trim())
        .map_err(|e| PaymentError::InvalidAddress(format!("{}: {}", addr, e)))
}

/// Converts atomic units into a human-readable amount for display.
///
/// Never feed the result back into an on-chain amount.
///
/// # Examples
///
/// ```
/// use split_pay::utils::to_display_amount;
/// use ethers::types::U256;
///
/// assert_eq!(to_display_amount(U256::from(15_000_000u64), 6), 15.0);
/// ```
pub fn to_display_amount(amount: U256, decimals: u8) -> f64 {
    format_units(amount, decimals as u32)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

/// Full 0x-prefixed hex form of a transaction hash.
pub fn format_tx_hash(hash: H256) -> String {
    format!("{:?}", hash)
}

/// Full 0x-prefixed, checksummed form of an address.
pub fn format_address(address: Address) -> String {
    ethers::utils::to_checksum(&address, None)
}

/// Builds a block explorer link for a transaction.
///
/// # Examples
///
/// ```
/// use split_pay::utils::explorer_tx_url;
/// use ethers::types::H256;
///
/// let url = explorer_tx_url("https://basescan.org", H256::zero());
/// assert!(url.starts_with("https://basescan.org/tx/0x0000"));
/// ```
pub fn explorer_tx_url(explorer_base: &str, hash: H256) -> String {
    format!(
        "{}/tx/{}",
        explorer_base.trim_end_matches('/'),
        format_tx_hash(hash)
    )
}

/// Compares two secrets in constant time.
///
/// Both inputs are hashed first so the comparison does not depend on where
/// they differ or on their lengths.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    let a = Keccak256::digest(provided.as_bytes());
    let b = Keccak256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Current time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
