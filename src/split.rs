//! Commission split arithmetic.

use crate::config::CommissionRate;
use crate::types::CommissionSplit;
use ethers::types::{U256, U512};

/// Splits `total` into a commission and a merchant amount.
///
/// The commission is `floor(total * rate)`, computed through a 512-bit
/// intermediate so no total in the uint256 range can overflow. The merchant
/// receives the rest, including any truncation remainder.
///
/// # Examples
///
/// ```
/// use split_pay::split::split;
/// use ethers::types::U256;
///
/// let split = split(U256::from(15_000_000u64), &"0.005".parse().unwrap());
/// assert_eq!(split.commission_amount, U256::from(75_000u64));
/// assert_eq!(split.merchant_amount, U256::from(14_925_000u64));
/// ```
pub fn split(total: U256, rate: &CommissionRate) -> CommissionSplit {
    let product = total.full_mul(rate.numerator());
    let commission = product / U512::from(rate.denominator());
    // rate < 1, so the quotient is at most `total` and fits back into 256 bits.
    let commission_amount = U256::try_from(commission).unwrap_or(total);

    CommissionSplit {
        commission_amount,
        merchant_amount: total - commission_amount,
    }
}
