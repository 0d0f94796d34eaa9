//! Chain client abstraction.
//!
//! The orchestrator never talks to a node directly. Signing, nonce handling,
//! gas pricing and receipt polling all live behind [`ChainClient`].

pub mod evm;

use crate::errors::ChainError;
use crate::types::{Chain, PendingTransfer, TransferLeg, TransferOutcome};
use async_trait::async_trait;
use ethers::types::{Address, U256};
use std::time::Duration;

/// Result type for chain client calls.
pub type ChainResult<T> = std::result::Result<T, ChainError>;

/// Submits ERC20 transfers from the service's account and waits for them.
///
/// Implementations must keep submissions from one account ordered (for
/// example with a per-account queue or nonce manager); concurrent payments
/// share the same signer.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Balance of the paying account in `token_contract`, in atomic units.
    async fn token_balance(&self, chain: Chain, token_contract: Address) -> ChainResult<U256>;

    /// Submits `leg` as an ERC20 `transfer` call on `token_contract`.
    ///
    /// Returns as soon as the node accepted the transaction.
    async fn submit_transfer(
        &self,
        chain: Chain,
        token_contract: Address,
        leg: &TransferLeg,
    ) -> ChainResult<PendingTransfer>;

    /// Waits until `pending` has `confirmations` confirmations or `timeout` elapses.
    ///
    /// A reverted transaction is a successful wait with `confirmed == false`.
    /// Timing out leaves the transaction in flight.
    async fn await_confirmation(
        &self,
        chain: Chain,
        pending: &PendingTransfer,
        confirmations: usize,
        timeout: Duration,
    ) -> ChainResult<TransferOutcome>;
}
