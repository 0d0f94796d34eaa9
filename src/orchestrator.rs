//! Payment orchestration.
//!
//! A payment run is an explicit state machine:
//!
//! ```text
//! Authorizing -> Validating -> Splitting -> CommissionPending -> CommissionConfirmed
//!             -> MerchantPending -> MerchantConfirmed
//! ```
//!
//! Any transition may fail, which ends the run. The merchant leg is only ever
//! submitted after the commission leg confirmed successfully, so a failure
//! after that point is reported as [`PaymentError::MerchantFailed`] together
//! with the commission transaction hash.

use crate::auth::{HttpIdentityVerifier, OwnerAuthorizer};
use crate::chain::{ChainClient, ChainResult};
use crate::config::ServiceConfig;
use crate::errors::{ChainError, PaymentError, Result};
use crate::split::split;
use crate::types::{
    CommissionSplit, LegRole, PaymentRequest, PaymentStage, PendingTransfer, TransferLeg,
    TransferOutcome,
};
use crate::validation::{validate, ValidatedRequest};
use ethers::types::Address;
use std::sync::Arc;

/// Everything known about a completed payment.
#[derive(Debug, Clone)]
pub struct PaymentResult {
    /// The request as validated
    pub request: ValidatedRequest,
    /// Amounts of both legs
    pub split: CommissionSplit,
    /// Recipient of the commission leg
    pub commission_address: Address,
    /// Confirmed commission transfer
    pub commission: TransferOutcome,
    /// Confirmed merchant transfer
    pub merchant: TransferOutcome,
    /// Stages traversed, in order
    pub stages: Vec<PaymentStage>,
}

/// Both legs of a payment, fixed once the split is computed.
#[derive(Debug, Clone)]
struct SettlementPlan {
    request: ValidatedRequest,
    split: CommissionSplit,
    commission_address: Address,
    commission_leg: TransferLeg,
    merchant_leg: TransferLeg,
}

enum State {
    Authorizing,
    Validating,
    Splitting(ValidatedRequest),
    CommissionPending(SettlementPlan, PendingTransfer),
    CommissionConfirmed(SettlementPlan, TransferOutcome),
    MerchantPending(SettlementPlan, TransferOutcome, PendingTransfer),
    MerchantConfirmed(SettlementPlan, TransferOutcome, TransferOutcome),
}

impl State {
    fn stage(&self) -> PaymentStage {
        match self {
            State::Authorizing => PaymentStage::Authorizing,
            State::Validating => PaymentStage::Validating,
            State::Splitting(_) => PaymentStage::Splitting,
            State::CommissionPending(..) => PaymentStage::CommissionPending,
            State::CommissionConfirmed(..) => PaymentStage::CommissionConfirmed,
            State::MerchantPending(..) => PaymentStage::MerchantPending,
            State::MerchantConfirmed(..) => PaymentStage::MerchantConfirmed,
        }
    }
}

/// Runs payment requests from authorization to the second confirmation.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    config: Arc<ServiceConfig>,
    authorizer: OwnerAuthorizer,
    chain: Arc<dyn ChainClient>,
}

impl PaymentOrchestrator {
    /// Creates an orchestrator over `chain`.
    ///
    /// The authorizer is derived from the configuration, including the
    /// identity service when one is configured.
    pub fn new(config: Arc<ServiceConfig>, chain: Arc<dyn ChainClient>) -> Self {
        let mut authorizer =
            OwnerAuthorizer::new(config.owner_credential.clone(), config.auth_mode);
        if let Some(url) = &config.identity_service_url {
            authorizer =
                authorizer.with_identity_verifier(Arc::new(HttpIdentityVerifier::new(url.clone())));
        }

        Self {
            config,
            authorizer,
            chain,
        }
    }

    /// Replaces the authorizer.
    pub fn with_authorizer(mut self, authorizer: OwnerAuthorizer) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Configuration the orchestrator was built with.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Executes one payment request end to end.
    pub async fn execute(
        &self,
        credential: Option<&str>,
        request: &PaymentRequest,
    ) -> Result<PaymentResult> {
        self.execute_traced(credential, request).await.0
    }

    /// Executes one payment request and also returns the stages it went
    /// through. A failed run ends with [`PaymentStage::Failed`].
    pub async fn execute_traced(
        &self,
        credential: Option<&str>,
        request: &PaymentRequest,
    ) -> (Result<PaymentResult>, Vec<PaymentStage>) {
        let mut state = State::Authorizing;
        let mut stages = Vec::with_capacity(8);

        loop {
            let stage = state.stage();
            stages.push(stage);
            tracing::debug!(?stage, "Payment stage");

            if let State::MerchantConfirmed(plan, commission, merchant) = state {
                tracing::info!(
                    chain = %plan.request.chain,
                    token = %plan.request.token,
                    commission_tx = ?commission.tx_hash,
                    merchant_tx = ?merchant.tx_hash,
                    "Payment completed"
                );
                let result = PaymentResult {
                    request: plan.request,
                    split: plan.split,
                    commission_address: plan.commission_address,
                    commission,
                    merchant,
                    stages: stages.clone(),
                };
                return (Ok(result), stages);
            }

            state = match self.advance(state, credential, request).await {
                Ok(next) => next,
                Err(e) => {
                    tracing::warn!(?stage, error = %e, "Payment failed");
                    stages.push(PaymentStage::Failed);
                    return (Err(e), stages);
                }
            };
        }
    }

    async fn advance(
        &self,
        state: State,
        credential: Option<&str>,
        request: &PaymentRequest,
    ) -> Result<State> {
        match state {
            State::Authorizing => {
                self.authorizer.authorize(credential).await?;
                Ok(State::Validating)
            }
            State::Validating => Ok(State::Splitting(validate(request, &self.config)?)),
            State::Splitting(validated) => {
                let plan = self.plan(validated)?;
                self.ensure_balance(&plan).await?;
                let pending = self
                    .submit(&plan, &plan.commission_leg)
                    .await
                    .map_err(commission_submit_error)?;
                Ok(State::CommissionPending(plan, pending))
            }
            State::CommissionPending(plan, pending) => {
                let outcome = self
                    .confirm(&plan, &pending)
                    .await
                    .map_err(|e| commission_confirm_error(e, &pending))?;
                if !outcome.confirmed {
                    return Err(PaymentError::CommissionFailed {
                        reason: "commission transfer reverted on-chain".to_string(),
                        tx_hash: Some(outcome.tx_hash),
                    });
                }
                Ok(State::CommissionConfirmed(plan, outcome))
            }
            State::CommissionConfirmed(plan, commission) => {
                match self.submit(&plan, &plan.merchant_leg).await {
                    Ok(pending) => Ok(State::MerchantPending(plan, commission, pending)),
                    Err(e) => Err(PaymentError::MerchantFailed {
                        reason: e.to_string(),
                        commission_tx_hash: commission.tx_hash,
                        tx_hash: None,
                    }),
                }
            }
            State::MerchantPending(plan, commission, pending) => {
                let outcome = match self.confirm(&plan, &pending).await {
                    Ok(outcome) => outcome,
                    Err(ChainError::Timeout) => {
                        return Err(PaymentError::ConfirmationTimeout {
                            leg: LegRole::Merchant,
                            tx_hash: pending.tx_hash,
                            commission_tx_hash: Some(commission.tx_hash),
                        })
                    }
                    Err(e) => {
                        return Err(PaymentError::MerchantFailed {
                            reason: e.to_string(),
                            commission_tx_hash: commission.tx_hash,
                            tx_hash: Some(pending.tx_hash),
                        })
                    }
                };
                if !outcome.confirmed {
                    return Err(PaymentError::MerchantFailed {
                        reason: "merchant transfer reverted on-chain".to_string(),
                        commission_tx_hash: commission.tx_hash,
                        tx_hash: Some(outcome.tx_hash),
                    });
                }
                Ok(State::MerchantConfirmed(plan, commission, outcome))
            }
            State::MerchantConfirmed(..) => Ok(state),
        }
    }

    fn plan(&self, request: ValidatedRequest) -> Result<SettlementPlan> {
        let commission_address = self
            .config
            .commission_address
            .ok_or(PaymentError::MisconfiguredCommission)?;

        let split = split(request.total_amount, &self.config.commission_rate);
        tracing::info!(
            chain = %request.chain,
            token = %request.token,
            total = %request.total_amount,
            commission = %split.commission_amount,
            merchant = %split.merchant_amount,
            "Commission split computed"
        );

        Ok(SettlementPlan {
            commission_leg: TransferLeg::new(
                commission_address,
                split.commission_amount,
                LegRole::Commission,
            ),
            merchant_leg: TransferLeg::new(
                request.merchant_address,
                split.merchant_amount,
                LegRole::Merchant,
            ),
            commission_address,
            split,
            request,
        })
    }

    async fn ensure_balance(&self, plan: &SettlementPlan) -> Result<()> {
        let balance = self
            .chain
            .token_balance(plan.request.chain, plan.request.token_contract)
            .await
            .map_err(|e| PaymentError::UnexpectedChainError {
                reason: e.to_string(),
                tx_hash: None,
            })?;

        if balance < plan.request.total_amount {
            return Err(PaymentError::InsufficientFunds(format!(
                "{} balance {} is below payment total {}",
                plan.request.token, balance, plan.request.total_amount
            )));
        }
        Ok(())
    }

    async fn submit(&self, plan: &SettlementPlan, leg: &TransferLeg) -> ChainResult<PendingTransfer> {
        tracing::info!(
            chain = %plan.request.chain,
            leg = %leg.role(),
            recipient = ?leg.recipient(),
            amount = %leg.amount(),
            "Submitting transfer"
        );
        self.chain
            .submit_transfer(plan.request.chain, plan.request.token_contract, leg)
            .await
    }

    async fn confirm(
        &self,
        plan: &SettlementPlan,
        pending: &PendingTransfer,
    ) -> ChainResult<TransferOutcome> {
        let policy = self.config.confirmation;
        let wait = self.chain.await_confirmation(
            plan.request.chain,
            pending,
            policy.confirmations,
            policy.timeout,
        );

        // Enforced here as well so a slow client cannot exceed the bound.
        let outcome = match tokio::time::timeout(policy.timeout, wait).await {
            Ok(result) => result?,
            Err(_) => return Err(ChainError::Timeout),
        };

        tracing::info!(
            chain = %plan.request.chain,
            leg = %pending.role,
            tx_hash = ?outcome.tx_hash,
            block = ?outcome.block_number,
            confirmed = outcome.confirmed,
            "Transfer mined"
        );
        Ok(outcome)
    }
}

fn commission_submit_error(err: ChainError) -> PaymentError {
    match err {
        ChainError::InsufficientFunds(reason) => PaymentError::InsufficientFunds(reason),
        ChainError::Rejected(reason) => PaymentError::CommissionFailed {
            reason,
            tx_hash: None,
        },
        other => PaymentError::UnexpectedChainError {
            reason: other.to_string(),
            tx_hash: None,
        },
    }
}

fn commission_confirm_error(err: ChainError, pending: &PendingTransfer) -> PaymentError {
    match err {
        ChainError::Timeout => PaymentError::ConfirmationTimeout {
            leg: LegRole::Commission,
            tx_hash: pending.tx_hash,
            commission_tx_hash: None,
        },
        ChainError::Dropped(_) => PaymentError::CommissionFailed {
            reason: err.to_string(),
            tx_hash: Some(pending.tx_hash),
        },
        // Broadcast but unconfirmed: it may still be mined.
        other => PaymentError::UnexpectedChainError {
            reason: format!("while confirming commission {:?}: {}", pending.tx_hash, other),
            tx_hash: Some(pending.tx_hash),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthMode;
    use async_trait::async_trait;
    use ethers::types::{H256, U256};
    use std::sync::Mutex;
    use std::time::Duration;

    const OWNER_KEY: &str = "owner-key";
    const MERCHANT: &str = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb";

    #[derive(Clone, Copy, PartialEq)]
    enum Behaviour {
        Succeed,
        Revert,
        RejectSubmit,
        Timeout,
        Hang,
        ConnectionLost,
        Dropped,
    }

    struct MockChain {
        balance: U256,
        commission: Behaviour,
        merchant: Behaviour,
        submits: Mutex<Vec<TransferLeg>>,
    }

    impl MockChain {
        fn new(commission: Behaviour, merchant: Behaviour) -> Self {
            Self {
                balance: U256::MAX,
                commission,
                merchant,
                submits: Mutex::new(Vec::new()),
            }
        }

        fn behaviour(&self, role: LegRole) -> Behaviour {
            match role {
                LegRole::Commission => self.commission,
                LegRole::Merchant => self.merchant,
            }
        }

        fn submits(&self) -> Vec<TransferLeg> {
            self.submits.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChainClient for MockChain {
        async fn token_balance(&self, _chain: crate::types::Chain, _token: Address) -> ChainResult<U256> {
            Ok(self.balance)
        }

        async fn submit_transfer(
            &self,
            _chain: crate::types::Chain,
            _token_contract: Address,
            leg: &TransferLeg,
        ) -> ChainResult<PendingTransfer> {
            let mut submits = self.submits.lock().unwrap();
            submits.push(leg.clone());
            if self.behaviour(leg.role()) == Behaviour::RejectSubmit {
                return Err(ChainError::Rejected("nonce too low".to_string()));
            }
            Ok(PendingTransfer {
                tx_hash: H256::from_low_u64_be(submits.len() as u64),
                role: leg.role(),
            })
        }

        async fn await_confirmation(
            &self,
            _chain: crate::types::Chain,
            pending: &PendingTransfer,
            _confirmations: usize,
            _timeout: Duration,
        ) -> ChainResult<TransferOutcome> {
            match self.behaviour(pending.role) {
                Behaviour::Timeout => return Err(ChainError::Timeout),
                Behaviour::Hang => std::future::pending::<()>().await,
                Behaviour::ConnectionLost => {
                    return Err(ChainError::Network("connection reset".to_string()))
                }
                Behaviour::Dropped => return Err(ChainError::Dropped(pending.tx_hash)),
                _ => {}
            }
            Ok(TransferOutcome {
                tx_hash: pending.tx_hash,
                block_number: Some(100),
                confirmed: self.behaviour(pending.role) == Behaviour::Succeed,
                gas_used: Some(U256::from(50_000u64)),
            })
        }
    }

    fn config() -> ServiceConfig {
        ServiceConfig::new("0.005".parse().unwrap())
            .with_owner_credential(OWNER_KEY)
            .with_commission_address(Address::repeat_byte(0xcc))
            .with_confirmation(1, Duration::from_millis(200))
    }

    fn request(amount: &str, token: &str, chain: &str) -> PaymentRequest {
        PaymentRequest {
            merchant_address: Some(MERCHANT.to_string()),
            total_amount: Some(amount.to_string()),
            token: Some(token.to_string()),
            chain: Some(chain.to_string()),
        }
    }

    fn orchestrator(config: ServiceConfig, chain: Arc<MockChain>) -> PaymentOrchestrator {
        PaymentOrchestrator::new(Arc::new(config), chain)
    }

    #[tokio::test]
    async fn test_successful_payment() {
        let chain = Arc::new(MockChain::new(Behaviour::Succeed, Behaviour::Succeed));
        let result = orchestrator(config(), chain.clone())
            .execute(Some(OWNER_KEY), &request("15000000", "USDC", "base"))
            .await
            .unwrap();

        assert_eq!(result.split.commission_amount, U256::from(75_000u64));
        assert_eq!(result.split.merchant_amount, U256::from(14_925_000u64));
        assert_eq!(
            result.stages,
            vec![
                PaymentStage::Authorizing,
                PaymentStage::Validating,
                PaymentStage::Splitting,
                PaymentStage::CommissionPending,
                PaymentStage::CommissionConfirmed,
                PaymentStage::MerchantPending,
                PaymentStage::MerchantConfirmed,
            ]
        );

        let submits = chain.submits();
        assert_eq!(submits.len(), 2);
        assert_eq!(submits[0].role(), LegRole::Commission);
        assert_eq!(submits[0].recipient(), Address::repeat_byte(0xcc));
        assert_eq!(submits[1].role(), LegRole::Merchant);
        assert_eq!(submits[1].amount(), U256::from(14_925_000u64));
        assert_eq!(result.commission.tx_hash, H256::from_low_u64_be(1));
        assert_eq!(result.merchant.tx_hash, H256::from_low_u64_be(2));
    }

    #[tokio::test]
    async fn test_reverted_commission_never_submits_merchant() {
        let chain = Arc::new(MockChain::new(Behaviour::Revert, Behaviour::Succeed));
        let err = orchestrator(config(), chain.clone())
            .execute(Some(OWNER_KEY), &request("15000000", "USDC", "base"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PaymentError::CommissionFailed { tx_hash: Some(_), .. }
        ));
        assert_eq!(chain.submits().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_commission_submission() {
        let chain = Arc::new(MockChain::new(Behaviour::RejectSubmit, Behaviour::Succeed));
        let err = orchestrator(config(), chain.clone())
            .execute(Some(OWNER_KEY), &request("15000000", "USDC", "base"))
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::CommissionFailed { tx_hash: None, .. }));
        assert_eq!(chain.submits().len(), 1);
    }

    #[tokio::test]
    async fn test_merchant_failure_discloses_commission() {
        let chain = Arc::new(MockChain::new(Behaviour::Succeed, Behaviour::Revert));
        let err = orchestrator(config(), chain.clone())
            .execute(Some(OWNER_KEY), &request("15000000", "USDC", "base"))
            .await
            .unwrap_err();

        match err {
            PaymentError::MerchantFailed {
                commission_tx_hash,
                tx_hash,
                ..
            } => {
                assert_eq!(commission_tx_hash, H256::from_low_u64_be(1));
                assert_eq!(tx_hash, Some(H256::from_low_u64_be(2)));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_merchant_submission_failure_discloses_commission() {
        let chain = Arc::new(MockChain::new(Behaviour::Succeed, Behaviour::RejectSubmit));
        let err = orchestrator(config(), chain)
            .execute(Some(OWNER_KEY), &request("15000000", "USDC", "base"))
            .await
            .unwrap_err();

        assert_eq!(err.confirmed_commission(), Some(H256::from_low_u64_be(1)));
        assert!(matches!(err, PaymentError::MerchantFailed { tx_hash: None, .. }));
    }

    #[tokio::test]
    async fn test_commission_timeout_is_distinct() {
        let chain = Arc::new(MockChain::new(Behaviour::Timeout, Behaviour::Succeed));
        let err = orchestrator(config(), chain.clone())
            .execute(Some(OWNER_KEY), &request("15000000", "USDC", "base"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PaymentError::ConfirmationTimeout {
                leg: LegRole::Commission,
                tx_hash: H256::from_low_u64_be(1),
                commission_tx_hash: None,
            }
        );
        assert_eq!(chain.submits().len(), 1);
    }

    #[tokio::test]
    async fn test_lost_connection_keeps_commission_hash() {
        let chain = Arc::new(MockChain::new(Behaviour::ConnectionLost, Behaviour::Succeed));
        let err = orchestrator(config(), chain.clone())
            .execute(Some(OWNER_KEY), &request("15000000", "USDC", "base"))
            .await
            .unwrap_err();

        match err {
            PaymentError::UnexpectedChainError { reason, tx_hash } => {
                assert!(reason.contains("connection reset"));
                assert_eq!(tx_hash, Some(H256::from_low_u64_be(1)));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(chain.submits().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_commission_keeps_hash() {
        let chain = Arc::new(MockChain::new(Behaviour::Dropped, Behaviour::Succeed));
        let err = orchestrator(config(), chain.clone())
            .execute(Some(OWNER_KEY), &request("15000000", "USDC", "base"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PaymentError::CommissionFailed { tx_hash: Some(hash), .. } if hash == H256::from_low_u64_be(1)
        ));
        assert_eq!(chain.submits().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_run_records_failed_stage() {
        let chain = Arc::new(MockChain::new(Behaviour::Revert, Behaviour::Succeed));
        let (outcome, stages) = orchestrator(config(), chain)
            .execute_traced(Some(OWNER_KEY), &request("15000000", "USDC", "base"))
            .await;

        assert!(matches!(outcome, Err(PaymentError::CommissionFailed { .. })));
        assert_eq!(
            stages,
            vec![
                PaymentStage::Authorizing,
                PaymentStage::Validating,
                PaymentStage::Splitting,
                PaymentStage::CommissionPending,
                PaymentStage::Failed,
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_credential_stops_at_authorizing() {
        let chain = Arc::new(MockChain::new(Behaviour::Succeed, Behaviour::Succeed));
        let (outcome, stages) = orchestrator(config(), chain)
            .execute_traced(Some("guess"), &request("15000000", "USDC", "base"))
            .await;

        assert!(outcome.is_err());
        assert_eq!(stages, vec![PaymentStage::Authorizing, PaymentStage::Failed]);
    }

    #[tokio::test]
    async fn test_hanging_client_bounded_by_timeout() {
        let chain = Arc::new(MockChain::new(Behaviour::Succeed, Behaviour::Hang));
        let err = orchestrator(config(), chain)
            .execute(Some(OWNER_KEY), &request("15000000", "USDC", "base"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PaymentError::ConfirmationTimeout {
                leg: LegRole::Merchant,
                tx_hash: H256::from_low_u64_be(2),
                commission_tx_hash: Some(H256::from_low_u64_be(1)),
            }
        );
    }

    #[tokio::test]
    async fn test_wrong_credential_makes_no_chain_calls() {
        let chain = Arc::new(MockChain::new(Behaviour::Succeed, Behaviour::Succeed));
        let err = orchestrator(config(), chain.clone())
            .execute(Some("guess"), &request("15000000", "USDC", "base"))
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Unauthorized(_)));
        assert!(chain.submits().is_empty());
    }

    #[tokio::test]
    async fn test_token_not_on_chain_makes_no_chain_calls() {
        let chain = Arc::new(MockChain::new(Behaviour::Succeed, Behaviour::Succeed));
        let err = orchestrator(config(), chain.clone())
            .execute(Some(OWNER_KEY), &request("15000000", "USDT", "base"))
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::TokenNotOnChain { .. }));
        assert!(chain.submits().is_empty());
    }

    #[tokio::test]
    async fn test_missing_commission_address() {
        let chain = Arc::new(MockChain::new(Behaviour::Succeed, Behaviour::Succeed));
        let config = ServiceConfig::new("0.005".parse().unwrap())
            .with_auth_mode(AuthMode::Open);
        let err = orchestrator(config, chain.clone())
            .execute(None, &request("15000000", "USDC", "base"))
            .await
            .unwrap_err();

        assert_eq!(err, PaymentError::MisconfiguredCommission);
        assert!(chain.submits().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_balance_submits_nothing() {
        let mut mock = MockChain::new(Behaviour::Succeed, Behaviour::Succeed);
        mock.balance = U256::from(1_000u64);
        let chain = Arc::new(mock);
        let err = orchestrator(config(), chain.clone())
            .execute(Some(OWNER_KEY), &request("15000000", "USDC", "base"))
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::InsufficientFunds(_)));
        assert!(chain.submits().is_empty());
    }
}
