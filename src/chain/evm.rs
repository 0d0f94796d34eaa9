//! EVM chain client built on ethers.
//!
//! One signer middleware stack per configured chain: an HTTP provider, a
//! local wallet for signing and a nonce manager so concurrent payments from
//! the same account get consecutive nonces.

use crate::chain::{ChainClient, ChainResult};
use crate::config::{ChainConfig, ServiceConfig};
use crate::errors::{ChainError, ConfigError};
use crate::types::{Chain, PendingTransfer, TransferLeg, TransferOutcome};
use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::middleware::{NonceManagerMiddleware, SignerMiddleware};
use ethers::providers::{Http, Middleware, PendingTransaction, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256, U64};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

abigen!(
    Erc20Token,
    r#"[
        function transfer(address to, uint256 amount) external returns (bool)
        function balanceOf(address account) external view returns (uint256)
    ]"#
);

type SignerClient = NonceManagerMiddleware<SignerMiddleware<Provider<Http>, LocalWallet>>;

struct ChainHandle {
    client: Arc<SignerClient>,
    // Held only while a transaction is being handed to the node.
    submit_lock: Mutex<()>,
}

/// [`ChainClient`] that signs with a local private key and talks JSON-RPC over HTTP.
pub struct EvmChainClient {
    address: Address,
    chains: HashMap<Chain, ChainHandle>,
    poll_interval: Duration,
}

impl EvmChainClient {
    /// Creates a client signing with `private_key` on every chain in `chains`.
    ///
    /// # Examples
    ///
    /// ```
    /// use split_pay::chain::evm::EvmChainClient;
    /// use split_pay::config::ServiceConfig;
    ///
    /// let config = ServiceConfig::new("0.005".parse().unwrap());
    /// let client = EvmChainClient::new(
    ///     "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    ///     &config.chains,
    /// ).unwrap();
    /// assert_eq!(
    ///     format!("{:?}", client.address()),
    ///     "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
    /// );
    /// ```
    pub fn new(
        private_key: &str,
        chains: &BTreeMap<Chain, ChainConfig>,
    ) -> Result<Self, ConfigError> {
        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| ConfigError::Invalid {
                key: "PRIVATE_KEY",
                reason: e.to_string(),
            })?;
        let address = wallet.address();

        let mut handles = HashMap::new();
        for (chain, chain_config) in chains {
            let provider = Provider::<Http>::try_from(chain_config.rpc_url.as_str())?;
            let signer = SignerMiddleware::new(provider, wallet.clone().with_chain_id(chain.chain_id()));
            let client = NonceManagerMiddleware::new(signer, address);
            handles.insert(
                *chain,
                ChainHandle {
                    client: Arc::new(client),
                    submit_lock: Mutex::new(()),
                },
            );
        }

        Ok(Self {
            address,
            chains: handles,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Creates a client from the service configuration; `PRIVATE_KEY` is required.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ConfigError> {
        let key = config
            .signer_key
            .as_ref()
            .ok_or(ConfigError::Missing("PRIVATE_KEY"))?;
        Self::new(key.expose(), &config.chains)
    }

    /// Sets how often receipts are polled while waiting for confirmation.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Address of the paying account.
    pub fn address(&self) -> Address {
        self.address
    }

    fn handle(&self, chain: Chain) -> ChainResult<&ChainHandle> {
        self.chains.get(&chain).ok_or(ChainError::NoProvider(chain))
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    async fn token_balance(&self, chain: Chain, token_contract: Address) -> ChainResult<U256> {
        let handle = self.handle(chain)?;
        let token = Erc20Token::new(token_contract, handle.client.clone());
        token
            .balance_of(self.address)
            .call()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))
    }

    async fn submit_transfer(
        &self,
        chain: Chain,
        token_contract: Address,
        leg: &TransferLeg,
    ) -> ChainResult<PendingTransfer> {
        let handle = self.handle(chain)?;
        let token = Erc20Token::new(token_contract, handle.client.clone());
        let call = token.transfer(leg.recipient(), leg.amount());

        let tx_hash = {
            let _guard = handle.submit_lock.lock().await;
            let pending = call
                .send()
                .await
                .map_err(|e| ChainError::from_message(e.to_string()))?;
            pending.tx_hash()
        };

        tracing::info!(
            %chain,
            leg = %leg.role(),
            tx_hash = ?tx_hash,
            "Transfer submitted"
        );

        Ok(PendingTransfer {
            tx_hash,
            role: leg.role(),
        })
    }

    async fn await_confirmation(
        &self,
        chain: Chain,
        pending: &PendingTransfer,
        confirmations: usize,
        timeout: Duration,
    ) -> ChainResult<TransferOutcome> {
        let handle = self.handle(chain)?;
        let wait = PendingTransaction::new(pending.tx_hash, handle.client.provider())
            .interval(self.poll_interval)
            .confirmations(confirmations);

        let receipt = match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result?,
            Err(_) => return Err(ChainError::Timeout),
        };
        let receipt = receipt.ok_or(ChainError::Dropped(pending.tx_hash))?;

        Ok(TransferOutcome {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|b| b.as_u64()),
            confirmed: receipt.status == Some(U64::from(1u64)),
            gas_used: receipt.gas_used,
        })
    }
}
