//! Service configuration.
//!
//! All settings are read once at startup into an immutable [`ServiceConfig`]
//! which is then shared read-only by every request.

use crate::errors::ConfigError;
use crate::types::{Chain, Token};
use ethers::types::{Address, U256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;
use zeroize::Zeroizing;

/// Commission rate applied when `COMMISSION_RATE` is unset.
pub const DEFAULT_COMMISSION_RATE: &str = "0.005";

/// Default bound on each confirmation wait.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of confirmations required per leg.
pub const DEFAULT_CONFIRMATIONS: usize = 1;

const MAX_RATE_DECIMALS: usize = 18;

/// A sensitive string that is redacted in debug output and zeroed on drop.
#[derive(Clone)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    /// Wraps a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Exposes the secret. Keep the borrow short and never log it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// What to do with requests when no owner credential is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Reject every request as misconfigured
    #[default]
    Required,
    /// Accept every request, logging a warning each time
    Open,
}

impl FromStr for AuthMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "required" => Ok(AuthMode::Required),
            "open" => Ok(AuthMode::Open),
            other => Err(ConfigError::Invalid {
                key: "OWNER_AUTH_MODE",
                reason: format!("expected 'required' or 'open', got '{}'", other),
            }),
        }
    }
}

/// Commission rate as an exact rational number in (0, 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionRate {
    numerator: U256,
    denominator: U256,
}

impl CommissionRate {
    /// Creates a rate from a numerator and denominator.
    ///
    /// # Examples
    ///
    /// ```
    /// use split_pay::config::CommissionRate;
    ///
    /// let rate = CommissionRate::new(5u64.into(), 1000u64.into()).unwrap();
    /// assert_eq!(rate.as_f64(), 0.005);
    /// assert!(CommissionRate::new(1u64.into(), 1u64.into()).is_err());
    /// ```
    pub fn new(numerator: U256, denominator: U256) -> Result<Self, ConfigError> {
        if numerator.is_zero() || numerator >= denominator {
            return Err(ConfigError::Invalid {
                key: "COMMISSION_RATE",
                reason: format!("{}/{} is outside (0, 1)", numerator, denominator),
            });
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Numerator of the rate.
    pub fn numerator(&self) -> U256 {
        self.numerator
    }

    /// Denominator of the rate.
    pub fn denominator(&self) -> U256 {
        self.denominator
    }

    /// Approximate value for display.
    pub fn as_f64(&self) -> f64 {
        let to_f64 = |v: U256| v.to_string().parse::<f64>().unwrap_or(f64::NAN);
        to_f64(self.numerator) / to_f64(self.denominator)
    }
}

impl FromStr for CommissionRate {
    type Err = ConfigError;

    /// Parses a decimal fraction such as `0.005` without going through floats.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ConfigError::Invalid {
            key: "COMMISSION_RATE",
            reason,
        };

        let s = s.trim();
        let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid("empty rate".to_string()));
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid(format!("'{}' is not a decimal fraction", s)));
        }
        if frac_part.len() > MAX_RATE_DECIMALS {
            return Err(invalid(format!(
                "at most {} decimal places are supported",
                MAX_RATE_DECIMALS
            )));
        }

        let digits = format!("{}{}", int_part, frac_part);
        let numerator = U256::from_dec_str(&digits)
            .map_err(|e| invalid(format!("'{}': {}", s, e)))?;
        let denominator = U256::exp10(frac_part.len());

        Self::new(numerator, denominator)
    }
}

impl fmt::Display for CommissionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// RPC and explorer settings for one chain.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// JSON-RPC endpoint
    pub rpc_url: Url,
    /// Block explorer base URL
    pub explorer_url: String,
}

/// Decimals and deployments of one token.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Decimal places of the token
    pub decimals: u8,
    /// Contract address per chain; absent chains are not supported for this token
    pub contracts: BTreeMap<Chain, Address>,
}

/// How long and how deep to wait for each leg.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPolicy {
    /// Confirmations required before a leg counts as settled
    pub confirmations: usize,
    /// Upper bound on the wait for each leg
    pub timeout: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            confirmations: DEFAULT_CONFIRMATIONS,
            timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }
}

/// Immutable process-wide configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Credential callers must present in the owner key header
    pub owner_credential: Option<Secret>,

    /// Behaviour when `owner_credential` is absent
    pub auth_mode: AuthMode,

    /// Recipient of the commission leg
    pub commission_address: Option<Address>,

    /// Share of each payment paid as commission
    pub commission_rate: CommissionRate,

    /// Optional identity service that must also accept the credential
    pub identity_service_url: Option<Url>,

    /// Chains with an RPC endpoint
    pub chains: BTreeMap<Chain, ChainConfig>,

    /// Tokens and their deployments
    pub tokens: BTreeMap<Token, TokenConfig>,

    /// Confirmation depth and timeout
    pub confirmation: ConfirmationPolicy,

    /// Private key of the paying account
    pub signer_key: Option<Secret>,

    /// Socket address the HTTP server binds to
    pub listen_addr: String,
}

impl ServiceConfig {
    /// Creates a configuration with the built-in chain and token tables and
    /// nothing else set.
    ///
    /// # Examples
    ///
    /// ```
    /// use split_pay::config::ServiceConfig;
    /// use split_pay::types::{Chain, Token};
    ///
    /// let config = ServiceConfig::new("0.005".parse().unwrap());
    /// assert!(config.chains.contains_key(&Chain::Base));
    /// assert!(config.token_contract(Token::Usdt, Chain::Base).is_none());
    /// ```
    pub fn new(commission_rate: CommissionRate) -> Self {
        let chains = Chain::ALL
            .iter()
            .map(|chain| {
                let config = ChainConfig {
                    rpc_url: Url::parse(default_rpc_url(*chain))
                        .expect("built-in RPC URLs are valid"),
                    explorer_url: default_explorer_url(*chain).to_string(),
                };
                (*chain, config)
            })
            .collect();

        Self {
            owner_credential: None,
            auth_mode: AuthMode::Required,
            commission_address: None,
            commission_rate,
            identity_service_url: None,
            chains,
            tokens: default_tokens(),
            confirmation: ConfirmationPolicy::default(),
            signer_key: None,
            listen_addr: "0.0.0.0:3000".to_string(),
        }
    }

    /// Sets the owner credential.
    pub fn with_owner_credential(mut self, credential: impl Into<String>) -> Self {
        self.owner_credential = Some(Secret::new(credential));
        self
    }

    /// Sets the behaviour when no owner credential is configured.
    pub fn with_auth_mode(mut self, mode: AuthMode) -> Self {
        self.auth_mode = mode;
        self
    }

    /// Sets the commission recipient.
    pub fn with_commission_address(mut self, address: Address) -> Self {
        self.commission_address = Some(address);
        self
    }

    /// Requires the identity service at `url` to accept each credential.
    pub fn with_identity_service(mut self, url: Url) -> Self {
        self.identity_service_url = Some(url);
        self
    }

    /// Sets the confirmation depth and timeout.
    pub fn with_confirmation(mut self, confirmations: usize, timeout: Duration) -> Self {
        self.confirmation = ConfirmationPolicy {
            confirmations,
            timeout,
        };
        self
    }

    /// Sets the private key of the paying account.
    pub fn with_signer_key(mut self, key: impl Into<String>) -> Self {
        self.signer_key = Some(Secret::new(key));
        self
    }

    /// Removes a chain from the chain table.
    pub fn without_chain(mut self, chain: Chain) -> Self {
        self.chains.remove(&chain);
        self
    }

    /// Loads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// Blank values are treated as unset. An RPC variable set to `disabled`
    /// removes that chain from the table.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let commission_rate = get("COMMISSION_RATE")
            .as_deref()
            .unwrap_or(DEFAULT_COMMISSION_RATE)
            .parse::<CommissionRate>()?;

        let mut config = Self::new(commission_rate);

        config.owner_credential = get("OWNER_API_KEY").map(Secret::new);
        if let Some(mode) = get("OWNER_AUTH_MODE") {
            config.auth_mode = mode.parse()?;
        }

        if let Some(addr) = get("COMMISSION_ADDRESS") {
            let address = Address::from_str(&addr).map_err(|e| ConfigError::Invalid {
                key: "COMMISSION_ADDRESS",
                reason: e.to_string(),
            })?;
            config.commission_address = Some(address);
        }

        if let Some(url) = get("IDENTITY_SERVICE_URL") {
            config.identity_service_url = Some(Url::parse(&url)?);
        }

        for chain in Chain::ALL {
            let key = rpc_env_key(chain);
            match get(key) {
                Some(value) if value.eq_ignore_ascii_case("disabled") => {
                    config.chains.remove(&chain);
                }
                Some(value) => {
                    if let Some(entry) = config.chains.get_mut(&chain) {
                        entry.rpc_url = Url::parse(&value)?;
                    }
                }
                None => {}
            }
        }

        if let Some(secs) = get("CONFIRMATION_TIMEOUT_SECS") {
            let secs = secs.parse::<u64>().map_err(|e| ConfigError::Invalid {
                key: "CONFIRMATION_TIMEOUT_SECS",
                reason: e.to_string(),
            })?;
            config.confirmation.timeout = Duration::from_secs(secs);
        }

        if let Some(n) = get("REQUIRED_CONFIRMATIONS") {
            config.confirmation.confirmations =
                n.parse::<usize>().map_err(|e| ConfigError::Invalid {
                    key: "REQUIRED_CONFIRMATIONS",
                    reason: e.to_string(),
                })?;
        }

        config.signer_key = get("PRIVATE_KEY").map(Secret::new);

        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = get("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| ConfigError::Invalid {
                key: "PORT",
                reason: e.to_string(),
            })?;
        config.listen_addr = format!("{}:{}", host, port);

        Ok(config)
    }

    /// Startup checks. A service that fails these must not start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.owner_credential.is_none() && self.auth_mode == AuthMode::Required {
            return Err(ConfigError::Missing("OWNER_API_KEY"));
        }
        if self.chains.is_empty() {
            return Err(ConfigError::Invalid {
                key: "RPC_URL",
                reason: "every chain is disabled".to_string(),
            });
        }
        if self.confirmation.confirmations == 0 {
            return Err(ConfigError::Invalid {
                key: "REQUIRED_CONFIRMATIONS",
                reason: "at least one confirmation is required".to_string(),
            });
        }
        if self.confirmation.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "CONFIRMATION_TIMEOUT_SECS",
                reason: "timeout must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Contract address of `token` on `chain`, if deployed there.
    pub fn token_contract(&self, token: Token, chain: Chain) -> Option<Address> {
        self.tokens
            .get(&token)
            .and_then(|t| t.contracts.get(&chain))
            .copied()
    }

    /// Decimal places of `token`.
    pub fn token_decimals(&self, token: Token) -> Option<u8> {
        self.tokens.get(&token).map(|t| t.decimals)
    }

    /// Explorer base URL of `chain`.
    pub fn explorer_url(&self, chain: Chain) -> Option<&str> {
        self.chains.get(&chain).map(|c| c.explorer_url.as_str())
    }
}

/// Environment variable naming the RPC endpoint of `chain`.
pub fn rpc_env_key(chain: Chain) -> &'static str {
    match chain {
        Chain::Ethereum => "ETHEREUM_RPC_URL",
        Chain::Base => "BASE_RPC_URL",
        Chain::Polygon => "POLYGON_RPC_URL",
        Chain::Arbitrum => "ARBITRUM_RPC_URL",
    }
}

fn default_rpc_url(chain: Chain) -> &'static str {
    match chain {
        Chain::Ethereum => "https://eth.llamarpc.com",
        Chain::Base => "https://mainnet.base.org",
        Chain::Polygon => "https://polygon-rpc.com",
        Chain::Arbitrum => "https://arb1.arbitrum.io/rpc",
    }
}

fn default_explorer_url(chain: Chain) -> &'static str {
    match chain {
        Chain::Ethereum => "https://etherscan.io",
        Chain::Base => "https://basescan.org",
        Chain::Polygon => "https://polygonscan.com",
        Chain::Arbitrum => "https://arbiscan.io",
    }
}

fn default_tokens() -> BTreeMap<Token, TokenConfig> {
    let table: [(Token, u8, &[(Chain, &str)]); 3] = [
        (
            Token::Usdc,
            6,
            &[
                (Chain::Ethereum, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
                (Chain::Base, "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
                (Chain::Polygon, "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"),
                (Chain::Arbitrum, "0xaf88d065e77c8cC2239327C5EDb3A432268e5831"),
            ],
        ),
        (
            Token::Usdt,
            6,
            &[
                (Chain::Ethereum, "0xdAC17F958D2ee523a2206206994597C13D831ec7"),
                (Chain::Polygon, "0xc2132D05D31c914a87C6611C10748AEb04B58e8F"),
                (Chain::Arbitrum, "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"),
            ],
        ),
        (
            Token::Dai,
            18,
            &[
                (Chain::Ethereum, "0x6B175474E89094C44Da98b954EedeAC495271d0F"),
                (Chain::Base, "0x50c5725949A6F0c72E6C4a641F24049A917DB0Cb"),
                (Chain::Polygon, "0x8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063"),
                (Chain::Arbitrum, "0xDA10009cBd5D07dd0CeCc66161FC93D7c9000da1"),
            ],
        ),
    ];

    table
        .iter()
        .map(|(token, decimals, deployments)| {
            let contracts = deployments
                .iter()
                .map(|(chain, addr)| {
                    let address = Address::from_str(addr).expect("built-in token addresses are valid");
                    (*chain, address)
                })
                .collect();
            (
                *token,
                TokenConfig {
                    decimals: *decimals,
                    contracts,
                },
            )
        })
        .collect()
}
