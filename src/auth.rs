//! Owner authorization.
//!
//! A request is authorized when its owner credential matches the configured
//! one and, if an identity service is configured, that service accepts it too.

use crate::config::{AuthMode, Secret};
use crate::errors::{IdentityError, PaymentError, Result};
use crate::utils::secrets_match;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use url::Url;

/// Header the identity service expects the credential in.
pub const IDENTITY_CREDENTIAL_HEADER: &str = "x-api-key";

/// Outcome of a successful authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// The credential matched (and the identity service accepted it, if configured)
    Owner,
    /// No credential is configured and the service runs in open mode
    Unchecked,
}

/// External identity service consulted after a credential matches.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Confirms that `credential` belongs to a known user.
    async fn verify(&self, credential: &str) -> std::result::Result<(), IdentityError>;
}

/// Identity verifier calling `GET {base}/v1/users/me`.
#[derive(Clone)]
pub struct HttpIdentityVerifier {
    base_url: Url,
    http_client: Client,
}

impl HttpIdentityVerifier {
    /// Creates a verifier for the identity service at `base_url`.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            http_client: Client::new(),
        }
    }

    /// Sets a custom HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    fn me_url(&self) -> String {
        format!("{}/v1/users/me", self.base_url.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify(&self, credential: &str) -> std::result::Result<(), IdentityError> {
        let response = self
            .http_client
            .get(self.me_url())
            .header(IDENTITY_CREDENTIAL_HEADER, credential)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IdentityError::Rejected(response.status().as_u16()));
        }

        Ok(())
    }
}

/// Checks owner credentials on incoming requests.
#[derive(Clone)]
pub struct OwnerAuthorizer {
    expected: Option<Secret>,
    mode: AuthMode,
    identity: Option<Arc<dyn IdentityVerifier>>,
}

impl OwnerAuthorizer {
    /// Creates an authorizer for the configured credential and mode.
    pub fn new(expected: Option<Secret>, mode: AuthMode) -> Self {
        Self {
            expected,
            mode,
            identity: None,
        }
    }

    /// Also requires `verifier` to accept each matched credential.
    pub fn with_identity_verifier(mut self, verifier: Arc<dyn IdentityVerifier>) -> Self {
        self.identity = Some(verifier);
        self
    }

    /// Authorizes a request carrying `credential`.
    pub async fn authorize(&self, credential: Option<&str>) -> Result<Authorization> {
        let Some(expected) = &self.expected else {
            return match self.mode {
                AuthMode::Open => {
                    tracing::warn!(
                        "No owner credential configured; accepting unauthenticated payment request"
                    );
                    Ok(Authorization::Unchecked)
                }
                AuthMode::Required => {
                    tracing::error!("No owner credential configured; rejecting payment request");
                    Err(PaymentError::Misconfigured(
                        "owner credential is not configured".to_string(),
                    ))
                }
            };
        };

        let credential = credential
            .filter(|c| !c.is_empty())
            .ok_or(PaymentError::MissingCredential)?;

        if !secrets_match(credential, expected.expose()) {
            tracing::warn!("Owner credential mismatch");
            return Err(PaymentError::Unauthorized(
                "invalid owner credential".to_string(),
            ));
        }

        if let Some(identity) = &self.identity {
            match identity.verify(credential).await {
                Ok(()) => {}
                Err(IdentityError::Rejected(status)) => {
                    tracing::warn!(status, "Identity service rejected owner credential");
                    return Err(PaymentError::Unauthorized(
                        "credential rejected by identity service".to_string(),
                    ));
                }
                Err(IdentityError::Transport(e)) => {
                    tracing::error!(error = %e, "Identity service unreachable");
                    return Err(PaymentError::Unauthorized(
                        "credential could not be verified".to_string(),
                    ));
                }
            }
        }

        Ok(Authorization::Owner)
    }
}
