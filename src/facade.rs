//! Authority façade.
//!
//! Composes the credential store, token authority and key provider into the
//! operations served over RPC. A token is only ever issued after the
//! credential step succeeded, and credential errors are returned unchanged.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::config::Environment;
use crate::credentials::CredentialStore;
use crate::error::{AuthorityError, Result};
use crate::identity::Identity;
use crate::keys::{KeyMaterialProvider, KeySource};
use crate::metrics;
use crate::token::{IssuedToken, TokenAuthority};

/// Reason the reset operation requires.
pub const RESET_REASON: &str = "test";

/// Entry point for every authority operation.
pub struct AuthorityFacade {
    credentials: CredentialStore,
    tokens: TokenAuthority,
    keys: Arc<KeyMaterialProvider>,
    default_ttl: Duration,
    environment: Environment,
}

impl AuthorityFacade {
    /// Assemble the façade. Tokens are signed with `keys`' configured namespace.
    #[must_use]
    pub fn new(
        credentials: CredentialStore,
        keys: Arc<KeyMaterialProvider>,
        issuer: impl Into<String>,
        default_ttl: Duration,
        environment: Environment,
    ) -> Self {
        let source: Arc<dyn KeySource> = keys.clone();
        Self {
            credentials,
            tokens: TokenAuthority::new(source, issuer),
            keys,
            default_ttl,
            environment,
        }
    }

    /// Create a credential and issue a token for it.
    ///
    /// # Errors
    ///
    /// Credential errors from creation, or token signing errors.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn signup(
        &self,
        identity: &Identity,
        password: &str,
        ttl_secs: Option<u64>,
    ) -> Result<IssuedToken> {
        self.credentials.create_credential(identity, password).await?;
        info!("Credential created");
        self.issue(identity, ttl_secs, "signup")
    }

    /// Verify a credential and issue a token for it.
    ///
    /// # Errors
    ///
    /// Credential errors from verification, or token signing errors.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn login(
        &self,
        identity: &Identity,
        password: &str,
        ttl_secs: Option<u64>,
    ) -> Result<IssuedToken> {
        self.credentials.verify_credential(identity, password).await?;
        self.issue(identity, ttl_secs, "login")
    }

    /// Replace a password and issue a fresh token.
    ///
    /// # Errors
    ///
    /// Credential errors from the update, or token signing errors.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn change_password(
        &self,
        identity: &Identity,
        old_password: &str,
        new_password: &str,
        ttl_secs: Option<u64>,
    ) -> Result<IssuedToken> {
        self.credentials
            .update_credential(identity, old_password, new_password)
            .await?;
        info!("Password changed");
        self.issue(identity, ttl_secs, "change_password")
    }

    /// Remove a credential. Tokens already issued stay valid until expiry.
    ///
    /// # Errors
    ///
    /// [`AuthorityError::StoreFailure`] on backend faults.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn delete_account(&self, identity: &Identity) -> Result<()> {
        self.credentials.delete_credential(identity).await?;
        info!("Credential deleted");
        Ok(())
    }

    /// Check a credential without issuing a token.
    ///
    /// # Errors
    ///
    /// Credential errors from verification.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn verify_credentials(&self, identity: &Identity, password: &str) -> Result<()> {
        self.credentials.verify_credential(identity, password).await
    }

    /// Verify a token. The result echoes the token with its identity and expiry.
    ///
    /// # Errors
    ///
    /// Token verification errors.
    #[instrument(skip_all)]
    pub fn verify_token(&self, token: &str) -> Result<IssuedToken> {
        require_token(token)?;
        let claims = self.tokens.verify_claims(token, now())?;
        Ok(IssuedToken {
            identity: claims.identity(),
            token: token.to_string(),
            expires_at: claims.exp,
        })
    }

    /// Issue a replacement for a still-valid token.
    ///
    /// # Errors
    ///
    /// Token verification or signing errors.
    #[instrument(skip_all)]
    pub fn refresh_token(&self, token: &str, ttl_secs: Option<u64>) -> Result<IssuedToken> {
        require_token(token)?;
        let issued = self
            .tokens
            .refresh_token(token, now(), self.ttl_secs(ttl_secs))?;
        metrics::record_token_issued("refresh");
        info!(identity = %issued.identity, expires_at = issued.expires_at, "Token refreshed");
        Ok(issued)
    }

    /// DER public key of `namespace`, or of the signing namespace if empty.
    ///
    /// # Errors
    ///
    /// [`AuthorityError::PublicKeyUnavailable`] for unknown namespaces,
    /// [`AuthorityError::InvalidInput`] for invalid names.
    #[instrument(skip(self))]
    pub async fn export_public_key(&self, namespace: &str) -> Result<Vec<u8>> {
        let namespace = if namespace.is_empty() {
            self.keys.namespace().to_string()
        } else {
            namespace.to_string()
        };

        let keys = Arc::clone(&self.keys);
        tokio::task::spawn_blocking(move || keys.public_key_der(&namespace))
            .await
            .map_err(|e| {
                error!(error = %e, "Public key export task failed");
                AuthorityError::key_provisioning("public key export task failed")
            })?
    }

    /// Delete every credential. Only allowed with reason `"test"` in the test
    /// environment; otherwise the store is not touched.
    ///
    /// # Errors
    ///
    /// [`AuthorityError::InvalidOperationReason`] when refused.
    #[instrument(skip(self))]
    pub async fn reset(&self, reason: &str) -> Result<u64> {
        if reason != RESET_REASON || !self.environment.is_test() {
            warn!(environment = ?self.environment, "Credential reset refused");
            return Err(AuthorityError::InvalidOperationReason);
        }

        let removed = self.credentials.reset().await?;
        warn!(removed, "All credentials deleted");
        Ok(removed)
    }

    /// TTL applied when a request does not set one.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn issue(
        &self,
        identity: &Identity,
        ttl_secs: Option<u64>,
        operation: &str,
    ) -> Result<IssuedToken> {
        let now = now();
        let expires_at = now.saturating_add(self.ttl_secs(ttl_secs));
        let token = self
            .tokens
            .issue_token(identity, now, expires_at, rand::random())?;
        metrics::record_token_issued(operation);
        Ok(IssuedToken {
            identity: *identity,
            token,
            expires_at,
        })
    }

    fn ttl_secs(&self, requested: Option<u64>) -> i64 {
        let secs = match requested {
            Some(secs) if secs > 0 => secs,
            _ => self.default_ttl.as_secs(),
        };
        i64::try_from(secs).unwrap_or(i64::MAX)
    }
}

impl std::fmt::Debug for AuthorityFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityFacade")
            .field("tokens", &self.tokens)
            .field("keys", &self.keys)
            .field("default_ttl", &self.default_ttl)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

fn now() -> i64 {
    Utc::now().timestamp()
}

fn require_token(token: &str) -> Result<()> {
    if token.trim().is_empty() {
        return Err(AuthorityError::invalid_input("token must not be empty"));
    }
    Ok(())
}
