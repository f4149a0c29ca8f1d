//! Credential store: hashing discipline over a repository.

use std::sync::Arc;
use tracing::{debug, error};
use zeroize::Zeroizing;

use super::hasher::CredentialHasher;
use super::repository::{CredentialRepository, StoreError};
use crate::error::{AuthorityError, Result};
use crate::identity::Identity;
use crate::metrics;

/// Creates, verifies, updates and deletes password credentials.
#[derive(Clone)]
pub struct CredentialStore {
    repository: Arc<dyn CredentialRepository>,
    hasher: Arc<CredentialHasher>,
}

impl CredentialStore {
    /// Create a store over `repository`.
    #[must_use]
    pub fn new(repository: Arc<dyn CredentialRepository>, hasher: CredentialHasher) -> Self {
        Self {
            repository,
            hasher: Arc::new(hasher),
        }
    }

    /// Store a new credential.
    ///
    /// # Errors
    ///
    /// [`AuthorityError::DuplicateIdentity`] if the identity already has one,
    /// [`AuthorityError::HashingFailure`] or [`AuthorityError::StoreFailure`]
    /// on faults, [`AuthorityError::InvalidInput`] for empty input.
    pub async fn create_credential(&self, identity: &Identity, password: &str) -> Result<()> {
        let result: Result<()> = async {
            validate(identity, password)?;
            let hash = self.hash(password).await?;
            self.repository
                .insert(identity, &hash)
                .await
                .map_err(|e| store_err("create", e))
        }
        .await;
        observe("create", result)
    }

    /// Check a password against the stored credential.
    ///
    /// # Errors
    ///
    /// [`AuthorityError::IdentityNotFound`] if no credential exists,
    /// [`AuthorityError::InvalidPassword`] on mismatch.
    pub async fn verify_credential(&self, identity: &Identity, password: &str) -> Result<()> {
        let result = self.check(identity, password).await;
        observe("verify", result)
    }

    /// Replace a password after proving knowledge of the old one.
    ///
    /// # Errors
    ///
    /// Any [`CredentialStore::verify_credential`] error for `old`, unchanged.
    /// [`AuthorityError::IdentityNotFound`] if the credential disappeared
    /// before the write.
    pub async fn update_credential(&self, identity: &Identity, old: &str, new: &str) -> Result<()> {
        let result: Result<()> = async {
            self.check(identity, old).await?;
            validate(identity, new)?;
            let hash = self.hash(new).await?;
            let updated = self
                .repository
                .update_hash(identity, &hash)
                .await
                .map_err(|e| store_err("update", e))?;
            if updated {
                Ok(())
            } else {
                Err(AuthorityError::IdentityNotFound)
            }
        }
        .await;
        observe("update", result)
    }

    /// Remove a credential. Succeeds whether or not one existed.
    ///
    /// # Errors
    ///
    /// [`AuthorityError::StoreFailure`] on backend faults.
    pub async fn delete_credential(&self, identity: &Identity) -> Result<()> {
        let result: Result<()> = async {
            identity.ensure_present()?;
            let removed = self
                .repository
                .delete(identity)
                .await
                .map_err(|e| store_err("delete", e))?;
            debug!(%identity, removed, "Credential delete");
            Ok(())
        }
        .await;
        observe("delete", result)
    }

    /// Remove every credential.
    pub(crate) async fn reset(&self) -> Result<u64> {
        let result = self
            .repository
            .delete_all()
            .await
            .map_err(|e| store_err("reset", e));
        observe("reset", result)
    }

    async fn check(&self, identity: &Identity, password: &str) -> Result<()> {
        validate(identity, password)?;
        let stored = self
            .repository
            .find_hash(identity)
            .await
            .map_err(|e| store_err("verify", e))?;

        let hasher = Arc::clone(&self.hasher);
        let password = Zeroizing::new(password.to_string());

        let Some(hash) = stored else {
            blocking(move || {
                hasher.verify_dummy(&password);
                Ok(())
            })
            .await?;
            return Err(AuthorityError::IdentityNotFound);
        };

        let matches = blocking(move || hasher.verify(&password, &hash)).await?;
        if matches {
            Ok(())
        } else {
            Err(AuthorityError::InvalidPassword)
        }
    }

    async fn hash(&self, password: &str) -> Result<String> {
        let hasher = Arc::clone(&self.hasher);
        let password = Zeroizing::new(password.to_string());
        blocking(move || hasher.hash(&password)).await
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}

/// Run hashing work off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!(error = %e, "Hashing task failed");
        AuthorityError::HashingFailure
    })?
}

fn validate(identity: &Identity, password: &str) -> Result<()> {
    identity.ensure_present()?;
    if password.is_empty() {
        return Err(AuthorityError::invalid_input("password must not be empty"));
    }
    Ok(())
}

fn store_err(operation: &'static str, e: StoreError) -> AuthorityError {
    match e {
        StoreError::Duplicate => AuthorityError::DuplicateIdentity,
        StoreError::Backend(detail) => {
            error!(operation, error = %detail, "Credential store failure");
            AuthorityError::StoreFailure
        }
    }
}

fn observe<T>(operation: &str, result: Result<T>) -> Result<T> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.kind().as_str(),
    };
    metrics::record_credential_operation(operation, outcome);
    result
}
