//! Credential persistence.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

use crate::identity::Identity;

/// Repository errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A row for the identity already exists
    #[error("Credential already exists")]
    Duplicate,

    /// The backend failed; carries driver detail for logs only
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result alias for repository calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage of password hashes keyed by identity.
///
/// Uniqueness of identities is the backend's responsibility.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Insert a new credential. [`StoreError::Duplicate`] if it exists.
    async fn insert(&self, identity: &Identity, password_hash: &str) -> StoreResult<()>;

    /// Stored hash for an identity.
    async fn find_hash(&self, identity: &Identity) -> StoreResult<Option<String>>;

    /// Overwrite the hash of an existing credential. `false` if no row matched.
    async fn update_hash(&self, identity: &Identity, password_hash: &str) -> StoreResult<bool>;

    /// Delete a credential. `false` if no row matched.
    async fn delete(&self, identity: &Identity) -> StoreResult<bool>;

    /// Delete every credential, returning the number removed.
    async fn delete_all(&self) -> StoreResult<u64>;
}

/// Process-local repository for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryCredentialRepository {
    rows: RwLock<HashMap<Identity, String>>,
}

impl InMemoryCredentialRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Whether the repository is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn insert(&self, identity: &Identity, password_hash: &str) -> StoreResult<()> {
        let mut rows = self.rows.write();
        if rows.contains_key(identity) {
            return Err(StoreError::Duplicate);
        }
        rows.insert(*identity, password_hash.to_string());
        Ok(())
    }

    async fn find_hash(&self, identity: &Identity) -> StoreResult<Option<String>> {
        Ok(self.rows.read().get(identity).cloned())
    }

    async fn update_hash(&self, identity: &Identity, password_hash: &str) -> StoreResult<bool> {
        Ok(self
            .rows
            .write()
            .get_mut(identity)
            .map(|hash| *hash = password_hash.to_string())
            .is_some())
    }

    async fn delete(&self, identity: &Identity) -> StoreResult<bool> {
        Ok(self.rows.write().remove(identity).is_some())
    }

    async fn delete_all(&self) -> StoreResult<u64> {
        let mut rows = self.rows.write();
        let count = rows.len() as u64;
        rows.clear();
        Ok(count)
    }
}
