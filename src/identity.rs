//! Tenant-scoped identity.

use crate::error::AuthorityError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A credential subject within a tenant application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// User identifier
    pub user_id: Uuid,
    /// Tenant application identifier
    pub app_id: Uuid,
}

impl Identity {
    /// Create an identity from already-parsed ids.
    #[must_use]
    pub const fn new(user_id: Uuid, app_id: Uuid) -> Self {
        Self { user_id, app_id }
    }

    /// Parse an identity from its wire form.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::InvalidInput`] if either id is not a UUID.
    pub fn parse(user_id: &str, app_id: &str) -> Result<Self, AuthorityError> {
        let user_id = Uuid::parse_str(user_id.trim())
            .map_err(|_| AuthorityError::invalid_input("user_id must be a UUID"))?;
        let app_id = Uuid::parse_str(app_id.trim())
            .map_err(|_| AuthorityError::invalid_input("app_id must be a UUID"))?;
        Ok(Self { user_id, app_id })
    }

    /// Reject the nil UUID for either component.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::InvalidInput`] for nil ids.
    pub fn ensure_present(&self) -> Result<(), AuthorityError> {
        if self.user_id.is_nil() || self.app_id.is_nil() {
            return Err(AuthorityError::invalid_input("identity must not be empty"));
        }
        Ok(())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.app_id)
    }
}
