use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::Identity;

/// Claims carried by every token.
///
/// All fields are required; a token whose payload lacks one or carries the
/// wrong type does not decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User identifier
    pub sub: Uuid,
    /// Tenant application identifier
    pub aud: Uuid,
    /// Issuer
    pub iss: String,
    /// Issued at (seconds since epoch)
    pub iat: i64,
    /// Not before (seconds since epoch)
    pub nbf: i64,
    /// Expiry (seconds since epoch)
    pub exp: i64,
    /// Random value distinguishing tokens minted in the same second
    pub nonce: u64,
}

impl TokenClaims {
    /// Claims for `identity`, valid from `now` until `expires_at`.
    #[must_use]
    pub fn new(
        identity: &Identity,
        issuer: impl Into<String>,
        now: i64,
        expires_at: i64,
        nonce: u64,
    ) -> Self {
        Self {
            sub: identity.user_id,
            aud: identity.app_id,
            iss: issuer.into(),
            iat: now,
            nbf: now,
            exp: expires_at,
            nonce,
        }
    }

    /// Identity asserted by these claims.
    #[must_use]
    pub const fn identity(&self) -> Identity {
        Identity::new(self.sub, self.aud)
    }

    /// Whether the claims have expired at `now`.
    #[must_use]
    pub const fn is_expired(&self, now: i64) -> bool {
        self.exp <= now
    }
}
