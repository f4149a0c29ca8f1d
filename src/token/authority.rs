//! RS256 token issuance and verification.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{crypto, encode, Algorithm, Header};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};

use super::claims::TokenClaims;
use crate::error::{AuthorityError, Result};
use crate::identity::Identity;
use crate::keys::KeySource;
use crate::metrics;

/// The only accepted signing algorithm.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;
const SIGNING_ALGORITHM_TAG: &str = "RS256";

/// A freshly issued token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Identity the token asserts
    pub identity: Identity,
    /// Compact JWS
    pub token: String,
    /// Expiry (seconds since epoch)
    pub expires_at: i64,
}

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// Issues and verifies tokens with the keys of a [`KeySource`].
pub struct TokenAuthority {
    keys: Arc<dyn KeySource>,
    issuer: String,
}

impl TokenAuthority {
    /// Create an authority signing as `issuer`.
    #[must_use]
    pub fn new(keys: Arc<dyn KeySource>, issuer: impl Into<String>) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
        }
    }

    /// Issuer written into tokens.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign a token for `identity` valid from `now` until `expires_at`.
    ///
    /// # Errors
    ///
    /// [`AuthorityError::InvalidInput`] if `expires_at` is not after `now`,
    /// [`AuthorityError::SigningFailure`] on crypto faults and
    /// [`AuthorityError::KeyProvisioningFailure`] if no keys are available.
    pub fn issue_token(
        &self,
        identity: &Identity,
        now: i64,
        expires_at: i64,
        nonce: u64,
    ) -> Result<String> {
        if expires_at <= now {
            return Err(AuthorityError::invalid_input(
                "expiry must be later than issue time",
            ));
        }

        let keys = self.keys.current()?;
        let claims = TokenClaims::new(identity, self.issuer.as_str(), now, expires_at, nonce);

        let mut header = Header::new(SIGNING_ALGORITHM);
        header.kid = Some(keys.kid().to_string());

        encode(&header, &claims, keys.encoding_key()).map_err(|e| {
            error!(error = %e, "Token signing failed");
            AuthorityError::SigningFailure
        })
    }

    /// Verify a token and return the identity it asserts.
    ///
    /// Checks run in order and stop at the first failure: signature,
    /// algorithm tag, claims shape, expiry.
    ///
    /// # Errors
    ///
    /// [`AuthorityError::InvalidSignature`], [`AuthorityError::UnexpectedSigningMethod`],
    /// [`AuthorityError::MalformedClaims`] or [`AuthorityError::TokenExpired`].
    pub fn verify_token(&self, token: &str, now: i64) -> Result<Identity> {
        self.verify_claims(token, now).map(|claims| claims.identity())
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    ///
    /// As [`TokenAuthority::verify_token`].
    pub fn verify_claims(&self, token: &str, now: i64) -> Result<TokenClaims> {
        let result = self.check(token, now);
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind().as_str(),
        };
        metrics::record_token_verification(outcome);
        result
    }

    /// Issue a replacement for a still-valid token.
    ///
    /// The new token asserts the same identity, expires at `now + ttl_secs`
    /// and never equals the old one. The old token is left untouched.
    ///
    /// # Errors
    ///
    /// Any [`TokenAuthority::verify_token`] error for `token`, or an
    /// [`TokenAuthority::issue_token`] error.
    pub fn refresh_token(&self, token: &str, now: i64, ttl_secs: i64) -> Result<IssuedToken> {
        let claims = self.verify_claims(token, now)?;
        let identity = claims.identity();
        let expires_at = now.saturating_add(ttl_secs);

        let nonce = loop {
            let candidate = rand::random::<u64>();
            if candidate != claims.nonce {
                break candidate;
            }
        };

        let token = self.issue_token(&identity, now, expires_at, nonce)?;
        Ok(IssuedToken {
            identity,
            token,
            expires_at,
        })
    }

    fn check(&self, token: &str, now: i64) -> Result<TokenClaims> {
        let keys = self.keys.current()?;

        let mut segments = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(AuthorityError::InvalidSignature);
        };

        let message = &token[..header.len() + 1 + payload.len()];
        match crypto::verify(signature, message.as_bytes(), keys.decoding_key(), SIGNING_ALGORITHM) {
            Ok(true) => {}
            Ok(false) => return Err(AuthorityError::InvalidSignature),
            Err(e) => {
                debug!(error = %e, "Token signature check failed");
                return Err(AuthorityError::InvalidSignature);
            }
        }

        let header: RawHeader =
            decode_segment(header).map_err(|()| AuthorityError::InvalidSignature)?;
        if header.alg != SIGNING_ALGORITHM_TAG {
            return Err(AuthorityError::UnexpectedSigningMethod { alg: header.alg });
        }

        let claims: TokenClaims =
            decode_segment(payload).map_err(|()| AuthorityError::MalformedClaims)?;
        if claims.is_expired(now) {
            return Err(AuthorityError::TokenExpired {
                expired_at: claims.exp,
            });
        }

        Ok(claims)
    }
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> std::result::Result<T, ()> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|_| ())?;
    serde_json::from_slice(&bytes).map_err(|_| ())
}
