//! Password hashing and verification using Argon2id.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use once_cell::sync::OnceCell;
use tracing::error;

use crate::config::HashCost;
use crate::error::{AuthorityError, Result};

/// Argon2id hasher with a fixed work factor.
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    dummy_hash: OnceCell<String>,
}

impl CredentialHasher {
    /// Create a hasher for the given cost.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::InvalidInput`] if argon2 rejects the parameters.
    pub fn new(cost: HashCost) -> Result<Self> {
        let params = Params::new(cost.memory_kib, cost.time_cost, cost.parallelism, None)
            .map_err(|e| AuthorityError::invalid_input(format!("hash parameters: {e}")))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            dummy_hash: OnceCell::new(),
        })
    }

    /// Hash a password into a PHC string (algorithm, parameters, salt, digest).
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::HashingFailure`] if the primitive fails.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| {
                error!(error = %e, "Password hashing failed");
                AuthorityError::HashingFailure
            })
    }

    /// Verify a password against a stored PHC string.
    ///
    /// The parameters embedded in the hash are used, so hashes made under an
    /// older cost keep verifying.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::HashingFailure`] for an unparsable hash or a
    /// primitive fault. A mismatch is `Ok(false)`.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "Stored password hash malformed");
            AuthorityError::HashingFailure
        })?;

        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => {
                error!(error = %e, "Password verification failed");
                Err(AuthorityError::HashingFailure)
            }
        }
    }

    /// Spend one verification on a throwaway hash.
    ///
    /// Used when no credential exists so the miss costs the same as a wrong
    /// password.
    pub fn verify_dummy(&self, password: &str) {
        let hash = self
            .dummy_hash
            .get_or_try_init(|| self.hash("credential-authority-dummy"));
        if let Ok(hash) = hash {
            let _ = self.verify(password, hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> CredentialHasher {
        CredentialHasher::new(HashCost {
            time_cost: 1,
            memory_kib: 64,
            parallelism: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = cheap();
        let hash = hasher.hash("correct-horse-battery-staple").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct-horse-battery-staple", &hash).unwrap());
        assert!(!hasher.verify("wrong-password", &hash).unwrap());
    }

    #[test]
    fn test_different_salts() {
        let hasher = cheap();
        let hash1 = hasher.hash("same-password").unwrap();
        let hash2 = hasher.hash("same-password").unwrap();

        assert_ne!(hash1, hash2);
        assert!(hasher.verify("same-password", &hash1).unwrap());
        assert!(hasher.verify("same-password", &hash2).unwrap());
    }

    #[test]
    fn test_hash_does_not_contain_password() {
        let hash = cheap().hash("plaintext-secret").unwrap();
        assert!(!hash.contains("plaintext-secret"));
    }

    #[test]
    fn test_verify_with_embedded_parameters() {
        let strong = CredentialHasher::new(HashCost {
            time_cost: 2,
            memory_kib: 128,
            parallelism: 1,
        })
        .unwrap();
        let hash = strong.hash("pw").unwrap();
        assert!(cheap().verify("pw", &hash).unwrap());
    }

    #[test]
    fn test_invalid_hash_format() {
        let err = cheap().verify("password", "not-a-valid-hash").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::HashingFailure);
    }

    #[test]
    fn test_invalid_parameters() {
        let result = CredentialHasher::new(HashCost {
            time_cost: 0,
            memory_kib: 64,
            parallelism: 1,
        });
        assert!(result.is_err());
    }
}
