//! Error taxonomy for the credential authority.
//!
//! Every failure a caller can observe maps to one [`ErrorKind`]. Responses carry
//! the kind's stable code plus a sanitized message; driver and crypto library
//! text never leaves the process.

use thiserror::Error;

/// Authority errors.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AuthorityError {
    /// A credential already exists for the identity
    #[error("Credential already exists for this identity")]
    DuplicateIdentity,

    /// No credential exists for the identity
    #[error("Identity not found")]
    IdentityNotFound,

    /// The password does not match the stored hash
    #[error("Invalid password")]
    InvalidPassword,

    /// The hashing primitive failed
    #[error("Password hashing failed")]
    HashingFailure,

    /// The credential store failed
    #[error("Credential store unavailable")]
    StoreFailure,

    /// Token signature is invalid or the token is structurally malformed
    #[error("Invalid token or signature")]
    InvalidSignature,

    /// Token was signed with an algorithm other than the expected one
    #[error("Unexpected signing method: {alg}")]
    UnexpectedSigningMethod {
        /// Algorithm tag found in the token header
        alg: String,
    },

    /// Token claims are missing or mistyped
    #[error("Token claims malformed")]
    MalformedClaims,

    /// Token has expired
    #[error("Token expired at {expired_at}")]
    TokenExpired {
        /// Expiry timestamp (seconds since epoch)
        expired_at: i64,
    },

    /// Token signing failed
    #[error("Token signing failed")]
    SigningFailure,

    /// Signing key material could not be provisioned or loaded
    #[error("Key provisioning failed: {0}")]
    KeyProvisioningFailure(String),

    /// A destructive operation was requested without a valid reason
    #[error("Invalid reason. Flush DB only for testing")]
    InvalidOperationReason,

    /// A request field is empty or unparsable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No public key is available for the requested namespace
    #[error("Public key unavailable for namespace {namespace}")]
    PublicKeyUnavailable {
        /// Requested namespace
        namespace: String,
    },
}

/// Stable error kinds for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DuplicateIdentity,
    IdentityNotFound,
    InvalidPassword,
    HashingFailure,
    StoreFailure,
    InvalidSignature,
    UnexpectedSigningMethod,
    MalformedClaims,
    TokenExpired,
    SigningFailure,
    KeyProvisioningFailure,
    InvalidOperationReason,
    InvalidInput,
    PublicKeyUnavailable,
}

impl ErrorKind {
    /// Wire code for this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateIdentity => "DUPLICATE_IDENTITY",
            Self::IdentityNotFound => "IDENTITY_NOT_FOUND",
            Self::InvalidPassword => "INVALID_PASSWORD",
            Self::HashingFailure => "HASHING_FAILURE",
            Self::StoreFailure => "STORE_FAILURE",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::UnexpectedSigningMethod => "UNEXPECTED_SIGNING_METHOD",
            Self::MalformedClaims => "MALFORMED_CLAIMS",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::SigningFailure => "SIGNING_FAILURE",
            Self::KeyProvisioningFailure => "KEY_PROVISIONING_FAILURE",
            Self::InvalidOperationReason => "INVALID_OPERATION_REASON",
            Self::InvalidInput => "INVALID_INPUT",
            Self::PublicKeyUnavailable => "PUBLIC_KEY_UNAVAILABLE",
        }
    }

    /// Whether the kind stems from the credential subsystem.
    #[must_use]
    pub const fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateIdentity
                | Self::IdentityNotFound
                | Self::InvalidPassword
                | Self::HashingFailure
                | Self::StoreFailure
        )
    }

    /// Whether the kind stems from token verification or signing.
    #[must_use]
    pub const fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature
                | Self::UnexpectedSigningMethod
                | Self::MalformedClaims
                | Self::TokenExpired
                | Self::SigningFailure
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AuthorityError {
    /// Get the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateIdentity => ErrorKind::DuplicateIdentity,
            Self::IdentityNotFound => ErrorKind::IdentityNotFound,
            Self::InvalidPassword => ErrorKind::InvalidPassword,
            Self::HashingFailure => ErrorKind::HashingFailure,
            Self::StoreFailure => ErrorKind::StoreFailure,
            Self::InvalidSignature => ErrorKind::InvalidSignature,
            Self::UnexpectedSigningMethod { .. } => ErrorKind::UnexpectedSigningMethod,
            Self::MalformedClaims => ErrorKind::MalformedClaims,
            Self::TokenExpired { .. } => ErrorKind::TokenExpired,
            Self::SigningFailure => ErrorKind::SigningFailure,
            Self::KeyProvisioningFailure(_) => ErrorKind::KeyProvisioningFailure,
            Self::InvalidOperationReason => ErrorKind::InvalidOperationReason,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::PublicKeyUnavailable { .. } => ErrorKind::PublicKeyUnavailable,
        }
    }

    /// Message safe to return to remote callers.
    ///
    /// Provisioning failures carry filesystem detail, so they are reduced to
    /// a fixed string.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::KeyProvisioningFailure(_) => "Signing key unavailable".to_string(),
            other => other.to_string(),
        }
    }

    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a key provisioning error.
    #[must_use]
    pub fn key_provisioning(msg: impl Into<String>) -> Self {
        Self::KeyProvisioningFailure(msg.into())
    }
}

/// Result alias used across the crate.
pub type Result<T, E = AuthorityError> = std::result::Result<T, E>;
