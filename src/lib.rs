//! Credential authority library.
//!
//! Stores password credentials keyed by tenant-scoped identity and issues
//! RS256 tokens that any holder of the public key can verify.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod credentials;
pub mod error;
pub mod facade;
pub mod grpc;
pub mod identity;
pub mod keys;
pub mod metrics;
pub mod observability;
pub mod shutdown;
pub mod token;

/// Generated protobuf types.
#[allow(missing_docs, clippy::all)]
pub mod proto {
    /// `auth.*` packages.
    pub mod auth {
        /// `auth.v1`.
        pub mod v1 {
            tonic::include_proto!("auth.v1");
        }
    }
}

// Re-exports for convenience
pub use config::Config;
pub use error::{AuthorityError, ErrorKind};
pub use facade::AuthorityFacade;
pub use identity::Identity;
pub use token::IssuedToken;
