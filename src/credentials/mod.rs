//! Password credentials keyed by identity.

mod hasher;
mod postgres;
mod repository;
mod store;

pub use hasher::CredentialHasher;
pub use postgres::PgCredentialRepository;
pub use repository::{CredentialRepository, InMemoryCredentialRepository, StoreError, StoreResult};
pub use store::CredentialStore;
