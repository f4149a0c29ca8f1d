//! RSA signing key material.
//!
//! [`KeyMaterialProvider`] provisions, persists and caches keypairs;
//! [`KeySource`] is the seam the token authority reads them through.

mod material;
mod provider;

pub use material::{fingerprint, KeySource, SigningKeys, StaticKeySource};
pub use provider::{
    validate_namespace, FileKeyArtifacts, KeyArtifacts, KeyMaterialProvider, KEY_BITS,
    MAX_LOAD_ATTEMPTS,
};
