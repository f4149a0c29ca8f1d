//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use credential_authority::config::{Environment, HashCost};
use credential_authority::credentials::{
    CredentialHasher, CredentialRepository, CredentialStore, InMemoryCredentialRepository,
};
use credential_authority::keys::{KeyMaterialProvider, SigningKeys, StaticKeySource};
use credential_authority::token::TokenAuthority;
use credential_authority::{AuthorityFacade, Identity};

pub const FIXTURE_PRIVATE: &str = include_str!("../fixtures/token/private.pem");
pub const FIXTURE_PUBLIC: &str = include_str!("../fixtures/token/public.pem");
pub const OTHER_PRIVATE: &str = include_str!("../fixtures/other/private.pem");

pub const ISSUER: &str = "credential-authority-test";
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

pub fn identity() -> Identity {
    Identity::new(Uuid::new_v4(), Uuid::new_v4())
}

pub fn fixture_keys() -> SigningKeys {
    SigningKeys::from_private_pem(FIXTURE_PRIVATE).unwrap()
}

pub fn other_keys() -> SigningKeys {
    SigningKeys::from_private_pem(OTHER_PRIVATE).unwrap()
}

pub fn authority_with(keys: SigningKeys) -> TokenAuthority {
    TokenAuthority::new(Arc::new(StaticKeySource::new(keys)), ISSUER)
}

pub fn authority() -> TokenAuthority {
    authority_with(fixture_keys())
}

pub fn cheap_hasher() -> CredentialHasher {
    CredentialHasher::new(HashCost {
        time_cost: 1,
        memory_kib: 64,
        parallelism: 1,
    })
    .unwrap()
}

pub fn store() -> CredentialStore {
    store_over(Arc::new(InMemoryCredentialRepository::new()))
}

pub fn store_over(repository: Arc<dyn CredentialRepository>) -> CredentialStore {
    CredentialStore::new(repository, cheap_hasher())
}

/// Key directory holding the fixture keypair under the `token` namespace.
pub fn fixture_key_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let namespace = dir.path().join("token");
    fs::create_dir_all(&namespace).unwrap();
    fs::write(namespace.join("private.pem"), FIXTURE_PRIVATE).unwrap();
    fs::write(namespace.join("public.pem"), FIXTURE_PUBLIC).unwrap();
    dir
}

pub struct TestFacade {
    pub facade: Arc<AuthorityFacade>,
    pub keys: Arc<KeyMaterialProvider>,
    pub repository: Arc<InMemoryCredentialRepository>,
    _dir: TempDir,
}

pub fn facade(environment: Environment) -> TestFacade {
    let dir = fixture_key_dir();
    let keys = Arc::new(KeyMaterialProvider::new(dir.path(), "token").unwrap());
    let repository = Arc::new(InMemoryCredentialRepository::new());
    let facade = AuthorityFacade::new(
        store_over(repository.clone()),
        keys.clone(),
        ISSUER,
        DEFAULT_TTL,
        environment,
    );
    TestFacade {
        facade: Arc::new(facade),
        keys,
        repository,
        _dir: dir,
    }
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
