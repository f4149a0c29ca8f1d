//! Signing keypair provisioning and loading.
//!
//! Keys live as two PEM artifacts per namespace:
//! `<root>/<namespace>/private.pem` (PKCS#1) and `<root>/<namespace>/public.pem`
//! (SubjectPublicKeyInfo). The private artifact is the source of truth.

use parking_lot::{Mutex, RwLock};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::RsaPublicKey;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::material::{KeySource, SigningKeys};
use crate::error::{AuthorityError, Result};
use crate::metrics;

/// RSA modulus size of provisioned keys.
pub const KEY_BITS: usize = 2048;

/// Failed reads tolerated over the process lifetime before loading gives up.
pub const MAX_LOAD_ATTEMPTS: u32 = 5;

const PRIVATE_FILE: &str = "private.pem";
const PUBLIC_FILE: &str = "public.pem";
const MAX_NAMESPACE_LEN: usize = 64;

/// Persistence of key artifacts.
pub trait KeyArtifacts: Send + Sync {
    /// Read the private key PEM.
    ///
    /// # Errors
    ///
    /// Any I/O error, including a missing artifact.
    fn read_private(&self, namespace: &str) -> io::Result<String>;

    /// Read the public key PEM, `None` if the artifact does not exist.
    ///
    /// # Errors
    ///
    /// I/O errors other than not-found.
    fn read_public(&self, namespace: &str) -> io::Result<Option<String>>;

    /// Replace the private key PEM, owner-readable only.
    ///
    /// # Errors
    ///
    /// Any I/O error.
    fn write_private(&self, namespace: &str, pem: &str) -> io::Result<()>;

    /// Replace the public key PEM.
    ///
    /// # Errors
    ///
    /// Any I/O error.
    fn write_public(&self, namespace: &str, pem: &str) -> io::Result<()>;
}

/// Key artifacts on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileKeyArtifacts {
    root: PathBuf,
}

impl FileKeyArtifacts {
    /// Artifacts under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of a namespace's artifact.
    #[must_use]
    pub fn path(&self, namespace: &str, file: &str) -> PathBuf {
        self.root.join(namespace).join(file)
    }

    /// Path of a namespace's private artifact.
    #[must_use]
    pub fn private_path(&self, namespace: &str) -> PathBuf {
        self.path(namespace, PRIVATE_FILE)
    }

    /// Path of a namespace's public artifact.
    #[must_use]
    pub fn public_path(&self, namespace: &str) -> PathBuf {
        self.path(namespace, PUBLIC_FILE)
    }

    fn write(&self, path: &Path, contents: &str, mode: u32) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }

        let mut file = options.open(path)?;
        // mode only applies on creation
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(mode))?;
        }
        #[cfg(not(unix))]
        let _ = mode;

        file.write_all(contents.as_bytes())?;
        file.sync_all()
    }
}

impl KeyArtifacts for FileKeyArtifacts {
    fn read_private(&self, namespace: &str) -> io::Result<String> {
        fs::read_to_string(self.private_path(namespace))
    }

    fn read_public(&self, namespace: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.public_path(namespace)) {
            Ok(pem) => Ok(Some(pem)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_private(&self, namespace: &str, pem: &str) -> io::Result<()> {
        self.write(&self.private_path(namespace), pem, 0o600)
    }

    fn write_public(&self, namespace: &str, pem: &str) -> io::Result<()> {
        self.write(&self.public_path(namespace), pem, 0o644)
    }
}

/// Owns the signing keypairs of the authority.
///
/// Loaded keys are cached per namespace for the process lifetime. Loading and
/// provisioning are serialized so concurrent first requests produce one
/// keypair.
pub struct KeyMaterialProvider {
    artifacts: Arc<dyn KeyArtifacts>,
    namespace: String,
    key_bits: usize,
    max_attempts: u32,
    failed_reads: AtomicU32,
    cache: RwLock<HashMap<String, Arc<SigningKeys>>>,
    load_lock: Mutex<()>,
}

impl KeyMaterialProvider {
    /// Provider for artifacts under `root`, signing with `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::InvalidInput`] for an invalid namespace.
    pub fn new(root: impl Into<PathBuf>, namespace: impl Into<String>) -> Result<Self> {
        Self::with_artifacts(Arc::new(FileKeyArtifacts::new(root)), namespace)
    }

    /// Provider over an arbitrary artifact store.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::InvalidInput`] for an invalid namespace.
    pub fn with_artifacts(
        artifacts: Arc<dyn KeyArtifacts>,
        namespace: impl Into<String>,
    ) -> Result<Self> {
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        Ok(Self {
            artifacts,
            namespace,
            key_bits: KEY_BITS,
            max_attempts: MAX_LOAD_ATTEMPTS,
            failed_reads: AtomicU32::new(0),
            cache: RwLock::new(HashMap::new()),
            load_lock: Mutex::new(()),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    /// Namespace used for signing.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Failed artifact reads so far.
    #[must_use]
    pub fn failed_reads(&self) -> u32 {
        self.failed_reads.load(Ordering::SeqCst)
    }

    /// Load the keys of `namespace`, provisioning them when absent or unreadable.
    ///
    /// May generate a keypair; call from a blocking context.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::KeyProvisioningFailure`] when artifacts cannot
    /// be written or reads keep failing past the attempt ceiling, and
    /// [`AuthorityError::InvalidInput`] for an invalid namespace.
    pub fn load(&self, namespace: &str) -> Result<Arc<SigningKeys>> {
        validate_namespace(namespace)?;
        if let Some(keys) = self.cached(namespace) {
            return Ok(keys);
        }

        let _guard = self.load_lock.lock();
        if let Some(keys) = self.cached(namespace) {
            return Ok(keys);
        }

        loop {
            match self.read_private(namespace) {
                Ok(keys) => {
                    self.sync_public(namespace, &keys)?;
                    let keys = Arc::new(keys);
                    self.cache
                        .write()
                        .insert(namespace.to_string(), Arc::clone(&keys));
                    metrics::record_key_event("loaded");
                    info!(namespace, kid = keys.kid(), "Signing keys loaded");
                    return Ok(keys);
                }
                Err(reason) => {
                    let failures = self.failed_reads.fetch_add(1, Ordering::SeqCst) + 1;
                    metrics::record_key_event("read_failed");
                    warn!(namespace, failures, reason = %reason, "Signing key read failed");

                    if failures > self.max_attempts {
                        return Err(AuthorityError::key_provisioning(format!(
                            "giving up on namespace {namespace} after {failures} failed reads: {reason}"
                        )));
                    }
                    self.provision_locked(namespace)?;
                }
            }
        }
    }

    /// Generate and persist a fresh keypair for `namespace`, replacing any
    /// existing one. Tokens signed with the previous key stop verifying.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::KeyProvisioningFailure`] if generation or
    /// writing fails.
    pub fn provision(&self, namespace: &str) -> Result<Arc<SigningKeys>> {
        validate_namespace(namespace)?;
        let _guard = self.load_lock.lock();
        let keys = Arc::new(self.provision_locked(namespace)?);
        self.cache
            .write()
            .insert(namespace.to_string(), Arc::clone(&keys));
        Ok(keys)
    }

    /// DER public key of `namespace`. Never provisions.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::PublicKeyUnavailable`] if the namespace has no
    /// readable public key.
    pub fn public_key_der(&self, namespace: &str) -> Result<Vec<u8>> {
        validate_namespace(namespace)?;
        if let Some(keys) = self.cached(namespace) {
            return Ok(keys.public_key_der().to_vec());
        }

        let unavailable = || AuthorityError::PublicKeyUnavailable {
            namespace: namespace.to_string(),
        };

        let pem = match self.artifacts.read_public(namespace) {
            Ok(Some(pem)) => pem,
            Ok(None) => return Err(unavailable()),
            Err(e) => {
                warn!(namespace, error = %e, "Public key read failed");
                return Err(unavailable());
            }
        };

        RsaPublicKey::from_public_key_pem(&pem)
            .and_then(|key| key.to_public_key_der())
            .map(|der| der.as_bytes().to_vec())
            .map_err(|e| {
                warn!(namespace, error = %e, "Public key artifact malformed");
                unavailable()
            })
    }

    fn cached(&self, namespace: &str) -> Option<Arc<SigningKeys>> {
        self.cache.read().get(namespace).cloned()
    }

    fn read_private(&self, namespace: &str) -> std::result::Result<SigningKeys, String> {
        let pem = self
            .artifacts
            .read_private(namespace)
            .map_err(|e| e.to_string())?;
        SigningKeys::from_private_pem(&pem).map_err(|e| e.to_string())
    }

    fn sync_public(&self, namespace: &str, keys: &SigningKeys) -> Result<()> {
        let current = match self.artifacts.read_public(namespace) {
            Ok(current) => current,
            Err(e) => {
                warn!(namespace, error = %e, "Public key read failed, rewriting");
                None
            }
        };
        if current.is_some_and(|pem| keys.matches_public_pem(&pem)) {
            return Ok(());
        }

        self.artifacts
            .write_public(namespace, keys.public_key_pem())
            .map_err(|e| AuthorityError::key_provisioning(format!("write public key: {e}")))?;
        metrics::record_key_event("repaired");
        info!(namespace, kid = keys.kid(), "Public key artifact rewritten");
        Ok(())
    }

    fn provision_locked(&self, namespace: &str) -> Result<SigningKeys> {
        let (keys, private_pem) = SigningKeys::generate(self.key_bits)?;

        self.artifacts
            .write_private(namespace, &private_pem)
            .map_err(|e| AuthorityError::key_provisioning(format!("write private key: {e}")))?;
        self.artifacts
            .write_public(namespace, keys.public_key_pem())
            .map_err(|e| AuthorityError::key_provisioning(format!("write public key: {e}")))?;

        metrics::record_key_event("provisioned");
        info!(namespace, kid = keys.kid(), bits = self.key_bits, "Signing keys provisioned");
        Ok(keys)
    }
}

impl KeySource for KeyMaterialProvider {
    fn current(&self) -> Result<Arc<SigningKeys>> {
        self.load(&self.namespace)
    }
}

impl std::fmt::Debug for KeyMaterialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterialProvider")
            .field("namespace", &self.namespace)
            .field("key_bits", &self.key_bits)
            .field("failed_reads", &self.failed_reads())
            .finish_non_exhaustive()
    }
}

/// Namespaces become directory names, so only `[A-Za-z0-9_-]{1,64}` is allowed.
///
/// # Errors
///
/// Returns [`AuthorityError::InvalidInput`] otherwise.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    let valid = !namespace.is_empty()
        && namespace.len() <= MAX_NAMESPACE_LEN
        && namespace
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(AuthorityError::invalid_input(
            "namespace must match [A-Za-z0-9_-]{1,64}",
        ))
    }
}
