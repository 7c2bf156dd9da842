//! Certificate artifacts written for the workload.
//!
//! After bootstrap the issued material is polled from the secret store and
//! written as three PEM files. Writers take an exclusive lock on a sibling
//! lock file and readers a shared one, so a reader never sees a certificate
//! from one issuance next to a key from another.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use tracing::{info, warn};

use certvault_pki::{Certificate, CertificateMaterial, PrivateKeyPem};
use certvault_store::{SecretStore, StoreError};

use crate::error::{BrokerError, BrokerResult};

/// Default directory shared with the workload container.
pub const DEFAULT_SECRETS_DIR: &str = "/var/run/secrets/vaultproject.io";

/// Interval between certificate polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

const CERT_FILE: &str = "cert.pem";
const CA_CERT_FILE: &str = "ca-cert.pem";
const PRIVATE_KEY_FILE: &str = "private.pem";
const TOKEN_FILE: &str = "secret.json";
const LOCK_FILE: &str = ".certs.lock";

/// File layout inside the secrets directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    dir: PathBuf,
}

impl ArtifactPaths {
    /// Creates the layout rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The secrets directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Leaf certificate file.
    #[must_use]
    pub fn certificate(&self) -> PathBuf {
        self.dir.join(CERT_FILE)
    }

    /// Issuing CA file.
    #[must_use]
    pub fn issuing_ca(&self) -> PathBuf {
        self.dir.join(CA_CERT_FILE)
    }

    /// Private key file.
    #[must_use]
    pub fn private_key(&self) -> PathBuf {
        self.dir.join(PRIVATE_KEY_FILE)
    }

    /// Bootstrap marker file.
    #[must_use]
    pub fn marker(&self) -> PathBuf {
        self.dir.join(TOKEN_FILE)
    }

    fn lock_file(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Removes the three certificate files, logging anything that fails.
    pub fn remove_certificates(&self) {
        for path in [self.certificate(), self.issuing_ca(), self.private_key()] {
            match std::fs::remove_file(&path) {
                Ok(()) => info!(path = %path.display(), "removed certificate file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove file"),
            }
        }
    }

    fn open_lock(&self) -> BrokerResult<File> {
        Ok(OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_file())?)
    }
}

/// The three PEM artifacts of one issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    /// Leaf certificate.
    pub certificate: String,
    /// Issuing CA.
    pub issuing_ca: String,
    /// Private key.
    pub private_key: PrivateKeyPem,
}

impl CertificateBundle {
    /// Extracts the artifacts from stored material.
    #[must_use]
    pub fn from_material(material: &CertificateMaterial) -> Self {
        Self {
            certificate: material.certificate.clone(),
            issuing_ca: material.issuing_ca.clone(),
            private_key: material.private_key.clone(),
        }
    }

    /// Writes all three files under an exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken or a file cannot be
    /// written.
    pub fn write(&self, paths: &ArtifactPaths) -> BrokerResult<()> {
        std::fs::create_dir_all(paths.dir())?;
        let lock = paths.open_lock()?;
        FileExt::lock_exclusive(&lock)?;
        let result = self.write_unlocked(paths);
        FileExt::unlock(&lock)?;
        result
    }

    fn write_unlocked(&self, paths: &ArtifactPaths) -> BrokerResult<()> {
        write_file(&paths.issuing_ca(), self.issuing_ca.as_bytes(), false)?;
        write_file(&paths.certificate(), self.certificate.as_bytes(), false)?;
        write_file(&paths.private_key(), self.private_key.expose().as_bytes(), true)
    }

    /// Reads all three files under a shared lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken or a file is missing.
    pub fn load(paths: &ArtifactPaths) -> BrokerResult<Self> {
        let lock = paths.open_lock()?;
        FileExt::lock_shared(&lock)?;
        let result = Self::load_unlocked(paths);
        FileExt::unlock(&lock)?;
        result
    }

    fn load_unlocked(paths: &ArtifactPaths) -> BrokerResult<Self> {
        Ok(Self {
            certificate: std::fs::read_to_string(paths.certificate())?,
            issuing_ca: std::fs::read_to_string(paths.issuing_ca())?,
            private_key: PrivateKeyPem::new(std::fs::read_to_string(paths.private_key())?),
        })
    }

    /// Parses the leaf certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM cannot be parsed.
    pub fn leaf(&self) -> certvault_pki::Result<Certificate> {
        Certificate::from_pem(&self.certificate)
    }

    /// Leaf followed by the issuing CA, as served in a TLS handshake.
    #[must_use]
    pub fn chain_pem(&self) -> String {
        let mut chain = self.certificate.trim_end().to_string();
        chain.push('\n');
        chain.push_str(&self.issuing_ca);
        chain
    }
}

fn write_file(path: &Path, contents: &[u8], private: bool) -> BrokerResult<()> {
    let mut options = OpenOptions::new();
    options.create(true).truncate(true).write(true);
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    info!(path = %path.display(), "wrote certificate file");
    Ok(())
}

/// Polls `path` until certificate material appears.
///
/// Missing material, denied access and network errors are logged and the
/// poll continues. At most `budget` reads are made (at least one).
///
/// # Errors
///
/// Returns [`BrokerError::CertificateTimeout`] when the budget runs out.
pub async fn fetch_certificates<S: SecretStore>(
    store: &S,
    path: &str,
    poll_interval: Duration,
    budget: u32,
) -> BrokerResult<CertificateMaterial> {
    info!(path, "reading certificates");
    let mut ticker = tokio::time::interval(poll_interval);

    for attempt in 1..=budget.max(1) {
        ticker.tick().await;
        match store.read_certificate(path).await {
            Ok(material) => {
                info!(path, attempt, "read certificates");
                return Ok(material);
            }
            Err(StoreError::NotFound(_)) => {
                info!(path, "certificate not present yet, the service must be labelled for issuance");
            }
            Err(StoreError::Forbidden(_)) => {
                warn!(path, "access forbidden, the token's policy does not cover the certificate path");
            }
            Err(e) => {
                warn!(path, error = %e, "failed to read certificates");
            }
        }
    }

    Err(BrokerError::CertificateTimeout(path.to_string()))
}
