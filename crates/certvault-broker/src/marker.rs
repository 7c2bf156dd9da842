//! Bootstrap marker file.
//!
//! The unwrapped secret is persisted once. Its presence means the workload
//! already received its token, so a restarted container reuses it instead of
//! requesting a second one.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use certvault_store::{UnwrappedSecret, VaultToken};

use crate::error::{BrokerError, BrokerResult};

/// Default marker location inside the shared secrets volume.
pub const DEFAULT_MARKER_PATH: &str = "/var/run/secrets/vaultproject.io/secret.json";

/// The persisted unwrapped secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerFile {
    path: PathBuf,
}

impl MarkerFile {
    /// Creates a handle for the marker at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the marker path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if a token was already persisted.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Persists `secret`, failing if the marker already exists.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::AlreadyDelivered`] if another caller persisted
    /// first, or [`BrokerError::Marker`] on any other IO failure.
    pub fn persist(&self, secret: &UnwrappedSecret) -> BrokerResult<()> {
        let json = serde_json::to_vec(secret).map_err(|e| self.error(&e))?;

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(BrokerError::AlreadyDelivered);
            }
            Err(e) => return Err(self.error(&e)),
        };

        file.write_all(&json).map_err(|e| self.error(&e))?;
        file.sync_all().map_err(|e| self.error(&e))?;
        info!(path = %self.path.display(), "persisted unwrapped token");
        Ok(())
    }

    /// Reads the client token back from the marker.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Marker`] if the file is missing or unreadable,
    /// or [`BrokerError::MissingClientToken`] if it carries no token.
    pub fn read_token(&self) -> BrokerResult<VaultToken> {
        let bytes = std::fs::read(&self.path).map_err(|e| self.error(&e))?;
        let secret: UnwrappedSecret = serde_json::from_slice(&bytes).map_err(|e| self.error(&e))?;
        secret
            .client_token()
            .cloned()
            .ok_or(BrokerError::MissingClientToken)
    }

    /// Removes the marker; a missing file is not an error.
    pub fn remove(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "removed token file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove token file"),
        }
    }

    fn error(&self, err: &dyn std::fmt::Display) -> BrokerError {
        BrokerError::Marker {
            path: self.path.display().to_string(),
            message: err.to_string(),
        }
    }
}
