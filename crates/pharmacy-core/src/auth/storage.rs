//! Durable storage for the session token.
//!
//! A single entry holds the raw bearer token; absence of the entry means
//! logged out. Only `SessionStore` writes through these types.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Keychain service name
const KEYRING_SERVICE: &str = "pharmacy-client";

/// Keychain account the token is stored under
const KEYRING_USER: &str = "session-token";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Token file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode token file: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Backing store for the bearer token.
pub trait TokenStorage: Send + Sync {
    /// Read the stored token, `None` when logged out.
    fn load(&self) -> StorageResult<Option<String>>;

    /// Replace the stored token.
    fn store(&self, token: &str) -> StorageResult<()>;

    /// Remove the stored token. Succeeds when nothing is stored.
    fn clear(&self) -> StorageResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    token: String,
    stored_at: DateTime<Utc>,
}

/// Token persisted as JSON in the cache directory.
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            path: cache_dir.as_ref().join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> StorageResult<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str::<TokenFile>(&contents) {
            Ok(file) if !file.token.is_empty() => {
                debug!(stored_at = %file.stored_at, "Loaded token file");
                Ok(Some(file.token))
            }
            Ok(_) => Ok(None),
            Err(e) => {
                // Unreadable file is the same as no session
                warn!(error = %e, path = %self.path.display(), "Ignoring corrupt token file");
                Ok(None)
            }
        }
    }

    fn store(&self, token: &str) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = TokenFile {
            token: token.to_string(),
            stored_at: Utc::now(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Token kept in the OS keychain.
pub struct KeyringTokenStorage {
    service: String,
}

impl KeyringTokenStorage {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
        }
    }

    /// Use a different keychain service, e.g. one per API host.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> StorageResult<Entry> {
        Ok(Entry::new(&self.service, KEYRING_USER)?)
    }
}

impl Default for KeyringTokenStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStorage for KeyringTokenStorage {
    fn load(&self) -> StorageResult<Option<String>> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, token: &str) -> StorageResult<()> {
        self.entry()?.set_password(token)?;
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local storage. Sessions do not survive a restart.
#[derive(Default)]
pub struct MemoryTokenStorage {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a token already stored, as if left by a previous run.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> StorageResult<Option<String>> {
        Ok(self.slot().clone())
    }

    fn store(&self, token: &str) -> StorageResult<()> {
        *self.slot() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        *self.slot() = None;
        Ok(())
    }
}
