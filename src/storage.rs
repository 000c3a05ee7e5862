//! Persisted key/value storage for the session token.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session store writes the token, while the API adapter and the
//! navigation guard read it on every call. All of them share one
//! [`TokenStore`] handle, so swapping the backing [`Storage`] (file on disk,
//! in-memory fake) changes persistence for every component at once.
//!
//! Layout is a flat string map; only [`TOKEN_KEY`] is used today.

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Key under which the bearer token is persisted.
pub const TOKEN_KEY: &str = "token";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage file {} is not a JSON string map: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// String key/value persistence with `localStorage` semantics.
pub trait Storage: Send + Sync {
    /// Read the value under `key`, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backing medium cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backing medium cannot be written.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backing medium cannot be written.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

// =============================================================================
// MEMORY
// =============================================================================

/// Process-local storage. Lost on exit; used by tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }
}

// =============================================================================
// FILE
// =============================================================================

/// JSON file holding a flat string map. Survives process restarts.
///
/// Every call re-reads the file so separate processes sharing the path see
/// each other's writes. Writes go to a uniquely named, owner-only sibling
/// temp file that is then renamed into place, so the token is never readable
/// by other users.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => return Err(StorageError::Io { path: self.path.clone(), source }),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt { path: self.path.clone(), source })
    }

    fn save(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let io_err = |source: std::io::Error| StorageError::Io { path: self.path.clone(), source };
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(io_err)?;
                parent
            }
            None => Path::new("."),
        };
        let raw = serde_json::to_string_pretty(items)
            .map_err(|source| StorageError::Corrupt { path: self.path.clone(), source })?;

        // NamedTempFile is created owner-only (0600 on unix); persisting keeps that mode.
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(raw.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut items = self.load()?;
        items.insert(key.to_owned(), value.to_owned());
        self.save(&items)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut items = self.load()?;
        if items.remove(key).is_none() {
            return Ok(());
        }
        self.save(&items)
    }
}

// =============================================================================
// TOKEN STORE
// =============================================================================

/// Cloneable handle over a shared [`Storage`] that reads and writes the token.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<dyn Storage>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { inner: storage }
    }

    /// In-memory token store, empty.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Token store persisted to `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileStorage::new(path)))
    }

    /// Current token, `None` when absent or empty.
    ///
    /// A storage read failure is logged and reported as "no token" so callers
    /// fall back to anonymous behavior.
    #[must_use]
    pub fn get(&self) -> Option<String> {
        match self.inner.get_item(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "token storage read failed");
                None
            }
        }
    }

    /// Persist `token`. An empty token is equivalent to [`TokenStore::clear`].
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backing storage cannot be written.
    pub fn set(&self, token: &str) -> Result<(), StorageError> {
        if token.is_empty() {
            return self.clear();
        }
        self.inner.set_item(TOKEN_KEY, token)
    }

    /// Remove the persisted token.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backing storage cannot be written.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.inner.remove_item(TOKEN_KEY)
    }
}
