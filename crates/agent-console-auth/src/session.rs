//! Persisted session record and the storage ports behind it.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::Clock;
use crate::sync::lock;

/// Storage key holding the JSON-serialized [`SessionRecord`].
pub const SESSION_STORAGE_KEY: &str = "session";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub access_token: String,
    /// Expiry in seconds since the Unix epoch.
    pub expires_at: i64,
}

impl SessionRecord {
    pub fn new(access_token: impl Into<String>, expires_at: i64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }
}

/// A session is valid when it carries a token and expires strictly after `now_unix_ms`.
#[must_use]
pub fn is_session_valid(record: &SessionRecord, now_unix_ms: u64) -> bool {
    !record.access_token.is_empty()
        && i128::from(record.expires_at) * 1_000 > i128::from(now_unix_ms)
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

/// String key/value persistence, the shape of browser local storage.
pub trait KeyValueStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-memory storage; contents are lost with the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.items).get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        lock(&self.items).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        lock(&self.items).remove(key);
        Ok(())
    }
}

/// One JSON file per key under a directory. Survives restarts.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root)?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

/// Reads and writes the persisted [`SessionRecord`].
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Returns the persisted record, or `None` when it is missing or unreadable.
    pub fn read(&self) -> Option<SessionRecord> {
        let raw = match self.storage.get_item(SESSION_STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(error) => {
                tracing::warn!(reason = %error, "failed to read persisted session");
                return None;
            }
        };
        match serde_json::from_str::<SessionRecord>(&raw) {
            Ok(record) => Some(record),
            Err(error) => {
                tracing::warn!(reason = %error, "ignoring malformed persisted session");
                None
            }
        }
    }

    pub fn write(&self, record: &SessionRecord) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(record)?;
        self.storage.set_item(SESSION_STORAGE_KEY, &encoded)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove_item(SESSION_STORAGE_KEY)
    }

    pub fn is_valid(&self, record: Option<&SessionRecord>) -> bool {
        record.is_some_and(|record| is_session_valid(record, self.clock.now_unix_ms()))
    }

    /// The persisted record, only if it is still valid.
    pub fn current_valid(&self) -> Option<SessionRecord> {
        self.read()
            .filter(|record| is_session_valid(record, self.clock.now_unix_ms()))
    }

    pub fn now_unix_ms(&self) -> u64 {
        self.clock.now_unix_ms()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}
