use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::state::SessionSnapshot;
use crate::access::AccessGate;
use crate::constants::{ACCESS_KEY, SNAPSHOT_KEY};
use crate::utils::{fingerprint, ErrorKind, PaychatError};

/// Durable string key-value surface the session is persisted into
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, PaychatError>;

    fn put(&self, key: &str, value: &str) -> Result<(), PaychatError>;

    /// Remove a key; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), PaychatError>;
}

/// One JSON file per key inside a data directory
#[derive(Debug)]
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    /// Create a file store, creating the directory if it doesn't exist
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, PaychatError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PaychatError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(PaychatError::Storage(format!("invalid key '{}'", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, PaychatError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), PaychatError> {
        let path = self.path_for(key)?;
        // Write then rename so a crash never leaves a half-written record
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PaychatError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, PaychatError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), PaychatError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PaychatError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredProof {
    proof: String,
}

/// Reload-surviving record of one session
///
/// Reads never fail: anything unreadable is logged as
/// [`ErrorKind::StorageCorrupt`] and treated as a fresh session.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Store backed by JSON files in `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, PaychatError> {
        Ok(Self::new(Arc::new(FileKvStore::new(dir)?)))
    }

    /// Store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    /// Load the persisted snapshot, or an empty one
    pub fn load(&self) -> SessionSnapshot {
        let raw = match self.kv.get(SNAPSHOT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return SessionSnapshot::default(),
            Err(e) => {
                warn!(kind = ErrorKind::StorageCorrupt.label(), "Could not read session: {}", e);
                return SessionSnapshot::default();
            }
        };

        match serde_json::from_str::<SessionSnapshot>(&raw) {
            Ok(snapshot) => {
                debug!(messages = snapshot.log.len(), "Loaded session snapshot");
                snapshot
            }
            Err(e) => {
                warn!(
                    kind = ErrorKind::StorageCorrupt.label(),
                    "Discarding unreadable session: {}", e
                );
                SessionSnapshot::default()
            }
        }
    }

    /// Overwrite the persisted snapshot
    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<(), PaychatError> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| PaychatError::Storage(e.to_string()))?;
        self.kv.put(SNAPSHOT_KEY, &json)
    }

    /// Remove the snapshot and the persisted proof
    pub fn clear(&self) -> Result<(), PaychatError> {
        self.kv.remove(SNAPSHOT_KEY)?;
        self.kv.remove(ACCESS_KEY)
    }

    /// Persisted proof, if present and still well-formed
    pub fn load_proof(&self) -> Option<String> {
        let raw = match self.kv.get(ACCESS_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(kind = ErrorKind::StorageCorrupt.label(), "Could not read proof: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<StoredProof>(&raw) {
            Ok(stored) if AccessGate::is_well_formed(&stored.proof) => Some(stored.proof),
            Ok(stored) => {
                warn!(proof = %fingerprint(&stored.proof), "Ignoring malformed persisted proof");
                None
            }
            Err(e) => {
                warn!(kind = ErrorKind::StorageCorrupt.label(), "Discarding unreadable proof: {}", e);
                None
            }
        }
    }

    pub fn save_proof(&self, proof: &str) -> Result<(), PaychatError> {
        let json = serde_json::to_string(&StoredProof {
            proof: proof.to_string(),
        })
        .map_err(|e| PaychatError::Storage(e.to_string()))?;
        self.kv.put(ACCESS_KEY, &json)
    }
}
