//! Persistent key stores.
//!
//! - [`MemoryKeyStore`]: `RwLock<HashMap>`, for tests and ephemeral clients
//! - [`FileKeyStore`]: one JSON file per identity under a directory

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use super::{PersistentKeyStorage, StoredKeys};
use crate::error::{Error, Result};

/// In-memory key store
#[derive(Default)]
pub struct MemoryKeyStore {
    records: RwLock<HashMap<String, StoredKeys>>,
}

impl MemoryKeyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistentKeyStorage for MemoryKeyStore {
    fn get(&self, identity_id: &str) -> Result<Option<StoredKeys>> {
        Ok(self.records.read().get(identity_id).cloned())
    }

    fn set(&self, identity_id: &str, keys: &StoredKeys) -> Result<()> {
        self.records
            .write()
            .insert(identity_id.to_string(), keys.clone());
        Ok(())
    }

    fn clear(&self, identity_id: &str) -> Result<()> {
        self.records.write().remove(identity_id);
        Ok(())
    }
}

/// File-backed key store
///
/// Records live at `<dir>/<hex(identity_id)>.json`. Writes go to a
/// temporary file first and are renamed into place, so a crash never leaves
/// a half-written record.
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::StorageWriteError(format!("cannot create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    /// Directory holding the records
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, identity_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(identity_id)))
    }
}

impl PersistentKeyStorage for FileKeyStore {
    fn get(&self, identity_id: &str) -> Result<Option<StoredKeys>> {
        let path = self.record_path(identity_id);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::StorageReadError(e.to_string())),
        };

        let record = serde_json::from_str(&text)
            .map_err(|e| Error::StorageCorrupted(format!("{}: {}", path.display(), e)))?;
        Ok(Some(record))
    }

    fn set(&self, identity_id: &str, keys: &StoredKeys) -> Result<()> {
        let path = self.record_path(identity_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(keys)?;

        fs::write(&tmp, json).map_err(|e| Error::StorageWriteError(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| Error::StorageWriteError(e.to_string()))?;

        tracing::debug!(path = %path.display(), "Stored key record");
        Ok(())
    }

    fn clear(&self, identity_id: &str) -> Result<()> {
        match fs::remove_file(self.record_path(identity_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::StorageWriteError(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{wrap, KeyPair};

    fn sample_record() -> StoredKeys {
        let kp = KeyPair::generate();
        let wrapped = wrap(kp.secret_key(), "password123").unwrap();
        StoredKeys::new(*kp.public_key(), &wrapped)
    }

    #[test]
    fn test_memory_store_set_get_clear() {
        let store = MemoryKeyStore::new();
        assert!(store.get("user-1").unwrap().is_none());

        let record = sample_record();
        store.set("user-1", &record).unwrap();
        assert_eq!(store.get("user-1").unwrap(), Some(record));
        assert!(store.get("user-2").unwrap().is_none());

        store.clear("user-1").unwrap();
        assert!(store.get("user-1").unwrap().is_none());
        store.clear("user-1").unwrap();
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let record = sample_record();

        {
            let store = FileKeyStore::open(dir.path()).unwrap();
            store.set("user/with:odd chars", &record).unwrap();
        }

        let store = FileKeyStore::open(dir.path()).unwrap();
        assert_eq!(store.get("user/with:odd chars").unwrap(), Some(record));

        store.clear("user/with:odd chars").unwrap();
        assert!(store.get("user/with:odd chars").unwrap().is_none());
    }

    #[test]
    fn test_file_store_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path()).unwrap();
        store.set("user-1", &sample_record()).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![format!("{}.json", hex::encode("user-1"))]);
    }

    #[test]
    fn test_file_store_detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path()).unwrap();
        fs::write(store.record_path("user-1"), b"{not json").unwrap();

        assert!(matches!(
            store.get("user-1"),
            Err(Error::StorageCorrupted(_))
        ));
    }
}
