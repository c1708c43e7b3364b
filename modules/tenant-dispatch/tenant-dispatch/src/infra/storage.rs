//! Key-value stores backing the credential store.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tempfile::NamedTempFile;
use tenant_dispatch_sdk::{KeyValueStore, StorageError};
use tracing::debug;

/// Process-local store. Contents are lost when it is dropped.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every entry.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.read().clone()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut entries = self.entries.write();
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

/// Store persisted as a JSON object in a single file.
///
/// Every mutation rewrites the file through a temporary sibling and an
/// atomic rename, so the file on disk is always a complete snapshot. The
/// in-memory view only changes once the write succeeded.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    /// Open the store at `path`. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the file exists but cannot be read or is
    /// not a JSON object of strings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), entries = entries.len(), "Opened credential file");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>) -> bool,
    ) -> Result<(), StorageError> {
        let mut entries = self.entries.write();
        let mut next = entries.clone();
        if !apply(&mut next) {
            return Ok(());
        }
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, entries)?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_owned(), value.to_owned()).as_deref() != Some(value)
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|entries| entries.remove(key).is_some())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        self.update(|entries| {
            keys.iter()
                .fold(false, |changed, key| entries.remove(*key).is_some() || changed)
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = InMemoryKeyValueStore::new();
        store.set("auth_token", "t").unwrap();
        assert_eq!(store.get("auth_token").unwrap().as_deref(), Some("t"));
        store.remove_many(&["auth_token", "absent"]).unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileKeyValueStore::open(&path).unwrap();
        store.set("auth_token", "t").unwrap();
        store.set("session_tenant", "acme").unwrap();
        drop(store);

        let reopened = FileKeyValueStore::open(&path).unwrap();
        assert_eq!(reopened.get("auth_token").unwrap().as_deref(), Some("t"));
        assert_eq!(reopened.get("session_tenant").unwrap().as_deref(), Some("acme"));
    }

    #[test]
    fn file_store_remove_many_rewrites_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileKeyValueStore::open(&path).unwrap();
        store.set("auth_token", "t").unwrap();
        store.set("theme", "dark").unwrap();

        store.remove_many(&["auth_token", "session_tenant"]).unwrap();

        let on_disk: BTreeMap<String, String> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk.get("theme").map(String::as_str), Some("dark"));
    }

    #[test]
    fn file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FileKeyValueStore::open(&path),
            Err(StorageError::Encoding(_))
        ));
    }

    #[test]
    fn file_store_treats_blank_file_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "\n").unwrap();
        let store = FileKeyValueStore::open(&path).unwrap();
        assert_eq!(store.get("auth_token").unwrap(), None);
    }
}
