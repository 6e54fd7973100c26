//! Where save blobs live between sessions.
//!
//! A [`Storage`] maps a key to one string. The session keeps a single JSON
//! blob under its storage key and never interprets anything else.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage is unavailable")]
    Unavailable,
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub trait Storage {
    /// The blob stored under `key`, or `None` if nothing has been saved.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

// ===========================================================================
// In memory
// ===========================================================================

/// Process-local storage. Can be switched off to act like a browser that
/// refuses local storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
    unavailable: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage whose every call fails with [`StorageError::Unavailable`].
    pub fn unavailable() -> Self {
        Self {
            entries: BTreeMap::new(),
            unavailable: true,
        }
    }

    pub fn set_available(&mut self, available: bool) {
        self.unavailable = !available;
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.unavailable {
            Err(StorageError::Unavailable)
        } else {
            Ok(())
        }
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check()?;
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check()?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ===========================================================================
// On disk
// ===========================================================================

/// One `{key}.json` file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root_dir: PathBuf,
}

impl FileStorage {
    pub fn new(root_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root_dir = root_dir.into();
        fs::create_dir_all(&root_dir)?;
        Ok(Self { root_dir })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root_dir.join(format!("{key}.json")))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes to a sibling temp file first so a crash never leaves half a
    /// save behind.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "alembic-storage-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    // -----------------------------------------------------------------------
    // Test 1: memory storage round trip
    // -----------------------------------------------------------------------
    #[test]
    fn memory_round_trip() {
        let mut storage = MemoryStorage::new();
        assert_eq!(storage.get("save").unwrap(), None);
        storage.set("save", "{}").unwrap();
        assert_eq!(storage.get("save").unwrap().as_deref(), Some("{}"));
    }

    // -----------------------------------------------------------------------
    // Test 2: unavailable memory storage fails every call
    // -----------------------------------------------------------------------
    #[test]
    fn memory_unavailable() {
        let mut storage = MemoryStorage::unavailable();
        assert!(matches!(storage.get("save"), Err(StorageError::Unavailable)));
        assert!(matches!(
            storage.set("save", "{}"),
            Err(StorageError::Unavailable)
        ));
        storage.set_available(true);
        storage.set("save", "{}").unwrap();
    }

    // -----------------------------------------------------------------------
    // Test 3: file storage round trip and overwrite
    // -----------------------------------------------------------------------
    #[test]
    fn file_round_trip() {
        let dir = scratch_dir("round-trip");
        let mut storage = FileStorage::new(&dir).unwrap();
        assert_eq!(storage.get("the-third-zuluhistorian").unwrap(), None);
        storage.set("the-third-zuluhistorian", "one").unwrap();
        storage.set("the-third-zuluhistorian", "two").unwrap();
        assert_eq!(
            storage.get("the-third-zuluhistorian").unwrap().as_deref(),
            Some("two")
        );
        assert!(dir.join("the-third-zuluhistorian.json").exists());
        let _ = fs::remove_dir_all(&dir);
    }

    // -----------------------------------------------------------------------
    // Test 4: keys cannot escape the root directory
    // -----------------------------------------------------------------------
    #[test]
    fn file_rejects_path_keys() {
        let dir = scratch_dir("keys");
        let storage = FileStorage::new(&dir).unwrap();
        for key in ["", "../up", "a/b", ".hidden"] {
            assert!(matches!(
                storage.get(key),
                Err(StorageError::InvalidKey(_))
            ));
        }
        let _ = fs::remove_dir_all(&dir);
    }
}
