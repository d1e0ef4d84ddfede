use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;

use super::StoreError;

/// String key/value persistence with browser-storage semantics: whole values
/// are read and replaced, there is no partial update.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// One `<key>.json` file per key under a data directory.
pub struct FileKv {
    root: PathBuf,
}

impl FileKv {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.bricktrack`, named by the package metadata.
    pub fn default_location() -> Result<Self, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::NoDataDir)?;
        Ok(Self::new(home.join(crate::metadata::DATA_DIR_NAME)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileKv {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes a uniquely named temporary file in the data directory and
    /// renames it over the value, so a crash never leaves a half-written
    /// collection and concurrent writers never share a temp file.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root)?;

        let mut temp = NamedTempFile::new_in(&self.root)?;
        temp.write_all(value.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|err| err.error)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-process store, optionally with a byte quota like a browser origin has.
#[derive(Default)]
pub struct MemoryKv {
    values: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            values: Mutex::default(),
            quota: Some(quota),
        }
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(quota) = self.quota {
            let others: usize = values
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if others + key.len() + value.len() > quota {
                return Err(StoreError::QuotaExceeded(key.to_string()));
            }
        }
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_kv_round_trips_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::new(dir.path().join("data"));

        assert_eq!(kv.get("bricktrack_entries").unwrap(), None);
        kv.set("bricktrack_entries", "[]").unwrap();
        assert_eq!(kv.get("bricktrack_entries").unwrap().as_deref(), Some("[]"));
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("data"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers, ["bricktrack_entries.json"]);

        kv.remove("bricktrack_entries").unwrap();
        kv.remove("bricktrack_entries").unwrap();
        assert_eq!(kv.get("bricktrack_entries").unwrap(), None);
    }

    #[test]
    fn concurrent_writers_to_one_key_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let kv = std::sync::Arc::new(FileKv::new(dir.path()));

        let writers: Vec<_> = (0..8)
            .map(|n| {
                let kv = kv.clone();
                std::thread::spawn(move || {
                    for round in 0..20 {
                        kv.set("bricktrack_users", &format!("[{n},{round}]")).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let value = kv.get("bricktrack_users").unwrap().unwrap();
        assert!(value.ends_with(",19]"), "last write of some writer: {value}");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn file_kv_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::new(dir.path());
        assert!(matches!(
            kv.set("../escape", "x"),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn memory_kv_enforces_quota_per_origin() {
        let kv = MemoryKv::with_quota(32);
        kv.set("a", "0123456789").unwrap();
        let err = kv.set("b", &"x".repeat(40)).unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded(key) if key == "b"));
        // replacing a value only counts its new size
        kv.set("a", "01234567890123456789").unwrap();
    }
}
