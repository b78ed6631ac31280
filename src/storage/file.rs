//! File-backed [`KvStore`].
//!
//! Each key is stored in its own file under `~/.offsync/store/`. Writes go to
//! a temporary sibling, are flushed to disk, then renamed over the target and
//! the directory is synced, so readers see either the old blob or the new one
//! and never a torn write. Writers across processes are serialised by an
//! advisory lock on `store/.lock`.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::KvStore;
use crate::error::OffsyncError;

/// Stores each key as a file in one directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a file store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the directory cannot be created.
    pub fn new(dir: PathBuf) -> Result<Self, OffsyncError> {
        fs::create_dir_all(&dir).map_err(|e| {
            OffsyncError::Storage(format!("Failed to create store directory {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::encode_key(key)))
    }

    /// Map a key to a file name. Lowercase ASCII letters, digits, `-` and `_`
    /// are kept; every other byte becomes `%XX`, so distinct keys never share
    /// a file, even on case-insensitive filesystems.
    fn encode_key(key: &str) -> String {
        let mut name = String::with_capacity(key.len());
        for byte in key.bytes() {
            match byte {
                b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' => name.push(char::from(byte)),
                _ => name.push_str(&format!("%{byte:02X}")),
            }
        }
        name
    }

    /// Hold the store-wide write lock until the returned file is dropped.
    fn lock(&self) -> Result<File, OffsyncError> {
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .and_then(|file| file.lock().map(|()| file))
            .map_err(|e| {
                OffsyncError::Storage(format!("Failed to lock {}: {e}", path.display()))
            })?;
        Ok(file)
    }

    fn replace(&self, path: &Path, value: &[u8]) -> Result<(), OffsyncError> {
        let tmp = path.with_extension("json.tmp");
        let storage_err =
            |e: std::io::Error| OffsyncError::Storage(format!("Failed to write {}: {e}", path.display()));

        let mut file = File::create(&tmp).map_err(storage_err)?;
        file.write_all(value).map_err(storage_err)?;
        file.sync_all().map_err(storage_err)?;
        drop(file);

        fs::rename(&tmp, path).map_err(storage_err)?;
        sync_dir(&self.dir).map_err(storage_err)
    }
}

const LOCK_FILE: &str = ".lock";

// Persist the rename itself; on Windows directories cannot be opened for sync.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

impl KvStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, OffsyncError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OffsyncError::Storage(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), OffsyncError> {
        let _lock = self.lock()?;
        self.replace(&self.path_for(key), value)
    }

    fn delete(&self, key: &str) -> Result<bool, OffsyncError> {
        let _lock = self.lock()?;
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(OffsyncError::Storage(format!(
                "Failed to delete {}: {e}",
                path.display()
            ))),
        }
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Vec<u8>>,
        value: &[u8],
    ) -> Result<bool, OffsyncError> {
        let _lock = self.lock()?;
        if self.read(key)? != expected {
            return Ok(false);
        }
        self.replace(&self.path_for(key), value)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_encode_key() {
        assert_eq!(FileStore::encode_key("cache:default"), "cache%3Adefault");
        assert_eq!(FileStore::encode_key("../etc"), "%2E%2E%2Fetc");
        assert_eq!(FileStore::encode_key("a_b"), "a_b");
        assert_eq!(FileStore::encode_key("Ab"), "%41b");
    }

    #[test]
    fn test_similar_keys_stay_separate() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("store")).unwrap();

        store.write("cache:quran:v1", b"colon").unwrap();
        store.write("cache:quran_v1", b"underscore").unwrap();
        store.write("cache:Quran:v1", b"upper").unwrap();

        assert_eq!(store.read("cache:quran:v1").unwrap(), Some(b"colon".to_vec()));
        assert_eq!(store.read("cache:quran_v1").unwrap(), Some(b"underscore".to_vec()));
        assert_eq!(store.read("cache:Quran:v1").unwrap(), Some(b"upper".to_vec()));
    }

    #[test]
    fn test_compare_and_swap_between_handles() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("store");
        let first = FileStore::new(dir.clone()).unwrap();
        let second = FileStore::new(dir).unwrap();

        assert!(first.compare_and_swap("k", None, b"1").unwrap());
        assert!(!second.compare_and_swap("k", None, b"2").unwrap());
        assert!(second.compare_and_swap("k", Some(b"1".to_vec()), b"2").unwrap());
        assert_eq!(first.read("k").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_read_write_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("store")).unwrap();

        assert_eq!(store.read("cache:default").unwrap(), None);

        store.write("cache:default", b"{\"entries\":{}}").unwrap();
        assert_eq!(
            store.read("cache:default").unwrap(),
            Some(b"{\"entries\":{}}".to_vec())
        );

        assert!(store.delete("cache:default").unwrap());
        assert!(!store.delete("cache:default").unwrap());
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("store");
        let store = FileStore::new(dir.clone()).unwrap();

        store.write("k", b"1").unwrap();
        store.write("k", b"2").unwrap();

        let names: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|name| name != LOCK_FILE)
            .collect();
        assert_eq!(names, vec!["k.json".to_string()]);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("store");

        FileStore::new(dir.clone()).unwrap().write("k", b"v").unwrap();

        let reopened = FileStore::new(dir).unwrap();
        assert_eq!(reopened.read("k").unwrap(), Some(b"v".to_vec()));
    }
}
