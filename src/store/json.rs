//! JSON file backend.
//!
//! The slot is a single file. Saves go to a temporary file in the same
//! directory which is then renamed over the slot, under an exclusive lock on a
//! sibling `.lock` file, so the slot is never observed half-written.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tempfile::NamedTempFile;

use super::{QueueStore, StoreError};

/// Queue slot stored as a JSON file
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        let mut lock_name = path.file_name().unwrap_or_default().to_os_string();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);

        Self { path, lock_path }
    }

    /// Path of the slot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
    }
}

impl QueueStore for JsonFileStore {
    fn name(&self) -> &str {
        "json"
    }

    fn read_slot(&self) -> Result<Option<String>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&self.path)?))
    }

    fn write_slot(&self, contents: &str) -> Result<(), StoreError> {
        fs::create_dir_all(self.dir())?;

        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.lock_path)?;
        lock.lock_exclusive().map_err(|source| StoreError::Lock {
            path: self.lock_path.clone(),
            source,
        })?;

        let mut tmp = NamedTempFile::new_in(self.dir())?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        // Released on close as well; unlock eagerly
        let _ = FileExt::unlock(&lock);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_reads_none() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp.path().join("queue.json"));
        assert!(store.read_slot().unwrap().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp.path().join("nested").join("queue.json"));

        store.write_slot("[]").unwrap();
        assert_eq!(store.read_slot().unwrap().as_deref(), Some("[]"));

        store.write_slot("[1]").unwrap();
        assert_eq!(store.read_slot().unwrap().as_deref(), Some("[1]"));
    }

    #[test]
    fn test_lock_file_sits_beside_slot() {
        let store = JsonFileStore::new(PathBuf::from("/tmp/state/queue.json"));
        assert_eq!(store.lock_path, PathBuf::from("/tmp/state/queue.json.lock"));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp.path().join("queue.json"));
        store.write_slot("[]").unwrap();

        let names: Vec<String> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 2, "unexpected files: {:?}", names);
        assert!(names.contains(&"queue.json".to_string()));
        assert!(names.contains(&"queue.json.lock".to_string()));
    }
}
