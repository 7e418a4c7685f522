//! Cross-process ownership of a queue home.
//!
//! A process that keeps the queue in memory rewrites the whole slot on every
//! mutation, so two owners would silently overwrite each other's items. The
//! owner lock is an exclusive advisory lock on `<home>/owner.lock`, held for as
//! long as the queue is loaded.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use super::StoreError;

/// Exclusive ownership of a queue, released on drop
#[derive(Debug)]
pub struct OwnerLock {
    file: File,
    path: PathBuf,
}

impl OwnerLock {
    /// Take the lock without waiting. `Ok(None)` when another owner holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, StoreError> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "Queue ownership acquired");
                Ok(Some(Self {
                    file,
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(source) => Err(StoreError::Lock {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OwnerLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "Queue ownership released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_owner_is_refused() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("owner.lock");

        let first = OwnerLock::try_acquire(&path).unwrap().unwrap();
        assert_eq!(first.path(), path);
        assert!(OwnerLock::try_acquire(&path).unwrap().is_none());

        drop(first);
        assert!(OwnerLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn test_creates_missing_home() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fresh").join("owner.lock");

        assert!(OwnerLock::try_acquire(&path).unwrap().is_some());
        assert!(path.exists());
    }
}
