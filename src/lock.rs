// src/lock.rs

//! Advisory file locks guarding metadata mutation and cache builds
//!
//! Two locks exist: a process-wide metadata lock in the cache root taken
//! exclusively by mutating operations and shared by readers, and a
//! per-alias build lock taken while a solver cache is rebuilt. Both are
//! `flock` based advisory locks released when the guard is dropped.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A held advisory lock; released on drop
pub struct LockFile {
    file: File,
    path: PathBuf,
    shared: bool,
}

impl LockFile {
    fn open(path: &Path) -> Result<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(Error::from)
    }

    /// Take an exclusive lock without blocking
    ///
    /// Contention is an error so callers can surface it instead of
    /// silently queueing behind another manager instance.
    pub fn exclusive<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = Self::open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("acquired exclusive lock at {}", path.display());
                Ok(Self {
                    file,
                    path,
                    shared: false,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(Error::LockContention(path.display().to_string()))
            }
            Err(e) => Err(Error::IoFailed(format!(
                "failed to lock {}: {e}",
                path.display()
            ))),
        }
    }

    /// Take a shared lock without blocking
    pub fn shared<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = Self::open(&path)?;
        match FileExt::try_lock_shared(&file) {
            Ok(()) => {
                debug!("acquired shared lock at {}", path.display());
                Ok(Self {
                    file,
                    path,
                    shared: true,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(Error::LockContention(path.display().to_string()))
            }
            Err(e) => Err(Error::IoFailed(format!(
                "failed to lock {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!("released lock at {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_exclusive_then_release() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("m.lock");

        let lock = LockFile::exclusive(&path).unwrap();
        assert!(path.exists());
        assert!(!lock.is_shared());
        drop(lock);

        // reacquirable after release
        let _again = LockFile::exclusive(&path).unwrap();
    }

    #[test]
    fn test_exclusive_contention() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("m.lock");

        let _held = LockFile::exclusive(&path).unwrap();
        match LockFile::exclusive(&path) {
            Err(Error::LockContention(p)) => assert!(p.contains("m.lock")),
            Err(e) => panic!("expected contention, got {e}"),
            Ok(_) => panic!("second exclusive lock must not succeed"),
        }
    }

    #[test]
    fn test_shared_locks_coexist() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("m.lock");

        let a = LockFile::shared(&path).unwrap();
        let b = LockFile::shared(&path).unwrap();
        assert!(a.is_shared() && b.is_shared());

        // an exclusive request must now fail
        assert!(matches!(
            LockFile::exclusive(&path),
            Err(Error::LockContention(_))
        ));
    }

    #[test]
    fn test_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("deep/nested/m.lock");
        let _lock = LockFile::exclusive(&path).unwrap();
        assert!(path.exists());
    }
}
