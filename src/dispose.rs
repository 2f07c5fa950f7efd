// src/dispose.rs

//! Scope-bound cleanup guards and cancellation
//!
//! Downloaded files, half-built caches and temporary directories are all
//! wrapped in a [`ManagedFile`]: the release action runs on every exit
//! path, and successful persistence disarms it. Cleanup is deterministic;
//! nothing here relies on process exit handlers.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

type Dispose = Box<dyn FnOnce(&Path) + Send>;

/// A path with an attached release action
pub struct ManagedFile {
    path: PathBuf,
    dispose: Option<Dispose>,
}

impl ManagedFile {
    /// Plain reference to an existing path, nothing released on drop
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            dispose: None,
        }
    }

    /// Unlink the file when the guard is dropped
    pub fn with_unlink<P: Into<PathBuf>>(path: P) -> Self {
        Self::with_dispose(path, |p| {
            let _ = std::fs::remove_file(p);
        })
    }

    /// Remove the whole directory tree when the guard is dropped
    pub fn with_remove_dir<P: Into<PathBuf>>(path: P) -> Self {
        Self::with_dispose(path, |p| {
            let _ = std::fs::remove_dir_all(p);
        })
    }

    /// Attach an arbitrary release action
    pub fn with_dispose<P, F>(path: P, dispose: F) -> Self
    where
        P: Into<PathBuf>,
        F: FnOnce(&Path) + Send + 'static,
    {
        Self {
            path: path.into(),
            dispose: Some(Box::new(dispose)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cancel the release action; the path is now persistent
    pub fn disarm(&mut self) {
        if self.dispose.take().is_some() {
            debug!("disarmed cleanup of {}", self.path.display());
        }
    }
}

impl AsRef<Path> for ManagedFile {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for ManagedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedFile")
            .field("path", &self.path)
            .field("armed", &self.dispose.is_some())
            .finish()
    }
}

impl Drop for ManagedFile {
    fn drop(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            debug!("disposing {}", self.path.display());
            dispose(&self.path);
        }
    }
}

/// Cooperative cancellation flag shared between caller and operation
///
/// Checked at every suspension point and before each filesystem write.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Bail out with [`Error::Cancelled`] if the flag is set
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unlink_on_drop() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("t.bin");
        std::fs::write(&path, b"x").unwrap();

        let guard = ManagedFile::with_unlink(&path);
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn test_disarm_keeps_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("t.bin");
        std::fs::write(&path, b"x").unwrap();

        let mut guard = ManagedFile::with_unlink(&path);
        guard.disarm();
        drop(guard);
        assert!(path.exists());
    }

    #[test]
    fn test_plain_reference_never_deletes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("t.bin");
        std::fs::write(&path, b"x").unwrap();

        drop(ManagedFile::new(&path));
        assert!(path.exists());
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());

        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(Error::Cancelled)));
    }
}
