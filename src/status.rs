// src/status.rs

//! Freshness anchors for raw metadata and built caches
//!
//! A [`RepoStatus`] condenses a master index (or a plain directory) into
//! an opaque digest. The digest of the raw tree that produced a solver
//! cache is persisted next to it as the `cookie`; cache validity is
//! exactly cookie-equals-current-status.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Opaque freshness token supporting equality
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoStatus {
    digest: String,
}

impl RepoStatus {
    /// Status of nothing; never equal to any real status
    pub fn empty() -> Self {
        Self {
            digest: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.digest.is_empty()
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    fn mtime_secs(path: &Path) -> Result<u64> {
        let mtime = fs::metadata(path)?.modified()?;
        Ok(mtime
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0))
    }

    /// Digest of a master index file: content checksum plus mtime
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| Error::IoFailed(format!("cannot open {}: {e}", path.display())))?;

        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)
            .map_err(|e| Error::IoFailed(format!("cannot read {}: {e}", path.display())))?;
        hasher.update(Self::mtime_secs(path)?.to_le_bytes());

        Ok(Self {
            digest: format!("{:x}", hasher.finalize()),
        })
    }

    /// Digest of a plain directory: entry names and mtimes, sorted
    ///
    /// Used for repositories without a master index. Only first-level
    /// entries participate; package directories are flat by convention.
    pub fn from_dir(path: &Path) -> Result<Self> {
        let mut entries: Vec<(String, u64)> = Vec::new();
        for entry in fs::read_dir(path)
            .map_err(|e| Error::IoFailed(format!("cannot read {}: {e}", path.display())))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            entries.push((name, Self::mtime_secs(&entry.path())?));
        }
        entries.sort();

        let mut hasher = Sha256::new();
        for (name, mtime) in &entries {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(mtime.to_le_bytes());
        }
        Ok(Self {
            digest: format!("{:x}", hasher.finalize()),
        })
    }

    fn from_digest(digest: String) -> Self {
        Self { digest }
    }
}

/// Read the anchor out of a cookie file
///
/// A missing or malformed cookie reads as the empty status, which never
/// matches a real one; callers treat that as "not cached".
pub fn read_cookie(path: &Path) -> RepoStatus {
    let Ok(text) = fs::read_to_string(path) else {
        return RepoStatus::empty();
    };
    for line in text.lines() {
        if let Some(hex) = line.strip_prefix("anchor=") {
            let hex = hex.trim();
            if !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return RepoStatus::from_digest(hex.to_string());
            }
        }
    }
    RepoStatus::empty()
}

/// Persist an anchor, fsynced so a crash cannot leave a torn cookie
pub fn write_cookie(path: &Path, status: &RepoStatus) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    writeln!(file, "anchor={}", status.digest())?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_status_tracks_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("repomd.xml");
        std::fs::write(&path, b"<repomd/>").unwrap();

        let a = RepoStatus::from_file(&path).unwrap();
        let b = RepoStatus::from_file(&path).unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());

        std::fs::write(&path, b"<repomd version='2'/>").unwrap();
        let c = RepoStatus::from_file(&path).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_dir_status_ignores_dotfiles() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.rpm"), b"x").unwrap();
        let a = RepoStatus::from_dir(tmp.path()).unwrap();

        std::fs::write(tmp.path().join(".timestamp"), b"t").unwrap();
        let b = RepoStatus::from_dir(tmp.path()).unwrap();
        assert_eq!(a, b);

        std::fs::write(tmp.path().join("b.rpm"), b"y").unwrap();
        let c = RepoStatus::from_dir(tmp.path()).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_cookie_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sub").join("cookie");
        let file = tmp.path().join("f");
        std::fs::write(&file, b"data").unwrap();

        let status = RepoStatus::from_file(&file).unwrap();
        write_cookie(&path, &status).unwrap();
        assert_eq!(read_cookie(&path), status);
    }

    #[test]
    fn test_missing_cookie_is_empty() {
        let tmp = TempDir::new().unwrap();
        let status = read_cookie(&tmp.path().join("nope"));
        assert!(status.is_empty());
    }

    #[test]
    fn test_garbage_cookie_is_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cookie");
        std::fs::write(&path, "not an anchor\n").unwrap();
        assert!(read_cookie(&path).is_empty());
    }
}
