// src/layout.rs

//! Deterministic path derivation for the per-alias caches
//!
//! Everything below the cache root is addressed by repository alias:
//!
//! ```text
//! <cache_root>/raw/<alias>/        unpacked metadata mirror
//! <cache_root>/solv/<alias>/solv   binary solver cache
//! <cache_root>/solv/<alias>/cookie freshness anchor
//! <cache_root>/pubkeys/            persistent key cache
//! ```
//!
//! Paths are stable strings; nothing here hashes or rewrites aliases, so
//! an alias that is not a safe single path component is rejected.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Validate that an alias is usable as a single path component
pub fn check_alias(alias: &str) -> Result<()> {
    if alias.is_empty()
        || alias.starts_with('.')
        || !alias.is_ascii()
        || alias.contains(['/', '\\'])
        || alias.chars().any(char::is_control)
    {
        return Err(Error::InvalidAlias(alias.to_string()));
    }
    Ok(())
}

/// Path computation for one cache root
#[derive(Debug, Clone)]
pub struct PathLayout {
    cache_root: PathBuf,
}

impl PathLayout {
    pub fn new<P: AsRef<Path>>(cache_root: P) -> Self {
        Self {
            cache_root: cache_root.as_ref().to_path_buf(),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Directory holding all raw metadata mirrors
    pub fn raw_root(&self) -> PathBuf {
        self.cache_root.join("raw")
    }

    /// Directory holding all solver caches
    pub fn solv_root(&self) -> PathBuf {
        self.cache_root.join("solv")
    }

    /// Persistent public key cache
    pub fn key_cache_dir(&self) -> PathBuf {
        self.cache_root.join("pubkeys")
    }

    /// Process-wide metadata lock file
    pub fn metadata_lock_file(&self) -> PathBuf {
        self.cache_root.join(".metadata_lock")
    }

    /// Raw metadata mirror of one repository
    pub fn raw_dir(&self, alias: &str) -> Result<PathBuf> {
        check_alias(alias)?;
        Ok(self.raw_root().join(alias))
    }

    /// Timestamp of the last refresh attempt of one repository
    pub fn timestamp_file(&self, alias: &str) -> Result<PathBuf> {
        Ok(self.raw_dir(alias)?.join(".timestamp"))
    }

    /// Solver cache directory of one repository
    pub fn solv_dir(&self, alias: &str) -> Result<PathBuf> {
        check_alias(alias)?;
        Ok(self.solv_root().join(alias))
    }

    pub fn solv_file(&self, alias: &str) -> Result<PathBuf> {
        Ok(self.solv_dir(alias)?.join("solv"))
    }

    pub fn cookie_file(&self, alias: &str) -> Result<PathBuf> {
        Ok(self.solv_dir(alias)?.join("cookie"))
    }

    /// Per-alias build lock taken while a solver cache is rebuilt
    pub fn build_lock_file(&self, alias: &str) -> Result<PathBuf> {
        Ok(self.solv_dir(alias)?.join(".build"))
    }
}
