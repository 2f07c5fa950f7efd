// src/pool.rs

//! Solver pool facade
//!
//! The real solver lives elsewhere; this facade loads built caches into
//! memory so callers (and the test suites) can inspect what the solver
//! would see. Loading validates nothing beyond the database shape; cache
//! validity is the manager's business.

use crate::error::{Error, Result};
use crate::info::RepoInfo;
use crate::parser::{Solvable, SolvableKind};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// One loaded repository
#[derive(Debug, Clone)]
pub struct PoolRepo {
    pub info: RepoInfo,
    solvables: Vec<Solvable>,
}

impl PoolRepo {
    pub fn alias(&self) -> &str {
        self.info.alias()
    }

    pub fn solvable_count(&self) -> usize {
        self.solvables.len()
    }

    pub fn solvables(&self) -> &[Solvable] {
        &self.solvables
    }

    pub fn find(&self, name: &str) -> Option<&Solvable> {
        self.solvables.iter().find(|s| s.name == name)
    }
}

/// In-memory pool of loaded repositories, keyed by alias
#[derive(Debug, Default)]
pub struct Pool {
    repos: BTreeMap<String, PoolRepo>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a built cache; replaces a previously loaded repo of the
    /// same alias
    pub fn load_repo(&mut self, info: &RepoInfo, solv_file: &Path) -> Result<()> {
        let conn = Connection::open(solv_file).map_err(|e| Error::CacheCorrupted {
            alias: info.alias().to_string(),
            reason: format!("cannot open {}: {e}", solv_file.display()),
        })?;

        let mut solvables = Vec::new();
        {
            let mut stmt = conn
                .prepare("SELECT name, evr, arch, kind, summary FROM solvables ORDER BY id")
                .map_err(|e| Error::CacheCorrupted {
                    alias: info.alias().to_string(),
                    reason: e.to_string(),
                })?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                })
                .map_err(|e| Error::CacheCorrupted {
                    alias: info.alias().to_string(),
                    reason: e.to_string(),
                })?;
            for row in rows {
                let (name, evr, arch, kind, summary) = row.map_err(|e| Error::CacheCorrupted {
                    alias: info.alias().to_string(),
                    reason: e.to_string(),
                })?;
                let kind = match kind.as_str() {
                    "pattern" => SolvableKind::Pattern,
                    _ => SolvableKind::Package,
                };
                solvables.push(Solvable {
                    name,
                    evr,
                    arch,
                    kind,
                    summary,
                });
            }
        }

        debug!(
            "loaded {} solvables for '{}' into the pool",
            solvables.len(),
            info.alias()
        );
        self.repos.insert(
            info.alias().to_string(),
            PoolRepo {
                info: info.clone(),
                solvables,
            },
        );
        Ok(())
    }

    pub fn repo(&self, alias: &str) -> Option<&PoolRepo> {
        self.repos.get(alias)
    }

    pub fn unload_repo(&mut self, alias: &str) -> bool {
        self.repos.remove(alias).is_some()
    }

    pub fn repo_count(&self) -> usize {
        self.repos.len()
    }

    pub fn repos(&self) -> impl Iterator<Item = &PoolRepo> {
        self.repos.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SolvWriter;
    use crate::parser::SolvableSink;
    use tempfile::TempDir;

    fn write_solv(path: &Path, names: &[&str]) {
        let mut writer = SolvWriter::create(path).unwrap();
        for name in names {
            writer
                .push(Solvable::package(*name, "1-1", "x86_64"))
                .unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_load_and_query() {
        let tmp = TempDir::new().unwrap();
        let solv = tmp.path().join("solv");
        write_solv(&solv, &["alpha", "beta"]);

        let mut pool = Pool::new();
        pool.load_repo(&RepoInfo::new("t"), &solv).unwrap();

        let repo = pool.repo("t").unwrap();
        assert_eq!(repo.solvable_count(), 2);
        assert!(repo.find("alpha").is_some());
        assert!(repo.find("gamma").is_none());
    }

    #[test]
    fn test_reload_replaces() {
        let tmp = TempDir::new().unwrap();
        let solv = tmp.path().join("solv");
        write_solv(&solv, &["alpha"]);

        let mut pool = Pool::new();
        pool.load_repo(&RepoInfo::new("t"), &solv).unwrap();
        write_solv(&solv, &["alpha", "beta", "gamma"]);
        pool.load_repo(&RepoInfo::new("t"), &solv).unwrap();

        assert_eq!(pool.repo("t").unwrap().solvable_count(), 3);
        assert_eq!(pool.repo_count(), 1);
    }

    #[test]
    fn test_corrupted_cache_is_reported() {
        let tmp = TempDir::new().unwrap();
        let solv = tmp.path().join("solv");
        std::fs::write(&solv, b"this is not a database").unwrap();

        let mut pool = Pool::new();
        let err = pool.load_repo(&RepoInfo::new("t"), &solv).unwrap_err();
        assert!(matches!(err, Error::CacheCorrupted { .. }));
    }

    #[test]
    fn test_unload() {
        let tmp = TempDir::new().unwrap();
        let solv = tmp.path().join("solv");
        write_solv(&solv, &["alpha"]);

        let mut pool = Pool::new();
        pool.load_repo(&RepoInfo::new("t"), &solv).unwrap();
        assert!(pool.unload_repo("t"));
        assert!(!pool.unload_repo("t"));
    }
}
