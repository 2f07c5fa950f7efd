// src/cache.rs

//! Building the binary solver cache
//!
//! The `solv` file is a small SQLite database of solvable records. A
//! build streams parser output into `solv.new`, fsyncs, renames over the
//! previous cache and only then writes the cookie. Any failure on the
//! way deletes `solv.new` and leaves the prior cache untouched.

use crate::dispose::{CancelToken, ManagedFile};
use crate::error::{Error, Result};
use crate::info::{RepoInfo, RepoType};
use crate::layout::PathLayout;
use crate::lock::LockFile;
use crate::parser::{plaindir, primary, repomd, susetags, Solvable, SolvableSink};
use crate::status::{read_cookie, write_cookie, RepoStatus};
use rusqlite::{params, Connection};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SOLV_SCHEMA: &str = "
CREATE TABLE meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE solvables (
    id      INTEGER PRIMARY KEY,
    name    TEXT NOT NULL,
    evr     TEXT NOT NULL,
    arch    TEXT NOT NULL,
    kind    TEXT NOT NULL,
    summary TEXT
);
CREATE TABLE files (
    solvable_name TEXT NOT NULL,
    path          TEXT NOT NULL
);
";

/// Streams solvable records into a solv database file
pub struct SolvWriter {
    conn: Connection,
    path: PathBuf,
    solvables: usize,
}

impl SolvWriter {
    /// Create a fresh database at `path`, replacing leftovers
    pub fn create(path: &Path) -> Result<Self> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = MEMORY;")?;
        conn.execute_batch(SOLV_SCHEMA)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            solvables: 0,
        })
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Close the database and force it onto disk
    pub fn finish(self) -> Result<PathBuf> {
        self.set_meta("solvables", &self.solvables.to_string())?;
        let path = self.path;
        self.conn
            .close()
            .map_err(|(_, e)| Error::from(e))?;
        File::open(&path)?.sync_all()?;
        Ok(path)
    }
}

impl SolvableSink for SolvWriter {
    fn push(&mut self, solvable: Solvable) -> Result<()> {
        self.conn.execute(
            "INSERT INTO solvables (name, evr, arch, kind, summary) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                solvable.name,
                solvable.evr,
                solvable.arch,
                solvable.kind.as_str(),
                solvable.summary,
            ],
        )?;
        self.solvables += 1;
        Ok(())
    }

    fn push_file(&mut self, package: &str, path: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO files (solvable_name, path) VALUES (?1, ?2)",
            params![package, path],
        )?;
        Ok(())
    }
}

fn feed_rpmmd(raw_dir: &Path, sink: &mut SolvWriter, cancel: &CancelToken) -> Result<()> {
    let entries = repomd::read_entries(&raw_dir.join("repodata/repomd.xml"))?;
    let mut saw_primary = false;

    for entry in &entries {
        cancel.check()?;
        let path = raw_dir.join(&entry.href);
        match entry.data_type.as_str() {
            "primary" => {
                primary::read_primary(&path, sink)?;
                saw_primary = true;
            }
            "patterns" => {
                if path.exists() {
                    primary::read_patterns(&path, sink)?;
                } else {
                    warn!("declared {} is missing, skipping", entry.href);
                }
            }
            "filelists" => {
                if path.exists() {
                    primary::read_filelists(&path, sink)?;
                } else {
                    warn!("declared {} is missing, skipping", entry.href);
                }
            }
            other => debug!("no cache consumer for '{other}' data, skipping"),
        }
    }

    if !saw_primary {
        return Err(Error::ParseFailed(format!(
            "{}: repomd.xml declares no primary data",
            raw_dir.display()
        )));
    }
    Ok(())
}

fn feed_susetags(raw_dir: &Path, sink: &mut SolvWriter, cancel: &CancelToken) -> Result<()> {
    cancel.check()?;
    let content = susetags::read_content(&raw_dir.join("content"))?;

    let descr = raw_dir.join(&content.descr_dir);
    let packages = ["packages", "packages.gz"]
        .iter()
        .map(|n| descr.join(n))
        .find(|p| p.exists())
        .ok_or_else(|| {
            Error::ParseFailed(format!("{}: no packages descriptor", descr.display()))
        })?;
    susetags::read_packages(&packages, sink)?;
    Ok(())
}

/// Build the solver cache for one repository
///
/// `source_dir` is the raw metadata mirror, or the package directory
/// itself for plain directories. `anchor` must be the status the source
/// had when it was mirrored; it becomes the cookie on success.
pub fn build_cache(
    layout: &PathLayout,
    repo: &RepoInfo,
    source_dir: &Path,
    anchor: &RepoStatus,
    cancel: &CancelToken,
) -> Result<()> {
    let alias = repo.alias();
    let solv_dir = layout.solv_dir(alias)?;
    fs::create_dir_all(&solv_dir)?;

    // at most one concurrent build per alias
    let _build_lock = LockFile::exclusive(layout.build_lock_file(alias)?)?;

    let solv_new = solv_dir.join("solv.new");
    let mut guard = ManagedFile::with_unlink(&solv_new);

    let mut writer = SolvWriter::create(&solv_new)?;
    writer.set_meta("alias", alias)?;
    writer.set_meta("repo_type", repo.repo_type().as_str())?;

    match repo.repo_type() {
        RepoType::Rpmmd => feed_rpmmd(source_dir, &mut writer, cancel)?,
        RepoType::Yast2 => feed_susetags(source_dir, &mut writer, cancel)?,
        RepoType::RpmPlainDir => {
            cancel.check()?;
            plaindir::scan_rpms(source_dir, &mut writer)?;
        }
        RepoType::Unknown => {
            return Err(Error::RepoUnknownType {
                alias: alias.to_string(),
                url: source_dir.display().to_string(),
            })
        }
    }

    let solv_new = writer.finish()?;

    cancel.check()?;
    let solv = layout.solv_file(alias)?;
    fs::rename(&solv_new, &solv)
        .map_err(|e| Error::IoFailed(format!("cannot activate {}: {e}", solv.display())))?;
    guard.disarm();

    write_cookie(&layout.cookie_file(alias)?, anchor)?;
    info!("built solver cache for '{alias}'");
    Ok(())
}

/// The status a source directory currently has
pub fn source_status(repo_type: RepoType, source_dir: &Path) -> Result<RepoStatus> {
    match repo_type.master_index() {
        Some(rel) => RepoStatus::from_file(&source_dir.join(rel)),
        None => RepoStatus::from_dir(source_dir),
    }
}

/// Cache validity: solv and cookie exist, and the cookie anchors the
/// given status
pub fn is_cached(layout: &PathLayout, alias: &str, current: &RepoStatus) -> bool {
    let Ok(solv) = layout.solv_file(alias) else {
        return false;
    };
    let Ok(cookie) = layout.cookie_file(alias) else {
        return false;
    };
    if !solv.exists() || !cookie.exists() || current.is_empty() {
        return false;
    }
    read_cookie(&cookie) == *current
}

/// Drop the solver cache of one repository
pub fn clean_cache(layout: &PathLayout, alias: &str) -> Result<()> {
    let dir = layout.solv_dir(alias)?;
    match fs::remove_dir_all(&dir) {
        Ok(()) => {
            info!("cleaned solver cache of '{alias}'");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::IoFailed(format!(
            "cannot remove {}: {e}",
            dir.display()
        ))),
    }
}

/// Drop the raw metadata mirror of one repository
pub fn clean_metadata(layout: &PathLayout, alias: &str) -> Result<()> {
    let dir = layout.raw_dir(alias)?;
    match fs::remove_dir_all(&dir) {
        Ok(()) => {
            info!("cleaned raw metadata of '{alias}'");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::IoFailed(format!(
            "cannot remove {}: {e}",
            dir.display()
        ))),
    }
}

/// Number of solvables in a built cache, straight from its meta table
pub fn cached_solvable_count(solv_file: &Path) -> Result<usize> {
    let conn = Connection::open(solv_file)?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM solvables", [], |row| row.get(0))?;
    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SolvableKind;
    use tempfile::TempDir;

    fn yast2_raw(dir: &Path, pkgs: &[(&str, &str)]) {
        let descr = dir.join("suse/setup/descr");
        fs::create_dir_all(&descr).unwrap();
        fs::write(dir.join("content"), "DESCRDIR suse/setup/descr\nMETA SHA256 00 packages\n")
            .unwrap();
        let mut packages = String::from("=Ver: 2.0\n");
        for (name, ver) in pkgs {
            packages.push_str(&format!("=Pkg: {name} {ver} 1 x86_64\n=Sum: test {name}\n"));
        }
        fs::write(descr.join("packages"), packages).unwrap();
    }

    fn build(layout: &PathLayout, repo: &RepoInfo, raw: &Path) -> Result<()> {
        let anchor = source_status(repo.repo_type(), raw)?;
        build_cache(layout, repo, raw, &anchor, &CancelToken::new())
    }

    #[test]
    fn test_build_and_validity() {
        let tmp = TempDir::new().unwrap();
        let raw = tmp.path().join("raw");
        yast2_raw(&raw, &[("alpha", "1.0"), ("beta", "2.0")]);

        let layout = PathLayout::new(tmp.path().join("cache"));
        let mut repo = RepoInfo::new("t");
        repo.set_repo_type(RepoType::Yast2);

        let current = source_status(RepoType::Yast2, &raw).unwrap();
        assert!(!is_cached(&layout, "t", &current));

        build(&layout, &repo, &raw).unwrap();
        assert!(layout.solv_file("t").unwrap().exists());
        assert!(layout.cookie_file("t").unwrap().exists());
        assert!(is_cached(&layout, "t", &current));
        assert_eq!(
            cached_solvable_count(&layout.solv_file("t").unwrap()).unwrap(),
            2
        );

        // changing the raw tree invalidates the cache
        yast2_raw(&raw, &[("alpha", "1.1")]);
        let changed = source_status(RepoType::Yast2, &raw).unwrap();
        if changed != current {
            assert!(!is_cached(&layout, "t", &changed));
        }

        repo.set_repo_type(RepoType::Yast2);
        clean_cache(&layout, "t").unwrap();
        assert!(!is_cached(&layout, "t", &current));
        // a second clean is idempotent
        clean_cache(&layout, "t").unwrap();
    }

    #[test]
    fn test_failed_build_preserves_previous_cache() {
        let tmp = TempDir::new().unwrap();
        let raw = tmp.path().join("raw");
        yast2_raw(&raw, &[("alpha", "1.0")]);

        let layout = PathLayout::new(tmp.path().join("cache"));
        let mut repo = RepoInfo::new("t");
        repo.set_repo_type(RepoType::Yast2);
        build(&layout, &repo, &raw).unwrap();

        let solv = layout.solv_file("t").unwrap();
        let cookie = layout.cookie_file("t").unwrap();
        let solv_before = fs::read(&solv).unwrap();
        let cookie_before = fs::read(&cookie).unwrap();

        // break the raw tree so the next build fails
        fs::remove_file(raw.join("suse/setup/descr/packages")).unwrap();
        let anchor = source_status(RepoType::Yast2, &raw).unwrap();
        assert!(build_cache(&layout, &repo, &raw, &anchor, &CancelToken::new()).is_err());

        assert_eq!(fs::read(&solv).unwrap(), solv_before);
        assert_eq!(fs::read(&cookie).unwrap(), cookie_before);
        assert!(!layout.solv_dir("t").unwrap().join("solv.new").exists());
    }

    #[test]
    fn test_cancelled_build_leaves_no_solv_new() {
        let tmp = TempDir::new().unwrap();
        let raw = tmp.path().join("raw");
        yast2_raw(&raw, &[("alpha", "1.0")]);

        let layout = PathLayout::new(tmp.path().join("cache"));
        let mut repo = RepoInfo::new("t");
        repo.set_repo_type(RepoType::Yast2);

        let cancel = CancelToken::new();
        cancel.cancel();
        let anchor = source_status(RepoType::Yast2, &raw).unwrap();
        assert!(matches!(
            build_cache(&layout, &repo, &raw, &anchor, &cancel),
            Err(Error::Cancelled)
        ));
        assert!(!layout.solv_dir("t").unwrap().join("solv.new").exists());
        assert!(!layout.solv_file("t").unwrap().exists());
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let layout = PathLayout::new(tmp.path().join("cache"));
        let repo = RepoInfo::new("t");
        let err = build_cache(
            &layout,
            &repo,
            tmp.path(),
            &RepoStatus::empty(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::RepoUnknownType { .. }));
    }

    #[test]
    fn test_solv_writer_records() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("solv.new");
        let mut writer = SolvWriter::create(&path).unwrap();
        writer
            .push(Solvable {
                name: "x".into(),
                evr: "1-1".into(),
                arch: "noarch".into(),
                kind: SolvableKind::Package,
                summary: Some("s".into()),
            })
            .unwrap();
        writer.push_file("x", "/usr/bin/x").unwrap();
        let path = writer.finish().unwrap();
        assert_eq!(cached_solvable_count(&path).unwrap(), 1);
    }
}
