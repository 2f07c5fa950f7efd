// src/parser/plaindir.rs

//! Plain-directory repositories: enumerate `*.rpm` and read headers

use super::{make_evr, Solvable, SolvableKind, SolvableSink};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

fn is_rpm(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("rpm")
}

/// Read one package header into a solvable record
pub fn read_rpm(path: &Path) -> Result<Solvable> {
    let file = File::open(path)
        .map_err(|e| Error::IoFailed(format!("cannot open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);

    let pkg = rpm::Package::parse(&mut reader)
        .map_err(|e| Error::ParseFailed(format!("cannot parse {}: {e}", path.display())))?;

    let name = pkg
        .metadata
        .get_name()
        .map_err(|e| Error::ParseFailed(format!("{}: no name: {e}", path.display())))?
        .to_string();
    let version = pkg
        .metadata
        .get_version()
        .map_err(|e| Error::ParseFailed(format!("{}: no version: {e}", path.display())))?
        .to_string();
    let release = pkg.metadata.get_release().ok().map(|s| s.to_string());
    let arch = pkg
        .metadata
        .get_arch()
        .ok()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "noarch".to_string());
    let epoch = pkg.metadata.get_epoch().ok().map(|e| e.to_string());
    let summary = pkg.metadata.get_summary().ok().map(|s| s.to_string());

    Ok(Solvable {
        name,
        evr: make_evr(epoch.as_deref(), &version, release.as_deref()),
        arch,
        kind: SolvableKind::Package,
        summary,
    })
}

/// Walk a directory tree and stream every readable `*.rpm` header
///
/// Unreadable packages are skipped with a warning; a directory with no
/// packages at all yields zero records, which the caller treats as an
/// empty repository rather than an error.
pub fn scan_rpms(dir: &Path, sink: &mut dyn SolvableSink) -> Result<usize> {
    let mut count = 0usize;
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || !is_rpm(entry.path()) {
            continue;
        }
        match read_rpm(entry.path()) {
            Ok(solvable) => {
                sink.push(solvable)?;
                count += 1;
            }
            Err(e) => warn!("skipping {}: {e}", entry.path().display()),
        }
    }
    debug!("scanned {count} packages below {}", dir.display());
    Ok(count)
}
