// src/parser/susetags.rs

//! Readers for susetags ("yast2") metadata
//!
//! The master index is the `content` file: `KEY value` lines naming the
//! descriptor directory and, via `META`/`HASH` lines, the files below
//! it. Package records live in the `packages(.gz)` descriptor:
//!
//! ```text
//! =Pkg: bash 5.2.26 3.1 x86_64
//! =Sum: The GNU Bourne-Again Shell
//! ```

use super::{make_evr, open_stream, Solvable, SolvableKind, SolvableSink};
use crate::error::{Error, Result};
use std::io::BufRead;
use std::path::Path;
use tracing::debug;

/// Parsed view of a `content` master index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFile {
    /// Directory of the descriptor files, relative to the repo root
    pub descr_dir: String,
    /// Directory of the package payloads, relative to the repo root
    pub data_dir: String,
    /// Human readable repository label
    pub label: Option<String>,
    /// Files announced via META/HASH lines, relative to `descr_dir`
    pub meta_files: Vec<String>,
}

impl Default for ContentFile {
    fn default() -> Self {
        Self {
            descr_dir: "suse/setup/descr".to_string(),
            data_dir: "suse".to_string(),
            label: None,
            meta_files: Vec::new(),
        }
    }
}

/// Read a `content` file
pub fn read_content(path: &Path) -> Result<ContentFile> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::IoFailed(format!("cannot read {}: {e}", path.display())))?;

    let mut content = ContentFile::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut words = line.split_whitespace();
        let Some(key) = words.next() else { continue };
        match key {
            "DESCRDIR" => {
                if let Some(v) = words.next() {
                    content.descr_dir = v.trim_matches('/').to_string();
                }
            }
            "DATADIR" => {
                if let Some(v) = words.next() {
                    content.data_dir = v.trim_matches('/').to_string();
                }
            }
            "LABEL" => {
                let rest: Vec<&str> = words.collect();
                if !rest.is_empty() {
                    content.label = Some(rest.join(" "));
                }
            }
            // META <algo> <checksum> <filename>
            "META" | "HASH" | "KEY" => {
                let fields: Vec<&str> = words.collect();
                if let Some(file) = fields.get(2) {
                    content.meta_files.push((*file).to_string());
                }
            }
            _ => {}
        }
    }
    Ok(content)
}

/// Stream a `packages(.gz)` descriptor into the sink
pub fn read_packages(path: &Path, sink: &mut dyn SolvableSink) -> Result<usize> {
    let reader = open_stream(path)?;
    let mut count = 0usize;
    let mut pending: Option<Solvable> = None;

    for line in reader.lines() {
        let line = line.map_err(|e| Error::IoFailed(format!("cannot read {}: {e}", path.display())))?;

        if let Some(rest) = line.strip_prefix("=Pkg:") {
            if let Some(done) = pending.take() {
                sink.push(done)?;
                count += 1;
            }
            let fields: Vec<&str> = rest.split_whitespace().collect();
            if fields.len() < 4 {
                return Err(Error::ParseFailed(format!(
                    "{}: malformed =Pkg: line '{rest}'",
                    path.display()
                )));
            }
            pending = Some(Solvable {
                name: fields[0].to_string(),
                evr: make_evr(None, fields[1], Some(fields[2])),
                arch: fields[3].to_string(),
                kind: SolvableKind::Package,
                summary: None,
            });
        } else if let Some(rest) = line.strip_prefix("=Sum:") {
            if let Some(pkg) = pending.as_mut() {
                pkg.summary = Some(rest.trim().to_string());
            }
        }
    }
    if let Some(done) = pending.take() {
        sink.push(done)?;
        count += 1;
    }

    debug!("parsed {count} packages from {}", path.display());
    Ok(count)
}
