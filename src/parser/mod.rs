// src/parser/mod.rs

//! Streaming readers for the supported metadata formats
//!
//! Each format reader walks the raw metadata tree and emits records into
//! a [`SolvableSink`]; the cache builder owns the sink and the dispatch
//! on repository type.

pub mod plaindir;
pub mod primary;
pub mod repomd;
pub mod susetags;

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Kind of an emitted record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolvableKind {
    Package,
    Pattern,
}

impl SolvableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolvableKind::Package => "package",
            SolvableKind::Pattern => "pattern",
        }
    }
}

/// One record streamed into the solver cache
#[derive(Debug, Clone, PartialEq)]
pub struct Solvable {
    pub name: String,
    /// epoch:version-release, epoch omitted when zero
    pub evr: String,
    pub arch: String,
    pub kind: SolvableKind,
    pub summary: Option<String>,
}

impl Solvable {
    pub fn package<N: Into<String>, E: Into<String>, A: Into<String>>(
        name: N,
        evr: E,
        arch: A,
    ) -> Self {
        Self {
            name: name.into(),
            evr: evr.into(),
            arch: arch.into(),
            kind: SolvableKind::Package,
            summary: None,
        }
    }
}

/// Receiver of streamed records
pub trait SolvableSink {
    fn push(&mut self, solvable: Solvable) -> Result<()>;

    /// File list entry of a package, from filelists metadata
    fn push_file(&mut self, package: &str, path: &str) -> Result<()>;
}

/// Compose epoch/version/release into the canonical evr form
pub fn make_evr(epoch: Option<&str>, version: &str, release: Option<&str>) -> String {
    let mut evr = String::new();
    match epoch {
        Some(e) if !e.is_empty() && e != "0" => {
            evr.push_str(e);
            evr.push(':');
        }
        _ => {}
    }
    evr.push_str(version);
    if let Some(rel) = release {
        if !rel.is_empty() {
            evr.push('-');
            evr.push_str(rel);
        }
    }
    evr
}

/// Open a metadata stream, transparently ungzipping `*.gz`
pub fn open_stream(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)
        .map_err(|e| Error::IoFailed(format!("cannot open {}: {e}", path.display())))?;
    let is_gz = path.extension().and_then(|s| s.to_str()) == Some("gz");
    let reader: Box<dyn Read> = if is_gz {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

#[cfg(test)]
pub(crate) mod testsink {
    use super::*;

    /// Collects everything, for parser unit tests
    #[derive(Default)]
    pub struct CollectSink {
        pub solvables: Vec<Solvable>,
        pub files: Vec<(String, String)>,
    }

    impl SolvableSink for CollectSink {
        fn push(&mut self, solvable: Solvable) -> Result<()> {
            self.solvables.push(solvable);
            Ok(())
        }

        fn push_file(&mut self, package: &str, path: &str) -> Result<()> {
            self.files.push((package.to_string(), path.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_evr() {
        assert_eq!(make_evr(None, "1.2", Some("3")), "1.2-3");
        assert_eq!(make_evr(Some("0"), "1.2", Some("3")), "1.2-3");
        assert_eq!(make_evr(Some("2"), "1.2", Some("3")), "2:1.2-3");
        assert_eq!(make_evr(None, "1.2", None), "1.2");
    }

    #[test]
    fn test_open_stream_plain_and_gz() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let tmp = tempfile::TempDir::new().unwrap();
        let plain = tmp.path().join("a.xml");
        std::fs::write(&plain, b"hello").unwrap();

        let gz = tmp.path().join("a.xml.gz");
        let mut enc = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        enc.write_all(b"hello").unwrap();
        enc.finish().unwrap();

        for path in [plain, gz] {
            let mut out = String::new();
            open_stream(&path).unwrap().read_to_string(&mut out).unwrap();
            assert_eq!(out, "hello");
        }
    }
}
