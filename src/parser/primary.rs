// src/parser/primary.rs

//! Streaming readers for rpm-md package metadata
//!
//! `primary.xml(.gz)` carries the package records, `patterns.xml(.gz)`
//! optional pattern definitions, `filelists.xml(.gz)` per-package file
//! lists. All three stream record-by-record into the sink.

use super::{make_evr, open_stream, Solvable, SolvableKind, SolvableSink};
use crate::error::{Error, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::Path;
use tracing::debug;

#[derive(Default)]
struct PackageBuilder {
    name: Option<String>,
    epoch: Option<String>,
    ver: Option<String>,
    rel: Option<String>,
    arch: Option<String>,
    summary: Option<String>,
}

impl PackageBuilder {
    fn build(self, kind: SolvableKind, origin: &Path) -> Result<Solvable> {
        let name = self
            .name
            .ok_or_else(|| Error::ParseFailed(format!("{}: package without name", origin.display())))?;
        let ver = self
            .ver
            .ok_or_else(|| Error::ParseFailed(format!("{}: '{name}' without version", origin.display())))?;
        Ok(Solvable {
            name,
            evr: make_evr(self.epoch.as_deref(), &ver, self.rel.as_deref()),
            arch: self.arch.unwrap_or_else(|| "noarch".to_string()),
            kind,
            summary: self.summary,
        })
    }
}

fn attr_value(e: &quick_xml::events::BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == name)
        .map(|a| String::from_utf8_lossy(a.value.as_ref()).into_owned())
}

/// Stream a primary.xml(.gz) file into the sink, returning the count
pub fn read_primary(path: &Path, sink: &mut dyn SolvableSink) -> Result<usize> {
    read_packages_as(path, SolvableKind::Package, b"package", sink)
}

/// Stream a patterns.xml(.gz) file into the sink, returning the count
pub fn read_patterns(path: &Path, sink: &mut dyn SolvableSink) -> Result<usize> {
    read_packages_as(path, SolvableKind::Pattern, b"pattern", sink)
}

fn read_packages_as(
    path: &Path,
    kind: SolvableKind,
    record_tag: &[u8],
    sink: &mut dyn SolvableSink,
) -> Result<usize> {
    let mut reader = Reader::from_reader(open_stream(path)?);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut count = 0usize;
    let mut current: Option<PackageBuilder> = None;
    let mut current_tag: Vec<u8> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = e.name().as_ref().to_vec();
                if tag == record_tag {
                    current = Some(PackageBuilder::default());
                }
                current_tag = tag;
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"version" => {
                if let Some(pkg) = current.as_mut() {
                    pkg.epoch = attr_value(&e, b"epoch");
                    pkg.ver = attr_value(&e, b"ver");
                    pkg.rel = attr_value(&e, b"rel");
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(pkg) = current.as_mut() {
                    let text = e.unescape().unwrap_or_default().into_owned();
                    match current_tag.as_slice() {
                        b"name" => pkg.name = Some(text),
                        b"arch" => pkg.arch = Some(text),
                        b"summary" => pkg.summary = Some(text),
                        b"version" if pkg.ver.is_none() => pkg.ver = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == record_tag {
                    if let Some(builder) = current.take() {
                        sink.push(builder.build(kind, path)?)?;
                        count += 1;
                    }
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseFailed(format!(
                    "failed to parse {}: {e}",
                    path.display()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    debug!("parsed {count} records from {}", path.display());
    Ok(count)
}

/// Stream a filelists.xml(.gz) file into the sink, returning the count
/// of file entries
pub fn read_filelists(path: &Path, sink: &mut dyn SolvableSink) -> Result<usize> {
    let mut reader = Reader::from_reader(open_stream(path)?);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut count = 0usize;
    let mut package: Option<String> = None;
    let mut in_file = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"package" => {
                package = attr_value(&e, b"name");
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"package" => package = None,
            Ok(Event::Start(e)) if e.name().as_ref() == b"file" => in_file = true,
            Ok(Event::End(e)) if e.name().as_ref() == b"file" => in_file = false,
            Ok(Event::Text(e)) if in_file => {
                if let Some(pkg) = &package {
                    let path_text = e.unescape().unwrap_or_default();
                    sink.push_file(pkg, &path_text)?;
                    count += 1;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseFailed(format!(
                    "failed to parse {}: {e}",
                    path.display()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    debug!("parsed {count} file entries from {}", path.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::testsink::CollectSink;
    use tempfile::TempDir;

    const PRIMARY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" packages="2">
  <package type="rpm">
    <name>kernel-default</name>
    <arch>x86_64</arch>
    <version epoch="0" ver="6.4.0" rel="150600.1"/>
    <summary>The Standard Kernel</summary>
  </package>
  <package type="rpm">
    <name>bash</name>
    <arch>x86_64</arch>
    <version epoch="1" ver="5.2.26" rel="3.1"/>
    <summary>The GNU Bourne-Again Shell</summary>
  </package>
</metadata>
"#;

    #[test]
    fn test_read_primary() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("primary.xml");
        std::fs::write(&path, PRIMARY).unwrap();

        let mut sink = CollectSink::default();
        let count = read_primary(&path, &mut sink).unwrap();
        assert_eq!(count, 2);
        assert_eq!(sink.solvables[0].name, "kernel-default");
        assert_eq!(sink.solvables[0].evr, "6.4.0-150600.1");
        assert_eq!(sink.solvables[1].evr, "1:5.2.26-3.1");
        assert_eq!(sink.solvables[1].kind, SolvableKind::Package);
    }

    #[test]
    fn test_read_primary_gz() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("primary.xml.gz");
        let mut enc = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::default());
        enc.write_all(PRIMARY.as_bytes()).unwrap();
        enc.finish().unwrap();

        let mut sink = CollectSink::default();
        assert_eq!(read_primary(&path, &mut sink).unwrap(), 2);
    }

    #[test]
    fn test_package_without_name_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("primary.xml");
        std::fs::write(
            &path,
            "<metadata><package><arch>noarch</arch><version ver=\"1\" rel=\"1\"/></package></metadata>",
        )
        .unwrap();

        let mut sink = CollectSink::default();
        assert!(read_primary(&path, &mut sink).is_err());
    }

    #[test]
    fn test_read_patterns() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("patterns.xml");
        std::fs::write(
            &path,
            "<patterns count=\"1\"><pattern><name>base</name><arch>x86_64</arch>\
             <version epoch=\"0\" ver=\"20240101\" rel=\"1\"/></pattern></patterns>",
        )
        .unwrap();

        let mut sink = CollectSink::default();
        assert_eq!(read_patterns(&path, &mut sink).unwrap(), 1);
        assert_eq!(sink.solvables[0].kind, SolvableKind::Pattern);
        assert_eq!(sink.solvables[0].name, "base");
    }

    #[test]
    fn test_read_filelists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("filelists.xml");
        std::fs::write(
            &path,
            "<filelists><package pkgid=\"xx\" name=\"bash\" arch=\"x86_64\">\
             <version epoch=\"1\" ver=\"5.2.26\" rel=\"3.1\"/>\
             <file>/usr/bin/bash</file><file>/usr/bin/sh</file></package></filelists>",
        )
        .unwrap();

        let mut sink = CollectSink::default();
        assert_eq!(read_filelists(&path, &mut sink).unwrap(), 2);
        assert_eq!(sink.files[0], ("bash".to_string(), "/usr/bin/bash".to_string()));
    }
}
