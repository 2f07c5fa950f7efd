// src/parser/repomd.rs

//! repomd.xml reader: declared data files and keyhints
//!
//! The master index of an rpm-md repository lists the actual metadata
//! files (`<data type="primary"><location href=.../>`) and may announce
//! additional signing keys as keyhints inside its `<tags>` block, each
//! of the form `<content>FILENAME?fpr=KEYID</content>`.

use crate::error::{Error, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::Path;

/// One `<data>` entry of a repomd.xml
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepomdEntry {
    /// The `type` attribute: primary, filelists, other, patterns, …
    pub data_type: String,
    /// Location relative to the repository root
    pub href: String,
    /// Declared checksum, when present
    pub checksum: Option<String>,
}

fn attr_value(e: &quick_xml::events::BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == name)
        .map(|a| String::from_utf8_lossy(a.value.as_ref()).into_owned())
}

/// Read all declared data entries from a repomd.xml file
pub fn read_entries(path: &Path) -> Result<Vec<RepomdEntry>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::IoFailed(format!("cannot read {}: {e}", path.display())))?;

    let mut reader = Reader::from_reader(text.as_bytes());
    reader.trim_text(true);

    let mut entries = Vec::new();
    let mut buf = Vec::new();
    let mut current: Option<RepomdEntry> = None;
    let mut in_checksum = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"data" => {
                current = attr_value(&e, b"type").map(|data_type| RepomdEntry {
                    data_type,
                    href: String::new(),
                    checksum: None,
                });
            }
            Ok(Event::Start(e) | Event::Empty(e)) if e.name().as_ref() == b"location" => {
                if let (Some(entry), Some(href)) = (current.as_mut(), attr_value(&e, b"href")) {
                    entry.href = href;
                }
            }
            Ok(Event::Start(e)) if e.name().as_ref() == b"checksum" => {
                in_checksum = current.is_some();
            }
            Ok(Event::Text(e)) if in_checksum => {
                if let Some(entry) = current.as_mut() {
                    entry.checksum = Some(e.unescape().unwrap_or_default().into_owned());
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"checksum" => {
                in_checksum = false;
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"data" => {
                if let Some(entry) = current.take() {
                    if !entry.href.is_empty() {
                        entries.push(entry);
                    }
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

    Ok(entries)
}

/// Read the keyhints announced by a repomd.xml file
///
/// Returns `(filename, key id)` pairs in emission order; contents
/// without an `fpr=` query are not keyhints and are skipped.
pub fn keyhints(path: &Path) -> Result<Vec<(String, String)>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::IoFailed(format!("cannot read {}: {e}", path.display())))?;

    let mut reader = Reader::from_reader(text.as_bytes());
    reader.trim_text(true);

    let mut hints = Vec::new();
    let mut buf = Vec::new();
    let mut in_tags = false;
    let mut in_content = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"tags" => in_tags = true,
            Ok(Event::End(e)) if e.name().as_ref() == b"tags" => in_tags = false,
            Ok(Event::Start(e)) if in_tags && e.name().as_ref() == b"content" => {
                in_content = true;
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"content" => in_content = false,
            Ok(Event::Text(e)) if in_content => {
                let text = e.unescape().unwrap_or_default();
                if let Some((file, query)) = text.split_once('?') {
                    if let Some(id) = query.strip_prefix("fpr=") {
                        if !file.is_empty() && !id.is_empty() {
                            hints.push((file.to_string(), id.to_string()));
                        }
                    }
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

    Ok(hints)
}
