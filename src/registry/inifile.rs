// src/registry/inifile.rs

//! INI-style section files backing the registry
//!
//! `.repo` and `.service` files are plain `[section]` / `key = value`
//! text. Keys may repeat (`baseurl`), comments start with `#` or `;`.
//! Writing always goes through a temp file plus rename so readers never
//! observe a torn file.

use crate::error::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// One `[name]` section with its key/value lines in file order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

impl Section {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn push<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.entries.push((key.into(), value.into()));
    }

    /// First value of a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All values of a repeatable key, in file order
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse INI text into sections
pub fn parse_str(text: &str, origin: &str) -> Result<Vec<Section>> {
    let mut sections: Vec<Section> = Vec::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(rest) = line.strip_prefix('[') {
            let name = rest.strip_suffix(']').ok_or_else(|| {
                Error::ParseFailed(format!("{origin}:{}: unterminated section header", lineno + 1))
            })?;
            sections.push(Section::new(name.trim()));
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| {
            Error::ParseFailed(format!("{origin}:{}: expected 'key = value'", lineno + 1))
        })?;
        let section = sections.last_mut().ok_or_else(|| {
            Error::ParseFailed(format!("{origin}:{}: entry before any section", lineno + 1))
        })?;
        section.push(key.trim(), value.trim());
    }

    Ok(sections)
}

pub fn parse_file(path: &Path) -> Result<Vec<Section>> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::IoFailed(format!("cannot read {}: {e}", path.display())))?;
    parse_str(&text, &path.display().to_string())
}

pub fn serialize(sections: &[Section]) -> String {
    let mut out = String::new();
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push('[');
        out.push_str(&section.name);
        out.push_str("]\n");
        for (key, value) in &section.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
    }
    out
}

/// Write sections to a file atomically
pub fn write_file(path: &Path, sections: &[Section]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::IoFailed(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(parent)?;

    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(serialize(sections).as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
        .map_err(|e| Error::IoFailed(format!("cannot replace {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
# vendor file
[office]
name=Office Apps
baseurl=http://example.com/office
baseurl=http://mirror.example.com/office
enabled=1

[macromedia]
name = Macromedia
enabled = 0
";

    #[test]
    fn test_parse_sections_and_repeats() {
        let sections = parse_str(SAMPLE, "test").unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name, "office");
        assert_eq!(sections[0].get("name"), Some("Office Apps"));
        assert_eq!(sections[0].get_all("baseurl").count(), 2);
        assert_eq!(sections[1].get("enabled"), Some("0"));
    }

    #[test]
    fn test_round_trip() {
        let sections = parse_str(SAMPLE, "test").unwrap();
        let text = serialize(&sections);
        let again = parse_str(&text, "test").unwrap();
        assert_eq!(sections, again);
    }

    #[test]
    fn test_errors_carry_location() {
        let err = parse_str("[broken\n", "vendor.repo").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("vendor.repo:1"), "got: {msg}");

        assert!(parse_str("stray line\n", "x").is_err());
        assert!(parse_str("key=value\n", "x").is_err());
    }

    #[test]
    fn test_write_file_is_atomic_enough() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("repos.d/vendor.repo");
        let sections = parse_str(SAMPLE, "test").unwrap();

        write_file(&path, &sections).unwrap();
        assert_eq!(parse_file(&path).unwrap(), sections);
        assert!(!path.with_extension("tmp").exists());
    }
}
