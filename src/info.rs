// src/info.rs

//! Repository and service descriptions
//!
//! [`RepoInfo`] is the stable record a registry entry round-trips
//! through; [`ServiceInfo`] describes a dynamic generator of such
//! records. Both are plain data, persisted as INI sections by the
//! registry.

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Format of a repository's metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepoType {
    /// repodata/repomd.xml driven metadata
    Rpmmd,
    /// `content` file driven metadata
    Yast2,
    /// A plain directory of packages, no index
    RpmPlainDir,
    #[default]
    Unknown,
}

impl RepoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoType::Rpmmd => "rpm-md",
            RepoType::Yast2 => "yast2",
            RepoType::RpmPlainDir => "plaindir",
            RepoType::Unknown => "NONE",
        }
    }

    /// Relative path of the master index inside the repository
    ///
    /// Plain directories have no index; their status is derived from the
    /// directory itself.
    pub fn master_index(&self) -> Option<&'static str> {
        match self {
            RepoType::Rpmmd => Some("repodata/repomd.xml"),
            RepoType::Yast2 => Some("content"),
            RepoType::RpmPlainDir | RepoType::Unknown => None,
        }
    }
}

impl fmt::Display for RepoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepoType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rpm-md" | "rpmmd" | "repomd" | "yum" => Ok(RepoType::Rpmmd),
            "yast2" | "yast" | "susetags" => Ok(RepoType::Yast2),
            "plaindir" => Ok(RepoType::RpmPlainDir),
            "" | "none" => Ok(RepoType::Unknown),
            other => Err(Error::ParseFailed(format!("unknown repo type '{other}'"))),
        }
    }
}

/// Scheme of a URL-ish location string, lowercased
pub fn url_scheme(url: &str) -> Option<String> {
    let colon = url.find(':')?;
    let scheme = &url[..colon];
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
    {
        return None;
    }
    Some(scheme.to_ascii_lowercase())
}

/// Join a location and a sub path without doubling separators
pub fn url_join(base: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return base.trim_end_matches('/').to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path)
}

fn derive_keep_packages(url: &str) -> bool {
    matches!(
        url_scheme(url).as_deref(),
        Some("http") | Some("https") | Some("ftp")
    )
}

/// Description of one repository
#[derive(Debug, Clone, PartialEq)]
pub struct RepoInfo {
    alias: String,
    /// Human readable label
    pub name: String,
    repo_type: RepoType,
    base_urls: Vec<String>,
    pub mirrorlist_url: Option<String>,
    /// Sub path below the chosen base location
    pub path: String,
    pub enabled: bool,
    pub autorefresh: bool,
    /// Explicit override of the scheme-derived value
    keep_packages_override: Option<bool>,
    keep_packages_derived: bool,
    /// Master switch for all signature checking on this repo
    pub gpg_check: bool,
    /// Refinement: check the downloaded repo metadata
    pub repo_gpg_check: Option<bool>,
    /// Refinement: check downloaded packages
    pub pkg_gpg_check: Option<bool>,
    pub gpg_key_url: Option<String>,
    pub priority: u32,
    /// Alias of the service that emitted this repo, if any
    pub service_owner: Option<String>,
    /// Protect this repo from service-driven removal
    pub keep_inactive: bool,
    /// Outcome of the last metadata signature verification
    pub valid_repo_signature: Option<bool>,
    metadata_path: Option<PathBuf>,
}

impl RepoInfo {
    pub const DEFAULT_PRIORITY: u32 = 99;

    pub fn new<S: Into<String>>(alias: S) -> Self {
        Self {
            alias: alias.into(),
            name: String::new(),
            repo_type: RepoType::Unknown,
            base_urls: Vec::new(),
            mirrorlist_url: None,
            path: "/".to_string(),
            enabled: true,
            autorefresh: false,
            keep_packages_override: None,
            keep_packages_derived: false,
            gpg_check: true,
            repo_gpg_check: None,
            pkg_gpg_check: None,
            gpg_key_url: None,
            priority: Self::DEFAULT_PRIORITY,
            service_owner: None,
            keep_inactive: false,
            valid_repo_signature: None,
            metadata_path: None,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn set_alias<S: Into<String>>(&mut self, alias: S) {
        self.alias = alias.into();
    }

    pub fn repo_type(&self) -> RepoType {
        self.repo_type
    }

    pub fn set_repo_type(&mut self, t: RepoType) {
        self.repo_type = t;
    }

    pub fn base_urls(&self) -> &[String] {
        &self.base_urls
    }

    /// The primary location, tried first
    pub fn primary_url(&self) -> Option<&str> {
        self.base_urls.first().map(String::as_str)
    }

    /// Replace all base URLs with a single one
    ///
    /// The keep-packages derivation is recomputed from the new primary;
    /// an explicit override stays untouched.
    pub fn set_base_url<S: Into<String>>(&mut self, url: S) {
        self.base_urls.clear();
        self.add_base_url(url);
    }

    /// Append a base URL; derivation only follows the primary
    pub fn add_base_url<S: Into<String>>(&mut self, url: S) {
        let url = url.into();
        if self.base_urls.is_empty() {
            self.keep_packages_derived = derive_keep_packages(&url);
        }
        self.base_urls.push(url);
    }

    /// Primary base location with the sub path applied
    pub fn location(&self) -> Result<String> {
        let base = self
            .primary_url()
            .ok_or_else(|| Error::ParseFailed(format!("repo '{}' has no base URL", self.alias)))?;
        Ok(url_join(base, &self.path))
    }

    /// Whether downloaded packages are kept on disk
    ///
    /// Derived from the current primary URL's scheme (true for remote
    /// schemes) unless explicitly overridden.
    pub fn keep_packages(&self) -> bool {
        self.keep_packages_override
            .unwrap_or(self.keep_packages_derived)
    }

    pub fn set_keep_packages(&mut self, keep: bool) {
        self.keep_packages_override = Some(keep);
    }

    pub fn keep_packages_overridden(&self) -> bool {
        self.keep_packages_override.is_some()
    }

    /// Whether downloaded repo metadata must be signature checked
    pub fn repo_gpg_check(&self) -> bool {
        self.gpg_check && self.repo_gpg_check.unwrap_or(true)
    }

    /// Whether an unverifiable signature aborts the refresh
    ///
    /// Only an explicit `repo_gpgcheck=1` makes the check mandatory; the
    /// default tolerates unsigned repositories with a warning.
    pub fn repo_gpg_check_is_mandatory(&self) -> bool {
        self.gpg_check && self.repo_gpg_check == Some(true)
    }

    pub fn pkg_gpg_check(&self) -> bool {
        self.gpg_check && self.pkg_gpg_check.unwrap_or(true)
    }

    /// Raw metadata directory after a successful refresh
    pub fn metadata_path(&self) -> Option<&Path> {
        self.metadata_path.as_deref()
    }

    pub fn set_metadata_path<P: Into<PathBuf>>(&mut self, p: P) {
        self.metadata_path = Some(p.into());
    }

    /// Whether the mirrored metadata carries a license archive
    pub fn has_license(&self) -> bool {
        let Some(raw) = self.metadata_path() else {
            return false;
        };
        raw.join("license.tar.gz").exists()
            || raw.join("suse/setup/descr/license.tar.gz").exists()
    }
}

/// Kind of service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceType {
    /// Local executable emitting repo definitions on stdout
    Plugin,
    /// Remote `repoindex.xml` listing repositories
    #[default]
    RemoteIndex,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Plugin => "plugin",
            ServiceType::RemoteIndex => "remote-index",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plugin" => Ok(ServiceType::Plugin),
            "remote-index" | "ri" => Ok(ServiceType::RemoteIndex),
            other => Err(Error::ParseFailed(format!("unknown service type '{other}'"))),
        }
    }
}

/// Description of one repository-generating service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInfo {
    alias: String,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub autorefresh: bool,
    pub service_type: ServiceType,
    /// One-shot commands consumed by the next expansion
    pub repos_to_enable: BTreeSet<String>,
    pub repos_to_disable: BTreeSet<String>,
    /// RFC 3339 timestamp of the last successful expansion
    pub last_refresh: Option<String>,
}

impl ServiceInfo {
    pub fn new<S: Into<String>, U: Into<String>>(alias: S, url: U) -> Self {
        Self {
            alias: alias.into(),
            name: String::new(),
            url: url.into(),
            enabled: true,
            autorefresh: false,
            service_type: ServiceType::RemoteIndex,
            repos_to_enable: BTreeSet::new(),
            repos_to_disable: BTreeSet::new(),
            last_refresh: None,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn set_alias<S: Into<String>>(&mut self, alias: S) {
        self.alias = alias.into();
    }
}
