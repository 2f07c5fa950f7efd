// src/registry/mod.rs

//! Persistent registry of repositories and services
//!
//! Every repository and service definition lives in exactly one INI file
//! inside its directory. A file may hold several sections (vendor drops,
//! imported bundles); mutation rewrites only the affected file, and
//! removing the last section of a file removes the file itself.
//!
//! Readers re-scan the directories on every call, so without the
//! metadata lock they observe the on-disk state of the last release.

pub mod inifile;

use crate::error::{Error, Result};
use crate::info::{RepoInfo, RepoType, ServiceInfo, ServiceType};
use crate::layout;
use inifile::Section;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn bool_str(v: bool) -> &'static str {
    if v {
        "1"
    } else {
        "0"
    }
}

/// Build the INI section for a repository
pub fn repo_to_section(repo: &RepoInfo) -> Section {
    let mut s = Section::new(repo.alias());
    if !repo.name.is_empty() {
        s.push("name", &repo.name);
    }
    s.push("enabled", bool_str(repo.enabled));
    s.push("autorefresh", bool_str(repo.autorefresh));
    for url in repo.base_urls() {
        s.push("baseurl", url);
    }
    if let Some(ml) = &repo.mirrorlist_url {
        s.push("mirrorlist", ml);
    }
    if repo.path != "/" {
        s.push("path", &repo.path);
    }
    if repo.repo_type() != RepoType::Unknown {
        s.push("type", repo.repo_type().as_str());
    }
    s.push("gpgcheck", bool_str(repo.gpg_check));
    if let Some(v) = repo.repo_gpg_check {
        s.push("repo_gpgcheck", bool_str(v));
    }
    if let Some(v) = repo.pkg_gpg_check {
        s.push("pkg_gpgcheck", bool_str(v));
    }
    if let Some(key) = &repo.gpg_key_url {
        s.push("gpgkey", key);
    }
    if repo.keep_packages_overridden() {
        s.push("keeppackages", bool_str(repo.keep_packages()));
    }
    if repo.priority != RepoInfo::DEFAULT_PRIORITY {
        s.push("priority", repo.priority.to_string());
    }
    if let Some(owner) = &repo.service_owner {
        s.push("service", owner);
    }
    if repo.keep_inactive {
        s.push("keepinactive", "1");
    }
    s
}

/// Reconstruct a repository from an INI section
pub fn section_to_repo(section: &Section) -> Result<RepoInfo> {
    let mut repo = RepoInfo::new(section.name.clone());
    for (key, value) in &section.entries {
        match key.as_str() {
            "name" => repo.name = value.clone(),
            "enabled" => repo.enabled = parse_bool(value).unwrap_or(true),
            "autorefresh" => repo.autorefresh = parse_bool(value).unwrap_or(false),
            "baseurl" => repo.add_base_url(value.clone()),
            "mirrorlist" => repo.mirrorlist_url = Some(value.clone()),
            "path" => repo.path = value.clone(),
            "type" => repo.set_repo_type(value.parse()?),
            "gpgcheck" => repo.gpg_check = parse_bool(value).unwrap_or(true),
            "repo_gpgcheck" => repo.repo_gpg_check = parse_bool(value),
            "pkg_gpgcheck" => repo.pkg_gpg_check = parse_bool(value),
            "gpgkey" => repo.gpg_key_url = Some(value.clone()),
            "keeppackages" => {
                if let Some(v) = parse_bool(value) {
                    repo.set_keep_packages(v);
                }
            }
            "priority" => {
                repo.priority = value
                    .parse()
                    .map_err(|_| Error::ParseFailed(format!("bad priority '{value}'")))?
            }
            "service" => repo.service_owner = Some(value.clone()),
            "keepinactive" => repo.keep_inactive = parse_bool(value).unwrap_or(false),
            other => debug!("ignoring unknown repo key '{other}'"),
        }
    }
    Ok(repo)
}

/// Build the INI section for a service
pub fn service_to_section(service: &ServiceInfo) -> Section {
    let mut s = Section::new(service.alias());
    if !service.name.is_empty() {
        s.push("name", &service.name);
    }
    s.push("url", &service.url);
    s.push("enabled", bool_str(service.enabled));
    s.push("autorefresh", bool_str(service.autorefresh));
    s.push("type", service.service_type.as_str());
    if !service.repos_to_enable.is_empty() {
        let joined: Vec<&str> = service.repos_to_enable.iter().map(String::as_str).collect();
        s.push("repostoenable", joined.join(" "));
    }
    if !service.repos_to_disable.is_empty() {
        let joined: Vec<&str> = service.repos_to_disable.iter().map(String::as_str).collect();
        s.push("repostodisable", joined.join(" "));
    }
    if let Some(ts) = &service.last_refresh {
        s.push("lastrefresh", ts);
    }
    s
}

/// Reconstruct a service from an INI section
pub fn section_to_service(section: &Section) -> Result<ServiceInfo> {
    let mut service = ServiceInfo::new(section.name.clone(), "");
    for (key, value) in &section.entries {
        match key.as_str() {
            "name" => service.name = value.clone(),
            "url" => service.url = value.clone(),
            "enabled" => service.enabled = parse_bool(value).unwrap_or(true),
            "autorefresh" => service.autorefresh = parse_bool(value).unwrap_or(false),
            "type" => service.service_type = value.parse()?,
            "repostoenable" => {
                service.repos_to_enable = value.split_whitespace().map(String::from).collect()
            }
            "repostodisable" => {
                service.repos_to_disable = value.split_whitespace().map(String::from).collect()
            }
            "lastrefresh" => service.last_refresh = Some(value.clone()),
            other => debug!("ignoring unknown service key '{other}'"),
        }
    }
    if service.url.is_empty() {
        return Err(Error::ParseFailed(format!(
            "service '{}' has no url",
            service.alias()
        )));
    }
    Ok(service)
}

/// File-backed registry over the known-repos and known-services dirs
#[derive(Debug, Clone)]
pub struct Registry {
    repos_dir: PathBuf,
    services_dir: PathBuf,
    plugins_dir: PathBuf,
}

impl Registry {
    pub fn new<P: Into<PathBuf>>(repos_dir: P, services_dir: P, plugins_dir: P) -> Self {
        Self {
            repos_dir: repos_dir.into(),
            services_dir: services_dir.into(),
            plugins_dir: plugins_dir.into(),
        }
    }

    fn definition_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(Error::IoFailed(format!("cannot read {}: {e}", dir.display()))),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || name.ends_with(".tmp") {
                continue;
            }
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Smallest non-colliding target for a new definition file
    fn unique_target(dir: &Path, filename: &str) -> PathBuf {
        let mut candidate = dir.join(filename);
        let mut n = 1u32;
        while candidate.exists() {
            candidate = dir.join(format!("{filename}_{n}"));
            n += 1;
        }
        candidate
    }

    fn load_repo_files(&self) -> Result<Vec<(PathBuf, Vec<RepoInfo>)>> {
        let mut out = Vec::new();
        for file in Self::definition_files(&self.repos_dir)? {
            match inifile::parse_file(&file) {
                Ok(sections) => {
                    let mut repos = Vec::new();
                    for section in &sections {
                        match section_to_repo(section) {
                            Ok(repo) => repos.push(repo),
                            Err(e) => warn!("skipping section in {}: {e}", file.display()),
                        }
                    }
                    out.push((file, repos));
                }
                Err(e) => warn!("skipping unreadable repo file {}: {e}", file.display()),
            }
        }
        Ok(out)
    }

    // -- repositories ---------------------------------------------------

    /// All known repositories, ordered by alias
    pub fn list_repos(&self) -> Result<Vec<RepoInfo>> {
        let mut seen = BTreeSet::new();
        let mut repos = Vec::new();
        for (file, parsed) in self.load_repo_files()? {
            for repo in parsed {
                if seen.insert(repo.alias().to_string()) {
                    repos.push(repo);
                } else {
                    warn!(
                        "duplicate repo alias '{}' in {}, first definition wins",
                        repo.alias(),
                        file.display()
                    );
                }
            }
        }
        repos.sort_by(|a, b| a.alias().cmp(b.alias()));
        Ok(repos)
    }

    pub fn find_repo(&self, alias: &str) -> Result<Option<RepoInfo>> {
        Ok(self
            .list_repos()?
            .into_iter()
            .find(|r| r.alias() == alias))
    }

    fn known_aliases(&self) -> Result<BTreeSet<String>> {
        let mut aliases: BTreeSet<String> = self
            .list_repos()?
            .into_iter()
            .map(|r| r.alias().to_string())
            .collect();
        for service in self.list_services()? {
            aliases.insert(service.alias().to_string());
        }
        Ok(aliases)
    }

    /// Persist a new repository in its own file
    pub fn add_repo(&self, repo: &RepoInfo) -> Result<()> {
        layout::check_alias(repo.alias())?;
        if self.known_aliases()?.contains(repo.alias()) {
            return Err(Error::AlreadyExists(repo.alias().to_string()));
        }
        let target = Self::unique_target(&self.repos_dir, &format!("{}.repo", repo.alias()));
        inifile::write_file(&target, &[repo_to_section(repo)])?;
        info!("added repository '{}' at {}", repo.alias(), target.display());
        Ok(())
    }

    /// Remove one repository section; deletes its file when it was the
    /// last section in it
    pub fn remove_repo(&self, alias: &str) -> Result<RepoInfo> {
        for (file, repos) in self.load_repo_files()? {
            if let Some(pos) = repos.iter().position(|r| r.alias() == alias) {
                let removed = repos[pos].clone();
                if repos.len() == 1 {
                    fs::remove_file(&file)?;
                    debug!("removed last section, deleted {}", file.display());
                } else {
                    let sections: Vec<Section> = repos
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != pos)
                        .map(|(_, r)| repo_to_section(r))
                        .collect();
                    inifile::write_file(&file, &sections)?;
                }
                info!("removed repository '{alias}'");
                return Ok(removed);
            }
        }
        Err(Error::NotFound(alias.to_string()))
    }

    /// Atomically replace one repository section
    pub fn modify_repo(&self, alias: &str, repo: &RepoInfo) -> Result<()> {
        if repo.alias() != alias {
            layout::check_alias(repo.alias())?;
            if self.known_aliases()?.contains(repo.alias()) {
                return Err(Error::AlreadyExists(repo.alias().to_string()));
            }
        }
        for (file, repos) in self.load_repo_files()? {
            if let Some(pos) = repos.iter().position(|r| r.alias() == alias) {
                let sections: Vec<Section> = repos
                    .iter()
                    .enumerate()
                    .map(|(i, r)| {
                        if i == pos {
                            repo_to_section(repo)
                        } else {
                            repo_to_section(r)
                        }
                    })
                    .collect();
                inifile::write_file(&file, &sections)?;
                debug!("modified repository '{alias}' in {}", file.display());
                return Ok(());
            }
        }
        Err(Error::NotFound(alias.to_string()))
    }

    /// Import a repo-definition file; every section becomes one repo
    ///
    /// The file is copied into the known-repos directory under its own
    /// name, suffixed `_1`, `_2`, … when the name is already taken.
    pub fn add_repos_from_file(&self, source: &Path) -> Result<Vec<RepoInfo>> {
        let sections = inifile::parse_file(source)?;
        let mut repos = Vec::new();
        for section in &sections {
            let repo = section_to_repo(section)?;
            layout::check_alias(repo.alias())?;
            repos.push(repo);
        }

        let known = self.known_aliases()?;
        for repo in &repos {
            if known.contains(repo.alias()) {
                return Err(Error::AlreadyExists(repo.alias().to_string()));
            }
        }

        let filename = source
            .file_name()
            .ok_or_else(|| Error::IoFailed(format!("{} has no filename", source.display())))?
            .to_string_lossy()
            .into_owned();
        fs::create_dir_all(&self.repos_dir)?;
        let target = Self::unique_target(&self.repos_dir, &filename);
        fs::copy(source, &target)
            .map_err(|e| Error::IoFailed(format!("cannot import {}: {e}", source.display())))?;

        info!(
            "imported {} repositories into {}",
            repos.len(),
            target.display()
        );
        Ok(repos)
    }

    // -- services -------------------------------------------------------

    /// Services discovered from plugin executables
    fn plugin_services(&self) -> Result<Vec<ServiceInfo>> {
        let mut services = Vec::new();
        let entries = match fs::read_dir(&self.plugins_dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(services),
            Err(e) => {
                return Err(Error::IoFailed(format!(
                    "cannot read {}: {e}",
                    self.plugins_dir.display()
                )))
            }
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let alias = entry.file_name().to_string_lossy().into_owned();
            if alias.starts_with('.') {
                continue;
            }
            let mut service =
                ServiceInfo::new(&alias, format!("file:{}", entry.path().display()));
            service.service_type = ServiceType::Plugin;
            services.push(service);
        }
        Ok(services)
    }

    fn load_service_files(&self) -> Result<Vec<(PathBuf, Vec<ServiceInfo>)>> {
        let mut out = Vec::new();
        for file in Self::definition_files(&self.services_dir)? {
            match inifile::parse_file(&file) {
                Ok(sections) => {
                    let mut services = Vec::new();
                    for section in &sections {
                        match section_to_service(section) {
                            Ok(s) => services.push(s),
                            Err(e) => warn!("skipping section in {}: {e}", file.display()),
                        }
                    }
                    out.push((file, services));
                }
                Err(e) => warn!("skipping unreadable service file {}: {e}", file.display()),
            }
        }
        Ok(out)
    }

    /// All known services (file backed plus plugins), ordered by alias
    pub fn list_services(&self) -> Result<Vec<ServiceInfo>> {
        let mut services: Vec<ServiceInfo> = self
            .load_service_files()?
            .into_iter()
            .flat_map(|(_, s)| s)
            .collect();
        services.extend(self.plugin_services()?);
        services.sort_by(|a, b| a.alias().cmp(b.alias()));
        services.dedup_by(|a, b| a.alias() == b.alias());
        Ok(services)
    }

    pub fn find_service(&self, alias: &str) -> Result<Option<ServiceInfo>> {
        Ok(self
            .list_services()?
            .into_iter()
            .find(|s| s.alias() == alias))
    }

    pub fn add_service(&self, service: &ServiceInfo) -> Result<()> {
        layout::check_alias(service.alias())?;
        if self.known_aliases()?.contains(service.alias()) {
            return Err(Error::AlreadyExists(service.alias().to_string()));
        }
        let target =
            Self::unique_target(&self.services_dir, &format!("{}.service", service.alias()));
        inifile::write_file(&target, &[service_to_section(service)])?;
        info!("added service '{}' at {}", service.alias(), target.display());
        Ok(())
    }

    pub fn remove_service(&self, alias: &str) -> Result<ServiceInfo> {
        for (file, services) in self.load_service_files()? {
            if let Some(pos) = services.iter().position(|s| s.alias() == alias) {
                let removed = services[pos].clone();
                if services.len() == 1 {
                    fs::remove_file(&file)?;
                } else {
                    let sections: Vec<Section> = services
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != pos)
                        .map(|(_, s)| service_to_section(s))
                        .collect();
                    inifile::write_file(&file, &sections)?;
                }
                info!("removed service '{alias}'");
                return Ok(removed);
            }
        }
        if self.plugin_services()?.iter().any(|s| s.alias() == alias) {
            return Err(Error::ServiceFailed {
                alias: alias.to_string(),
                reason: "plugin services are read-only".to_string(),
            });
        }
        Err(Error::NotFound(alias.to_string()))
    }

    pub fn modify_service(&self, alias: &str, service: &ServiceInfo) -> Result<()> {
        for (file, services) in self.load_service_files()? {
            if let Some(pos) = services.iter().position(|s| s.alias() == alias) {
                let sections: Vec<Section> = services
                    .iter()
                    .enumerate()
                    .map(|(i, s)| {
                        if i == pos {
                            service_to_section(service)
                        } else {
                            service_to_section(s)
                        }
                    })
                    .collect();
                inifile::write_file(&file, &sections)?;
                return Ok(());
            }
        }
        if self.plugin_services()?.iter().any(|s| s.alias() == alias) {
            return Err(Error::ServiceFailed {
                alias: alias.to_string(),
                reason: "plugin services are read-only".to_string(),
            });
        }
        Err(Error::NotFound(alias.to_string()))
    }
}
