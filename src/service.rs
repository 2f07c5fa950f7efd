// src/service.rs

//! Service expansion: turning services into concrete repository sets
//!
//! A plugin service executes a local program and parses its stdout as
//! repo definitions; a remote-index service fetches `repoindex.xml`.
//! The emitted set is then reconciled against the repositories the
//! service owns: new ones are added, vanished ones removed (unless
//! pinned by `keep_inactive`), surviving ones updated while user
//! overrides are preserved.

use crate::error::{Error, Result};
use crate::info::{RepoInfo, ServiceInfo, ServiceType};
use crate::media::{local_path, FileSpec, MediaProvider};
use crate::registry::{inifile, section_to_repo, Registry};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::process::Command;
use tracing::{debug, info, warn};

/// Per-repo failures collected during one `refresh_services` run
#[derive(Debug, Default)]
pub struct ServiceRefreshReport {
    pub errors: Vec<(String, Error)>,
}

impl ServiceRefreshReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn record<S: Into<String>>(&mut self, subject: S, error: Error) {
        let subject = subject.into();
        warn!("service refresh: '{subject}' failed: {error}");
        self.errors.push((subject, error));
    }
}

/// Run a plugin executable and parse its stdout as repo definitions
fn expand_plugin(service: &ServiceInfo) -> Result<Vec<RepoInfo>> {
    let program = local_path(&service.url)?;
    debug!("running service plugin {}", program.display());

    let output = Command::new(&program).output().map_err(|e| Error::ServiceFailed {
        alias: service.alias().to_string(),
        reason: format!("cannot execute {}: {e}", program.display()),
    })?;
    if !output.status.success() {
        return Err(Error::ServiceFailed {
            alias: service.alias().to_string(),
            reason: format!("plugin exited with {}", output.status),
        });
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let sections = inifile::parse_str(&text, service.alias())?;
    sections.iter().map(section_to_repo).collect()
}

/// Fetch and parse the repoindex.xml of a remote-index service
fn expand_remote_index(provider: &dyn MediaProvider, service: &ServiceInfo) -> Result<Vec<RepoInfo>> {
    let handle = provider.attach(&service.url)?;
    let file = provider
        .provide(&handle, "repoindex.xml", &FileSpec::new())?
        .ok_or_else(|| Error::ServiceFailed {
            alias: service.alias().to_string(),
            reason: "service has no repoindex.xml".to_string(),
        })?;

    let text = std::fs::read_to_string(file.path())
        .map_err(|e| Error::IoFailed(format!("cannot read repoindex: {e}")))?;
    parse_repoindex(&text, service.alias())
}

fn attr_value(e: &quick_xml::events::BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == name)
        .map(|a| String::from_utf8_lossy(a.value.as_ref()).into_owned())
}

/// Parse a `<repoindex>` document into repo records
pub fn parse_repoindex(text: &str, origin: &str) -> Result<Vec<RepoInfo>> {
    let mut reader = Reader::from_reader(text.as_bytes());
    reader.trim_text(true);

    let mut repos = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e) | Event::Empty(e)) if e.name().as_ref() == b"repo" => {
                let Some(alias) = attr_value(&e, b"alias") else {
                    warn!("{origin}: repoindex entry without alias, skipping");
                    continue;
                };
                let Some(url) = attr_value(&e, b"url") else {
                    warn!("{origin}: repoindex entry '{alias}' without url, skipping");
                    continue;
                };
                let mut repo = RepoInfo::new(alias);
                repo.set_base_url(url);
                if let Some(name) = attr_value(&e, b"name") {
                    repo.name = name;
                }
                if let Some(enabled) = attr_value(&e, b"enabled") {
                    repo.enabled = matches!(enabled.as_str(), "1" | "true" | "yes");
                }
                if let Some(autorefresh) = attr_value(&e, b"autorefresh") {
                    repo.autorefresh = matches!(autorefresh.as_str(), "1" | "true" | "yes");
                }
                if let Some(path) = attr_value(&e, b"path") {
                    repo.path = path;
                }
                repos.push(repo);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseFailed(format!(
                    "{origin}: failed to parse repoindex: {e}"
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(repos)
}

/// Invoke a service and return the repositories it emits
pub fn expand(provider: &dyn MediaProvider, service: &ServiceInfo) -> Result<Vec<RepoInfo>> {
    let mut emitted = match service.service_type {
        ServiceType::Plugin => expand_plugin(service)?,
        ServiceType::RemoteIndex => expand_remote_index(provider, service)?,
    };
    for repo in &mut emitted {
        repo.service_owner = Some(service.alias().to_string());
    }
    info!(
        "service '{}' emitted {} repositories",
        service.alias(),
        emitted.len()
    );
    Ok(emitted)
}

/// Reconcile one service's emitted set against the registry
///
/// Returns the updated service record (one-shot enable/disable sets
/// consumed); individual repo failures go into the report instead of
/// aborting the whole run.
pub fn reconcile(
    registry: &Registry,
    service: &ServiceInfo,
    emitted: Vec<RepoInfo>,
    report: &mut ServiceRefreshReport,
) -> Result<ServiceInfo> {
    let owned: BTreeMap<String, RepoInfo> = registry
        .list_repos()?
        .into_iter()
        .filter(|r| r.service_owner.as_deref() == Some(service.alias()))
        .map(|r| (r.alias().to_string(), r))
        .collect();
    let emitted: BTreeMap<String, RepoInfo> = emitted
        .into_iter()
        .map(|r| (r.alias().to_string(), r))
        .collect();

    // vanished repos go away unless pinned
    for (alias, repo) in &owned {
        if emitted.contains_key(alias) {
            continue;
        }
        if repo.keep_inactive {
            debug!("keeping inactive service repo '{alias}'");
            continue;
        }
        if let Err(e) = registry.remove_repo(alias) {
            report.record(alias.clone(), e);
        }
    }

    for (alias, mut repo) in emitted {
        // one-shot enable/disable commands override the emitted flag
        if service.repos_to_enable.contains(&alias) {
            repo.enabled = true;
        }
        if service.repos_to_disable.contains(&alias) {
            repo.enabled = false;
        }

        match owned.get(&alias) {
            None => {
                if let Err(e) = registry.add_repo(&repo) {
                    report.record(alias, e);
                }
            }
            Some(prior) => {
                // user-set state survives the update
                repo.keep_inactive = prior.keep_inactive;
                if !service.repos_to_enable.contains(&alias)
                    && !service.repos_to_disable.contains(&alias)
                {
                    repo.enabled = prior.enabled;
                }
                if let Err(e) = registry.modify_repo(&alias, &repo) {
                    report.record(alias, e);
                }
            }
        }
    }

    // consume the one-shot command sets
    let mut updated = service.clone();
    updated.repos_to_enable.clear();
    updated.repos_to_disable.clear();
    updated.last_refresh = Some(chrono::Utc::now().to_rfc3339());
    Ok(updated)
}
