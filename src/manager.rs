// src/manager.rs

//! The repository manager: top level facade over registry, prober,
//! downloader, freshness oracle and cache builder
//!
//! Every mutating operation runs under the process-wide metadata lock;
//! readers take it shared. Operations accept [`RepoInfo`] values rather
//! than aliases so callers can drive repositories that are not (yet)
//! persisted, the registry being updated where it matters.

use crate::cache;
use crate::dispose::CancelToken;
use crate::download::{self, DownloadContext, PluginVerifier};
use crate::error::{Error, Result};
use crate::freshness::{self, FreshnessOracle, RefreshCheck};
use crate::info::{RepoInfo, RepoType, ServiceInfo};
use crate::keyring::{KeyRing, SequoiaKeyRing};
use crate::layout::{self, PathLayout};
use crate::lock::LockFile;
use crate::media::{local_path, DefaultMedia, MediaProvider};
use crate::options::RepoManagerOptions;
use crate::pool::Pool;
use crate::probe;
use crate::registry::Registry;
use crate::service::{self, ServiceRefreshReport};
use crate::status::RepoStatus;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether an operation may skip work that looks current
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    #[default]
    IfNeeded,
    Forced,
}

/// Top level facade over the metadata lifecycle
pub struct RepoManager {
    options: RepoManagerOptions,
    layout: PathLayout,
    registry: Registry,
    provider: Box<dyn MediaProvider>,
    keyring: Arc<dyn KeyRing>,
    plugin_verifier: Option<Box<dyn PluginVerifier>>,
}

impl RepoManager {
    /// Manager with the default media and keyring collaborators
    pub fn new(options: RepoManagerOptions) -> Result<Self> {
        let keyring = SequoiaKeyRing::new(options.cache_root.join("keyring"))?;
        Self::with_collaborators(options, Box::new(DefaultMedia::new()?), Arc::new(keyring))
    }

    /// Manager with injected collaborators (tests use a stub keyring)
    pub fn with_collaborators(
        options: RepoManagerOptions,
        provider: Box<dyn MediaProvider>,
        keyring: Arc<dyn KeyRing>,
    ) -> Result<Self> {
        fs::create_dir_all(&options.known_repos_dir)?;
        fs::create_dir_all(&options.known_services_dir)?;
        fs::create_dir_all(&options.cache_root)?;

        let layout = PathLayout::new(&options.cache_root);
        let registry = Registry::new(
            options.known_repos_dir.clone(),
            options.known_services_dir.clone(),
            options.service_plugins_dir.clone(),
        );
        Ok(Self {
            options,
            layout,
            registry,
            provider,
            keyring,
            plugin_verifier: None,
        })
    }

    pub fn set_plugin_verifier(&mut self, verifier: Box<dyn PluginVerifier>) {
        self.plugin_verifier = Some(verifier);
    }

    pub fn options(&self) -> &RepoManagerOptions {
        &self.options
    }

    pub fn layout(&self) -> &PathLayout {
        &self.layout
    }

    fn exclusive_lock(&self) -> Result<LockFile> {
        LockFile::exclusive(self.layout.metadata_lock_file())
    }

    fn shared_lock(&self) -> Result<LockFile> {
        LockFile::shared(self.layout.metadata_lock_file())
    }

    // -- registry surface ----------------------------------------------

    pub fn list_repos(&self) -> Result<Vec<RepoInfo>> {
        let _lock = self.shared_lock()?;
        self.registry.list_repos()
    }

    pub fn find_repo(&self, alias: &str) -> Result<Option<RepoInfo>> {
        let _lock = self.shared_lock()?;
        self.registry.find_repo(alias)
    }

    pub fn repo_count(&self) -> Result<usize> {
        Ok(self.list_repos()?.len())
    }

    pub fn add_repository(&self, repo: &RepoInfo) -> Result<()> {
        let _lock = self.exclusive_lock()?;
        self.registry.add_repo(repo)
    }

    /// Remove a repository together with its raw and solv caches
    pub fn remove_repository(&self, alias: &str) -> Result<()> {
        let _lock = self.exclusive_lock()?;
        self.registry.remove_repo(alias)?;
        cache::clean_cache(&self.layout, alias)?;
        cache::clean_metadata(&self.layout, alias)?;
        Ok(())
    }

    pub fn modify_repository(&self, alias: &str, repo: &RepoInfo) -> Result<()> {
        let _lock = self.exclusive_lock()?;
        self.registry.modify_repo(alias, repo)
    }

    /// Import every section of a repo-definition file
    pub fn add_repositories_from_file(&self, source: &Path) -> Result<Vec<RepoInfo>> {
        let _lock = self.exclusive_lock()?;
        self.registry.add_repos_from_file(source)
    }

    pub fn list_services(&self) -> Result<Vec<ServiceInfo>> {
        let _lock = self.shared_lock()?;
        self.registry.list_services()
    }

    pub fn find_service(&self, alias: &str) -> Result<Option<ServiceInfo>> {
        let _lock = self.shared_lock()?;
        self.registry.find_service(alias)
    }

    pub fn service_count(&self) -> Result<usize> {
        Ok(self.list_services()?.len())
    }

    pub fn add_service(&self, service: &ServiceInfo) -> Result<()> {
        let _lock = self.exclusive_lock()?;
        self.registry.add_service(service)
    }

    pub fn remove_service(&self, alias: &str) -> Result<()> {
        let _lock = self.exclusive_lock()?;
        // repos owned by the removed service lose their owner
        for repo in self.registry.list_repos()? {
            if repo.service_owner.as_deref() == Some(alias) {
                let mut orphaned = repo.clone();
                orphaned.service_owner = None;
                self.registry.modify_repo(repo.alias(), &orphaned)?;
            }
        }
        self.registry.remove_service(alias)?;
        Ok(())
    }

    pub fn modify_service(&self, alias: &str, service: &ServiceInfo) -> Result<()> {
        let _lock = self.exclusive_lock()?;
        self.registry.modify_service(alias, service)
    }

    /// Repositories currently owned by a service
    pub fn get_repositories_in_service(&self, alias: &str) -> Result<Vec<RepoInfo>> {
        let _lock = self.shared_lock()?;
        Ok(self
            .registry
            .list_repos()?
            .into_iter()
            .filter(|r| r.service_owner.as_deref() == Some(alias))
            .collect())
    }

    // -- metadata lifecycle --------------------------------------------

    /// Where cache builds read this repository's metadata from
    fn source_dir_for(&self, repo: &RepoInfo) -> Result<PathBuf> {
        match repo.repo_type() {
            RepoType::RpmPlainDir => local_path(&repo.location()?),
            _ => self.layout.raw_dir(repo.alias()),
        }
    }

    fn current_status(&self, repo: &RepoInfo) -> RepoStatus {
        let Ok(source) = self.source_dir_for(repo) else {
            return RepoStatus::empty();
        };
        cache::source_status(repo.repo_type(), &source).unwrap_or_else(|_| RepoStatus::empty())
    }

    /// Is there a solver cache matching the current raw metadata?
    pub fn is_cached(&self, repo: &RepoInfo) -> Result<bool> {
        let _lock = self.shared_lock()?;
        Ok(cache::is_cached(
            &self.layout,
            repo.alias(),
            &self.current_status(repo),
        ))
    }

    /// Cheap freshness probe against the remote side
    pub fn check_if_to_refresh_metadata(
        &self,
        repo: &RepoInfo,
        url: &str,
    ) -> Result<RefreshCheck> {
        let _lock = self.shared_lock()?;
        let mut repo = repo.clone();
        if repo.repo_type() == RepoType::Unknown {
            repo.set_repo_type(probe::probe(self.provider.as_ref(), url)?);
        }
        let oracle = FreshnessOracle::new(&self.layout, self.options.refresh_delay);
        oracle.check(self.provider.as_ref(), &repo, url)
    }

    /// Probe, download, verify and mirror one repository's metadata
    pub fn refresh_metadata(&self, repo: &mut RepoInfo, policy: RefreshPolicy) -> Result<()> {
        let _lock = self.exclusive_lock()?;
        self.refresh_metadata_impl(repo, policy, &CancelToken::new())
    }

    fn ensure_typed(&self, repo: &mut RepoInfo, url: &str) -> Result<()> {
        if repo.repo_type() != RepoType::Unknown {
            return Ok(());
        }
        let probed = probe::probe(self.provider.as_ref(), url)?;
        if probed == RepoType::Unknown {
            return Err(Error::RepoUnknownType {
                alias: repo.alias().to_string(),
                url: url.to_string(),
            });
        }
        repo.set_repo_type(probed);
        // remember the probed type so later runs skip probing
        if let Some(mut stored) = self.registry.find_repo(repo.alias())? {
            stored.set_repo_type(probed);
            self.registry.modify_repo(repo.alias(), &stored)?;
        }
        Ok(())
    }

    fn refresh_metadata_impl(
        &self,
        repo: &mut RepoInfo,
        policy: RefreshPolicy,
        cancel: &CancelToken,
    ) -> Result<()> {
        layout::check_alias(repo.alias())?;
        let url = repo.location()?;
        self.ensure_typed(repo, &url)?;

        if repo.repo_type() == RepoType::RpmPlainDir {
            // nothing to mirror, the directory itself is the metadata
            let dir = local_path(&url)?;
            freshness::touch_timestamp(&self.layout, repo.alias())?;
            repo.set_metadata_path(dir);
            return Ok(());
        }

        let raw_dir = self.layout.raw_dir(repo.alias())?;
        if policy == RefreshPolicy::IfNeeded {
            let oracle = FreshnessOracle::new(&self.layout, self.options.refresh_delay);
            match oracle.check(self.provider.as_ref(), repo, &url)? {
                RefreshCheck::UpToDate | RefreshCheck::CheckDelayed
                    if freshness::has_master_index(&raw_dir, repo.repo_type()) =>
                {
                    debug!("metadata of '{}' is current, skipping refresh", repo.alias());
                    repo.set_metadata_path(raw_dir);
                    return Ok(());
                }
                RefreshCheck::RemoteUnavailable => {
                    if freshness::has_master_index(&raw_dir, repo.repo_type()) {
                        warn!(
                            "'{}' is unreachable, falling back to the cached metadata",
                            repo.alias()
                        );
                        repo.set_metadata_path(raw_dir);
                        return Ok(());
                    }
                    return Err(Error::RemoteUnavailable(format!(
                        "'{}' at {url} and no cached metadata",
                        repo.alias()
                    )));
                }
                _ => {}
            }
        }

        let master_rel = repo
            .repo_type()
            .master_index()
            .ok_or_else(|| Error::RepoUnknownType {
                alias: repo.alias().to_string(),
                url: url.clone(),
            })?;

        // download into a temp dir beside the raw mirror, swap on success
        let raw_root = self.layout.raw_root();
        fs::create_dir_all(&raw_root)?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&raw_root)
            .map_err(|e| Error::IoFailed(format!("cannot create staging dir: {e}")))?;

        let handle = self.provider.attach(&url)?;
        {
            let mut ctx =
                DownloadContext::new(repo, staging.path().to_path_buf(), self.keyring.as_ref());
            ctx.key_cache_dir = self.layout.key_cache_dir();
            ctx.plugin_verifier = self.plugin_verifier.as_deref();
            ctx.cancel = cancel.clone();

            download::download_master_index(self.provider.as_ref(), &handle, &mut ctx, master_rel)?;
            download::download_declared_files(self.provider.as_ref(), &handle, &mut ctx)?;
            ctx.disarm_all();
        }

        cancel.check()?;
        let staged = staging.into_path();
        if raw_dir.exists() {
            fs::remove_dir_all(&raw_dir)?;
        }
        fs::rename(&staged, &raw_dir)
            .map_err(|e| Error::IoFailed(format!("cannot activate {}: {e}", raw_dir.display())))?;

        repo.set_metadata_path(&raw_dir);
        freshness::touch_timestamp(&self.layout, repo.alias())?;
        info!("refreshed metadata of '{}'", repo.alias());
        Ok(())
    }

    /// Build (or rebuild) the solver cache of one repository
    pub fn build_cache(&self, repo: &mut RepoInfo, policy: RefreshPolicy) -> Result<()> {
        let _lock = self.exclusive_lock()?;
        self.build_cache_impl(repo, policy, &CancelToken::new())
    }

    fn build_cache_impl(
        &self,
        repo: &mut RepoInfo,
        policy: RefreshPolicy,
        cancel: &CancelToken,
    ) -> Result<()> {
        let url = repo.location()?;
        self.ensure_typed(repo, &url)?;

        // make sure there is raw metadata to parse
        let source = self.source_dir_for(repo)?;
        let have_raw = match repo.repo_type() {
            RepoType::RpmPlainDir => source.is_dir(),
            _ => freshness::has_master_index(&source, repo.repo_type()),
        };
        if !have_raw {
            self.refresh_metadata_impl(repo, RefreshPolicy::IfNeeded, cancel)?;
        }

        let source = self.source_dir_for(repo)?;
        let status = cache::source_status(repo.repo_type(), &source)?;
        if policy == RefreshPolicy::IfNeeded
            && cache::is_cached(&self.layout, repo.alias(), &status)
        {
            debug!("solver cache of '{}' is current, skipping build", repo.alias());
            return Ok(());
        }

        cache::build_cache(&self.layout, repo, &source, &status, cancel)
    }

    /// Drop the solver cache
    pub fn clean_cache(&self, repo: &RepoInfo) -> Result<()> {
        let _lock = self.exclusive_lock()?;
        cache::clean_cache(&self.layout, repo.alias())
    }

    /// Drop the raw metadata mirror
    pub fn clean_metadata(&self, repo: &RepoInfo) -> Result<()> {
        let _lock = self.exclusive_lock()?;
        cache::clean_metadata(&self.layout, repo.alias())
    }

    /// Load a previously built cache into the pool
    ///
    /// Fails with [`Error::RepoNotCached`] unless the cache exists and
    /// anchors the current raw metadata.
    pub fn load_from_cache(&self, repo: &mut RepoInfo, pool: &mut Pool) -> Result<()> {
        let _lock = self.shared_lock()?;
        self.load_from_cache_impl(repo, pool)
    }

    fn load_from_cache_impl(&self, repo: &mut RepoInfo, pool: &mut Pool) -> Result<()> {
        let status = self.current_status(repo);
        if !cache::is_cached(&self.layout, repo.alias(), &status) {
            return Err(Error::RepoNotCached(repo.alias().to_string()));
        }
        if let Ok(source) = self.source_dir_for(repo) {
            repo.set_metadata_path(source);
        }
        pool.load_repo(repo, &self.layout.solv_file(repo.alias())?)
    }

    /// Refresh, build and load in one go
    pub fn load_repo(&self, repo: &mut RepoInfo, pool: &mut Pool) -> Result<()> {
        let _lock = self.exclusive_lock()?;
        let cancel = CancelToken::new();
        self.refresh_metadata_impl(repo, RefreshPolicy::IfNeeded, &cancel)?;
        self.build_cache_impl(repo, RefreshPolicy::IfNeeded, &cancel)?;
        self.load_from_cache_impl(repo, pool)
    }

    // -- services -------------------------------------------------------

    /// Expand every enabled service and reconcile the registry
    ///
    /// A failure in one service or repo is recorded in the report and
    /// does not abort the loop.
    pub fn refresh_services(&self) -> Result<ServiceRefreshReport> {
        let _lock = self.exclusive_lock()?;
        let mut report = ServiceRefreshReport::default();

        for svc in self.registry.list_services()? {
            if !svc.enabled {
                debug!("skipping disabled service '{}'", svc.alias());
                continue;
            }
            match service::expand(self.provider.as_ref(), &svc) {
                Ok(emitted) => match service::reconcile(&self.registry, &svc, emitted, &mut report)
                {
                    Ok(updated) => {
                        if updated != svc {
                            // plugin-discovered services have no file to update
                            match self.registry.modify_service(svc.alias(), &updated) {
                                Ok(()) | Err(Error::ServiceFailed { .. }) => {}
                                Err(e) => report.record(svc.alias().to_string(), e),
                            }
                        }
                    }
                    Err(e) => report.record(svc.alias().to_string(), e),
                },
                Err(e) => report.record(svc.alias().to_string(), e),
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyring::StubKeyRing;
    use crate::media::LocalMedia;
    use tempfile::TempDir;

    fn test_manager(tmp: &TempDir) -> RepoManager {
        let options = RepoManagerOptions::test_setup(tmp.path());
        RepoManager::with_collaborators(
            options,
            Box::new(LocalMedia),
            Arc::new(StubKeyRing::accepting()),
        )
        .unwrap()
    }

    #[test]
    fn test_add_remove_restores_prestate() {
        let tmp = TempDir::new().unwrap();
        let manager = test_manager(&tmp);

        let before: Vec<String> = manager
            .list_repos()
            .unwrap()
            .iter()
            .map(|r| r.alias().to_string())
            .collect();

        let mut repo = RepoInfo::new("scratch");
        repo.set_base_url("http://example.com/scratch");
        manager.add_repository(&repo).unwrap();
        assert_eq!(manager.repo_count().unwrap(), before.len() + 1);

        manager.remove_repository("scratch").unwrap();
        let after: Vec<String> = manager
            .list_repos()
            .unwrap()
            .iter()
            .map(|r| r.alias().to_string())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let tmp = TempDir::new().unwrap();
        let manager = test_manager(&tmp);

        let mut repo = RepoInfo::new("office");
        repo.set_base_url("http://example.com/office");
        manager.add_repository(&repo).unwrap();
        assert!(matches!(
            manager.add_repository(&repo),
            Err(Error::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_load_from_cache_without_build_fails() {
        let tmp = TempDir::new().unwrap();
        let manager = test_manager(&tmp);

        let src = tmp.path().join("repo");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("content"), "LABEL x\n").unwrap();

        let mut repo = RepoInfo::new("cold");
        repo.set_repo_type(RepoType::Yast2);
        repo.set_base_url(format!("dir:{}", src.display()));

        let mut pool = Pool::new();
        assert!(matches!(
            manager.load_from_cache(&mut repo, &mut pool),
            Err(Error::RepoNotCached(_))
        ));
    }

    #[test]
    fn test_probe_result_is_persisted() {
        let tmp = TempDir::new().unwrap();
        let manager = test_manager(&tmp);

        let src = tmp.path().join("repo");
        let descr = src.join("suse/setup/descr");
        std::fs::create_dir_all(&descr).unwrap();
        std::fs::write(src.join("content"), "DESCRDIR suse/setup/descr\n").unwrap();
        std::fs::write(descr.join("packages"), "=Pkg: a 1 1 noarch\n").unwrap();

        let mut repo = RepoInfo::new("probed");
        repo.set_base_url(format!("dir:{}", src.display()));
        manager.add_repository(&repo).unwrap();

        manager
            .refresh_metadata(&mut repo, RefreshPolicy::Forced)
            .unwrap();
        assert_eq!(repo.repo_type(), RepoType::Yast2);

        let stored = manager.find_repo("probed").unwrap().unwrap();
        assert_eq!(stored.repo_type(), RepoType::Yast2);
    }

    #[test]
    fn test_unknown_repo_probe_failure() {
        let tmp = TempDir::new().unwrap();
        let manager = test_manager(&tmp);

        let src = tmp.path().join("empty");
        std::fs::create_dir_all(&src).unwrap();

        let mut repo = RepoInfo::new("nothing");
        repo.set_base_url(format!("dir:{}", src.display()));
        let err = manager
            .refresh_metadata(&mut repo, RefreshPolicy::Forced)
            .unwrap_err();
        assert!(matches!(err, Error::RepoUnknownType { .. }));
        assert_eq!(err.exit_code(), 3);
    }
}
