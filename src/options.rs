// src/options.rs

//! Centralized directory layout and tunables for a RepoManager instance

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where a [`crate::RepoManager`] keeps its persistent state.
///
/// All paths are absolute once constructed; callers pick either the
/// system layout under a root directory or a self-contained test layout.
#[derive(Debug, Clone)]
pub struct RepoManagerOptions {
    /// Directory holding `*.repo` definition files
    pub known_repos_dir: PathBuf,
    /// Directory holding `*.service` definition files
    pub known_services_dir: PathBuf,
    /// Directory scanned for service plugin executables
    pub service_plugins_dir: PathBuf,
    /// Root of the raw/solv/pubkey caches
    pub cache_root: PathBuf,
    /// Minimum interval between two remote freshness probes of one repo
    pub refresh_delay: Duration,
}

impl RepoManagerOptions {
    /// Default refresh delay, matching the usual distro configuration
    pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_secs(10 * 60);

    /// System layout below an installation root (normally `/`)
    pub fn for_root<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            known_repos_dir: root.join("etc/quarry/repos.d"),
            known_services_dir: root.join("etc/quarry/services.d"),
            service_plugins_dir: root.join("usr/lib/quarry/services"),
            cache_root: root.join("var/cache/quarry"),
            refresh_delay: Self::DEFAULT_REFRESH_DELAY,
        }
    }

    /// Self-contained layout below one directory, used by the test suites
    pub fn test_setup<P: AsRef<Path>>(base: P) -> Self {
        let base = base.as_ref();
        Self {
            known_repos_dir: base.join("repos.d"),
            known_services_dir: base.join("services.d"),
            service_plugins_dir: base.join("services.plugins"),
            cache_root: base.join("cache"),
            refresh_delay: Self::DEFAULT_REFRESH_DELAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_root_layout() {
        let opts = RepoManagerOptions::for_root("/");
        assert_eq!(opts.known_repos_dir, PathBuf::from("/etc/quarry/repos.d"));
        assert_eq!(opts.cache_root, PathBuf::from("/var/cache/quarry"));
    }

    #[test]
    fn test_test_setup_is_self_contained() {
        let opts = RepoManagerOptions::test_setup("/tmp/x");
        for p in [
            &opts.known_repos_dir,
            &opts.known_services_dir,
            &opts.service_plugins_dir,
            &opts.cache_root,
        ] {
            assert!(p.starts_with("/tmp/x"));
        }
    }
}
