// src/freshness.rs

//! Decide whether a repository's metadata needs a refresh
//!
//! The check is cheap: inside the delay window nothing touches the
//! network at all; outside it only the master index is re-fetched and
//! its status compared against the cookie of the built cache.

use crate::error::{Error, Result};
use crate::info::{RepoInfo, RepoType};
use crate::layout::PathLayout;
use crate::media::{FileSpec, MediaProvider};
use crate::status::{read_cookie, RepoStatus};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// Outcome of a freshness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshCheck {
    UpToDate,
    NeedsRefresh,
    /// Inside the refresh delay window; nothing was fetched
    CheckDelayed,
    /// Transport failure; the caller may fall back to the cached copy
    RemoteUnavailable,
}

/// Freshness decisions for one cache layout
pub struct FreshnessOracle<'a> {
    layout: &'a PathLayout,
    refresh_delay: Duration,
}

impl<'a> FreshnessOracle<'a> {
    pub fn new(layout: &'a PathLayout, refresh_delay: Duration) -> Self {
        Self {
            layout,
            refresh_delay,
        }
    }

    /// Seconds since the last recorded refresh attempt, if any
    fn attempt_age(&self, alias: &str) -> Result<Option<Duration>> {
        let stamp = self.layout.timestamp_file(alias)?;
        let reference = if stamp.exists() {
            stamp
        } else {
            self.layout.cookie_file(alias)?
        };
        let Ok(meta) = std::fs::metadata(&reference) else {
            return Ok(None);
        };
        let mtime = meta.modified()?;
        Ok(SystemTime::now().duration_since(mtime).ok())
    }

    fn remote_status(
        &self,
        provider: &dyn MediaProvider,
        repo: &RepoInfo,
        url: &str,
    ) -> Result<RepoStatus> {
        let handle = provider.attach(url)?;
        match repo.repo_type().master_index() {
            Some(rel) => {
                let file = provider
                    .provide(
                        &handle,
                        rel,
                        &FileSpec::new().size_cap(crate::download::MASTER_INDEX_SIZE_CAP),
                    )?
                    .ok_or_else(|| Error::TransportFailed {
                        url: format!("{url}/{rel}"),
                        reason: "master index is missing".to_string(),
                    })?;
                RepoStatus::from_file(file.path())
            }
            None if repo.repo_type() == RepoType::RpmPlainDir => {
                RepoStatus::from_dir(&crate::media::local_path(url)?)
            }
            None => Err(Error::RepoUnknownType {
                alias: repo.alias().to_string(),
                url: url.to_string(),
            }),
        }
    }

    /// Answer up-to-date / needs-refresh / check-delayed for one repo
    ///
    /// `primary_url` is the already resolved location (base plus path).
    pub fn check(
        &self,
        provider: &dyn MediaProvider,
        repo: &RepoInfo,
        primary_url: &str,
    ) -> Result<RefreshCheck> {
        if !self.refresh_delay.is_zero() {
            if let Some(age) = self.attempt_age(repo.alias())? {
                if age < self.refresh_delay {
                    debug!(
                        "refresh of '{}' attempted {}s ago, delaying the check",
                        repo.alias(),
                        age.as_secs()
                    );
                    return Ok(RefreshCheck::CheckDelayed);
                }
            }
        }

        let remote = match self.remote_status(provider, repo, primary_url) {
            Ok(status) => status,
            Err(Error::RemoteUnavailable(reason)) => {
                info!("'{}' is unreachable: {reason}", repo.alias());
                return Ok(RefreshCheck::RemoteUnavailable);
            }
            Err(Error::TransportFailed { url, reason }) => {
                info!("'{}' transport failed for {url}: {reason}", repo.alias());
                return Ok(RefreshCheck::RemoteUnavailable);
            }
            Err(e) => return Err(e),
        };

        let cookie = read_cookie(&self.layout.cookie_file(repo.alias())?);
        if !cookie.is_empty() && cookie == remote {
            debug!("'{}' is up to date", repo.alias());
            Ok(RefreshCheck::UpToDate)
        } else {
            debug!("'{}' needs a refresh", repo.alias());
            Ok(RefreshCheck::NeedsRefresh)
        }
    }
}

/// Record a refresh attempt for the delay window
pub fn touch_timestamp(layout: &PathLayout, alias: &str) -> Result<()> {
    let stamp = layout.timestamp_file(alias)?;
    if let Some(parent) = stamp.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let now = chrono::Utc::now().to_rfc3339();
    std::fs::write(&stamp, format!("{now}\n"))?;
    Ok(())
}

/// The recorded last refresh attempt, for listings
pub fn last_attempt(layout: &PathLayout, alias: &str) -> Option<String> {
    let stamp = layout.timestamp_file(alias).ok()?;
    let text = std::fs::read_to_string(stamp).ok()?;
    let line = text.lines().next()?.trim();
    chrono::DateTime::parse_from_rfc3339(line).ok()?;
    Some(line.to_string())
}

/// Convenience wrapper used by tests: does `dir` hold a master index of
/// the given type?
pub fn has_master_index(dir: &Path, repo_type: RepoType) -> bool {
    repo_type
        .master_index()
        .map(|rel| dir.join(rel).exists())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::LocalMedia;
    use crate::status::write_cookie;
    use std::fs;
    use tempfile::TempDir;

    fn yast2_repo(alias: &str, src: &Path) -> (RepoInfo, String) {
        let mut repo = RepoInfo::new(alias);
        repo.set_repo_type(RepoType::Yast2);
        let url = format!("dir:{}", src.display());
        repo.set_base_url(url.clone());
        (repo, url)
    }

    #[test]
    fn test_needs_refresh_without_cookie() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("content"), "LABEL x\n").unwrap();

        let layout = PathLayout::new(tmp.path().join("cache"));
        let oracle = FreshnessOracle::new(&layout, Duration::ZERO);
        let (repo, url) = yast2_repo("fresh", &src);

        assert_eq!(
            oracle.check(&LocalMedia, &repo, &url).unwrap(),
            RefreshCheck::NeedsRefresh
        );
    }

    #[test]
    fn test_up_to_date_with_matching_cookie() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("content"), "LABEL x\n").unwrap();

        let layout = PathLayout::new(tmp.path().join("cache"));
        let status = RepoStatus::from_file(&src.join("content")).unwrap();
        write_cookie(&layout.cookie_file("fresh").unwrap(), &status).unwrap();

        let oracle = FreshnessOracle::new(&layout, Duration::ZERO);
        let (repo, url) = yast2_repo("fresh", &src);
        assert_eq!(
            oracle.check(&LocalMedia, &repo, &url).unwrap(),
            RefreshCheck::UpToDate
        );

        // a content change flips the answer
        fs::write(src.join("content"), "LABEL y\n").unwrap();
        assert_eq!(
            oracle.check(&LocalMedia, &repo, &url).unwrap(),
            RefreshCheck::NeedsRefresh
        );
    }

    #[test]
    fn test_delay_window_short_circuits() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("content"), "LABEL x\n").unwrap();

        let layout = PathLayout::new(tmp.path().join("cache"));
        touch_timestamp(&layout, "fresh").unwrap();

        let oracle = FreshnessOracle::new(&layout, Duration::from_secs(600));
        let (repo, url) = yast2_repo("fresh", &src);
        assert_eq!(
            oracle.check(&LocalMedia, &repo, &url).unwrap(),
            RefreshCheck::CheckDelayed
        );
    }

    #[test]
    fn test_unreachable_remote_is_recoverable() {
        let tmp = TempDir::new().unwrap();
        let layout = PathLayout::new(tmp.path().join("cache"));
        let oracle = FreshnessOracle::new(&layout, Duration::ZERO);

        let gone = tmp.path().join("gone");
        let (repo, url) = yast2_repo("lost", &gone);
        assert_eq!(
            oracle.check(&LocalMedia, &repo, &url).unwrap(),
            RefreshCheck::RemoteUnavailable
        );
    }

    #[test]
    fn test_timestamp_round_trip() {
        let tmp = TempDir::new().unwrap();
        let layout = PathLayout::new(tmp.path());
        assert!(last_attempt(&layout, "a").is_none());
        touch_timestamp(&layout, "a").unwrap();
        assert!(last_attempt(&layout, "a").is_some());
    }
}
