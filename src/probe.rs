// src/probe.rs

//! Repository type probing
//!
//! Given a base location, decide the metadata format by looking for the
//! well-known anchor files, cheapest first. Repos with an already typed
//! [`crate::RepoInfo`] skip probing entirely.

use crate::error::Result;
use crate::info::RepoType;
use crate::media::{FileSpec, MediaProvider};
use tracing::{debug, info};

/// Probe a location for its repository type
///
/// Probe order: `repodata/repomd.xml` (rpm-md), `content` (yast2), any
/// `*.rpm` in a listable directory (plaindir). Everything else is
/// [`RepoType::Unknown`]; turning that into an error is the caller's
/// business.
pub fn probe(provider: &dyn MediaProvider, url: &str) -> Result<RepoType> {
    let handle = provider.attach(url)?;
    let spec = FileSpec::new().optional(true);

    if provider
        .provide(&handle, "repodata/repomd.xml", &spec)?
        .is_some()
    {
        info!("probed {url}: rpm-md");
        return Ok(RepoType::Rpmmd);
    }

    if provider.provide(&handle, "content", &spec)?.is_some() {
        info!("probed {url}: yast2");
        return Ok(RepoType::Yast2);
    }

    // a directory with packages but no index
    match provider.dir_entries(&handle, "") {
        Ok(entries) => {
            if entries.iter().any(|name| name.ends_with(".rpm")) {
                info!("probed {url}: plaindir");
                return Ok(RepoType::RpmPlainDir);
            }
        }
        Err(e) => debug!("cannot list {url}: {e}"),
    }

    info!("probed {url}: unknown");
    Ok(RepoType::Unknown)
}
