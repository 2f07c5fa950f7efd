// src/download.rs

//! Master index download and verification
//!
//! For a typed repository this fetches the detached signature and inline
//! key (both optional), then the master index, runs plugin and signature
//! verification, resolves keyhints into buddy keys, and finally places
//! everything in the destination directory.
//!
//! The logic exists twice, once blocking and once async, over the two
//! provider traits. Both drivers share every non-fetching helper and are
//! pinned together by a shared test vector in the integration suite.

use crate::dispose::{CancelToken, ManagedFile};
use crate::error::{Error, Result};
use crate::info::{RepoInfo, RepoType};
use crate::keyring::{KeyRing, PublicKey, PublicKeyData, Verdict, VerifyContext};
use crate::media::{FileSpec, MediaHandle, MediaProvider};
use crate::parser::{repomd, susetags};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Size cap for master index, signature and key fetches
pub const MASTER_INDEX_SIZE_CAP: u64 = 20 * 1024 * 1024;

/// External verification hook run before the signature check
pub trait PluginVerifier: Send + Sync {
    fn verify(
        &self,
        signature: Option<&Path>,
        key: Option<&Path>,
        repo: &RepoInfo,
        master_index: &Path,
    ) -> Result<()>;
}

/// Shared state of one download, passed by reference through all steps
pub struct DownloadContext<'a> {
    pub repo: &'a mut RepoInfo,
    /// Where the verified metadata ends up
    pub dest_dir: PathBuf,
    pub keyring: &'a dyn KeyRing,
    /// Persistent key cache consulted during keyhint resolution
    pub key_cache_dir: PathBuf,
    pub plugin_verifier: Option<&'a dyn PluginVerifier>,
    pub cancel: CancelToken,
    /// Files placed below `dest_dir`; armed until the caller persists
    pub files: Vec<ManagedFile>,
}

impl<'a> DownloadContext<'a> {
    pub fn new(repo: &'a mut RepoInfo, dest_dir: PathBuf, keyring: &'a dyn KeyRing) -> Self {
        Self {
            repo,
            dest_dir,
            keyring,
            key_cache_dir: PathBuf::new(),
            plugin_verifier: None,
            cancel: CancelToken::new(),
            files: Vec::new(),
        }
    }

    /// Persist everything collected so far
    pub fn disarm_all(&mut self) {
        for file in &mut self.files {
            file.disarm();
        }
    }
}

fn optional_spec() -> FileSpec {
    FileSpec::new().optional(true).size_cap(MASTER_INDEX_SIZE_CAP)
}

fn master_spec() -> FileSpec {
    FileSpec::new().size_cap(MASTER_INDEX_SIZE_CAP)
}

fn run_plugin_verification(
    ctx: &DownloadContext<'_>,
    sig_local: Option<&Path>,
    key_local: Option<&Path>,
    master_index: &Path,
) -> Result<()> {
    let Some(plugin) = ctx.plugin_verifier else {
        return Ok(());
    };
    plugin
        .verify(sig_local, key_local, ctx.repo, master_index)
        .map_err(|e| Error::PluginVerifyFailed {
            alias: ctx.repo.alias().to_string(),
            reason: e.to_string(),
        })
}

/// Import the inline key into the general keyring; failure only warns
fn import_inline_key(ctx: &DownloadContext<'_>, key_local: Option<&Path>) {
    let Some(key_path) = key_local else { return };
    match PublicKey::from_file(key_path) {
        Ok(key) => {
            if let Err(e) = ctx.keyring.import_key(&key, false) {
                warn!("cannot import inline key {}: {e}", key_path.display());
            }
        }
        Err(e) => warn!("unparsable inline key {}: {e}", key_path.display()),
    }
}

/// Apply the safety filter and record the verdict on the repo
///
/// Weak keys never make it into the verification context; an unverified
/// signature aborts only when the check is mandatory.
fn keep_safe_buddies(buddies: Vec<PublicKeyData>) -> Vec<PublicKeyData> {
    buddies
        .into_iter()
        .filter(|data| {
            if data.is_safe() {
                true
            } else {
                warn!(
                    "keyhint {} is not strong enough for auto import, just caching it",
                    data.id
                );
                false
            }
        })
        .collect()
}

fn record_verdict(ctx: &mut DownloadContext<'_>, verdict: Option<Verdict>) -> Result<()> {
    ctx.repo.valid_repo_signature = verdict.and_then(|v| v.as_tribool());
    if ctx.repo.repo_gpg_check_is_mandatory() && verdict.map_or(true, |v| !v.is_valid()) {
        return Err(Error::SignatureCheckFailed {
            alias: ctx.repo.alias().to_string(),
            reason: match verdict {
                Some(Verdict::Invalid) => "signature did not verify".to_string(),
                _ => "signature could not be validated".to_string(),
            },
        });
    }
    Ok(())
}

/// Keyhint steps that never touch the network: trusted keyring, general
/// keyring, persistent key cache
fn resolve_keyhint_local(
    ctx: &DownloadContext<'_>,
    file: &str,
    keyid: &str,
) -> Result<Option<PublicKeyData>> {
    if let Some(data) = ctx.keyring.trusted_public_key_data(keyid) {
        debug!("keyhint {keyid} ({file}) is already trusted");
        return Ok(Some(data));
    }
    if let Some(data) = ctx.keyring.public_key_data(keyid) {
        debug!("keyhint {keyid} ({file}) is already known");
        return Ok(Some(data));
    }

    let cache_file = ctx.key_cache_dir.join(file);
    if let Some(key) = PublicKey::no_throw(&cache_file) {
        if key.file_provides_key(keyid) {
            debug!("keyhint {keyid} resolved from key cache");
            ctx.keyring.import_key(&key, false)?;
            return Ok(ctx.keyring.public_key_data(keyid).or_else(|| Some(key.data())));
        }
    }
    Ok(None)
}

/// Keyhint step after a successful fetch: validate, cache, import
fn ingest_fetched_keyhint(
    ctx: &mut DownloadContext<'_>,
    copied: ManagedFile,
    mut cached: ManagedFile,
    file: &str,
    keyid: &str,
) -> Result<Option<PublicKeyData>> {
    let Some(key) = PublicKey::no_throw(copied.path()) else {
        warn!("keyhint {file} is not a key file, skipping it");
        return Ok(None);
    };
    if !key.file_provides_key(keyid) {
        warn!("keyhint {file} does not contain a key with id {keyid}, skipping it");
        return Ok(None);
    }

    // keep it in the persistent cache
    cached.disarm();
    ctx.files.push(copied);
    ctx.keyring.import_key(&key, false)?;
    Ok(ctx.keyring.public_key_data(keyid).or_else(|| Some(key.data())))
}

fn is_repomd(master_rel: &str) -> bool {
    master_rel.rsplit('/').next() == Some("repomd.xml")
}

// ---------------------------------------------------------------------
// blocking driver
// ---------------------------------------------------------------------

fn fetch_into_dest(
    provider: &dyn MediaProvider,
    handle: &MediaHandle,
    ctx: &mut DownloadContext<'_>,
    rel: &str,
    spec: &FileSpec,
) -> Result<Option<PathBuf>> {
    let Some(fetched) = provider.provide(handle, rel, spec)? else {
        return Ok(None);
    };
    let dest = ctx.dest_dir.join(rel);
    let copied = provider.copy_file(fetched.path(), &dest)?;
    ctx.files.push(copied);
    Ok(Some(dest))
}

fn resolve_keyhints(
    provider: &dyn MediaProvider,
    handle: &MediaHandle,
    ctx: &mut DownloadContext<'_>,
    master_local: &Path,
) -> Result<Vec<PublicKeyData>> {
    let hints = repomd::keyhints(master_local)?;
    if hints.is_empty() {
        return Ok(Vec::new());
    }
    debug!("check keyhints: {}", hints.len());

    let mut buddies = Vec::new();
    for (file, keyid) in hints {
        ctx.cancel.check()?;
        if let Some(data) = resolve_keyhint_local(ctx, &file, &keyid)? {
            buddies.push(data);
            continue;
        }

        let Some(fetched) = provider.provide(handle, &file, &optional_spec())? else {
            warn!("keyhint file {file} is not present in the repository, skipping it");
            continue;
        };
        let copied = provider.copy_file(fetched.path(), &ctx.dest_dir.join(&file))?;
        fs::create_dir_all(&ctx.key_cache_dir)?;
        let cached = provider.copy_file(copied.path(), &ctx.key_cache_dir.join(&file))?;
        if let Some(data) = ingest_fetched_keyhint(ctx, copied, cached, &file, &keyid)? {
            buddies.push(data);
        }
    }

    let buddies = keep_safe_buddies(buddies);
    info!("check keyhints done, buddy keys: {}", buddies.len());
    Ok(buddies)
}

fn signature_check(
    provider: &dyn MediaProvider,
    handle: &MediaHandle,
    ctx: &mut DownloadContext<'_>,
    master_local: &Path,
    sig_local: Option<&Path>,
    key_local: Option<&Path>,
    master_rel: &str,
) -> Result<Option<Verdict>> {
    if !ctx.repo.repo_gpg_check() {
        warn!(
            "signature checking disabled in config of repository {}",
            ctx.repo.alias()
        );
        return Ok(None);
    }

    let is_signed = sig_local.is_some();
    if !is_signed && !ctx.repo.repo_gpg_check_is_mandatory() {
        warn!(
            "accepting unsigned repository {} because the check is not mandatory",
            ctx.repo.alias()
        );
        return Ok(None);
    }

    let mut vctx =
        VerifyContext::new(master_local).short_desc(ctx.repo.alias().to_string());
    if let Some(sig) = sig_local {
        vctx = vctx.signature(sig);
    }
    import_inline_key(ctx, key_local);

    if is_repomd(master_rel) {
        for data in resolve_keyhints(provider, handle, ctx, master_local)? {
            debug!("keyhint remember buddy {}", data.id);
            vctx.add_buddy_key(data.id);
        }
    }

    ctx.cancel.check()?;
    Ok(Some(ctx.keyring.verify_file_signature(&vctx)?))
}

/// Download and verify the master index of a typed repository
pub fn download_master_index(
    provider: &dyn MediaProvider,
    handle: &MediaHandle,
    ctx: &mut DownloadContext<'_>,
    master_rel: &str,
) -> Result<()> {
    // always fetch signature and key, even when checking is disabled
    let sig_rel = format!("{master_rel}.asc");
    let key_rel = format!("{master_rel}.key");

    ctx.cancel.check()?;
    let sig_local = fetch_into_dest(provider, handle, ctx, &sig_rel, &optional_spec())?;
    let key_local = fetch_into_dest(provider, handle, ctx, &key_rel, &optional_spec())?;

    ctx.cancel.check()?;
    let master = provider
        .provide(handle, master_rel, &master_spec())?
        .ok_or_else(|| Error::TransportFailed {
            url: format!("{}/{master_rel}", handle.url()),
            reason: "master index is missing".to_string(),
        })?;

    run_plugin_verification(ctx, sig_local.as_deref(), key_local.as_deref(), master.path())?;

    let verdict = signature_check(
        provider,
        handle,
        ctx,
        master.path(),
        sig_local.as_deref(),
        key_local.as_deref(),
        master_rel,
    )?;
    record_verdict(ctx, verdict)?;

    ctx.cancel.check()?;
    let copied = provider.copy_file(master.path(), &ctx.dest_dir.join(master_rel))?;
    // the master index always heads the file list
    ctx.files.insert(0, copied);

    let dest = ctx.dest_dir.clone();
    ctx.repo.set_metadata_path(dest);
    Ok(())
}

/// Mirror the files the master index declares into the destination
///
/// rpm-md repositories list them as `<data>` entries, susetags via the
/// META lines of `content`. Plain directories declare nothing.
pub fn download_declared_files(
    provider: &dyn MediaProvider,
    handle: &MediaHandle,
    ctx: &mut DownloadContext<'_>,
) -> Result<usize> {
    let mut fetched = 0usize;
    match ctx.repo.repo_type() {
        RepoType::Rpmmd => {
            let entries = repomd::read_entries(&ctx.dest_dir.join("repodata/repomd.xml"))?;
            for entry in entries {
                ctx.cancel.check()?;
                let Some(path) =
                    fetch_into_dest(provider, handle, ctx, &entry.href, &FileSpec::new())?
                else {
                    continue;
                };
                // verify against the checksum the master index announced
                if let Some(checksum) = entry.checksum.as_deref().filter(|c| c.len() == 64) {
                    crate::media::verify_checksum(&path, checksum).map_err(|e| {
                        Error::TransportFailed {
                            url: format!("{}/{}", handle.url(), entry.href),
                            reason: e.to_string(),
                        }
                    })?;
                }
                fetched += 1;
            }
        }
        RepoType::Yast2 => {
            let content = susetags::read_content(&ctx.dest_dir.join("content"))?;
            for meta in &content.meta_files {
                ctx.cancel.check()?;
                let rel = format!("{}/{meta}", content.descr_dir);
                if fetch_into_dest(provider, handle, ctx, &rel, &FileSpec::new())?.is_some() {
                    fetched += 1;
                }
            }
            // license and media identification ship beside the index
            for rel in ["license.tar.gz", "media.1/media"] {
                ctx.cancel.check()?;
                if fetch_into_dest(provider, handle, ctx, rel, &optional_spec())?.is_some() {
                    fetched += 1;
                }
            }
        }
        RepoType::RpmPlainDir | RepoType::Unknown => {}
    }
    debug!("mirrored {fetched} declared files into {}", ctx.dest_dir.display());
    Ok(fetched)
}

// ---------------------------------------------------------------------
// async driver
// ---------------------------------------------------------------------

#[cfg(feature = "async")]
mod async_driver {
    use super::*;
    use crate::media::AsyncMediaProvider;

    async fn fetch_into_dest(
        provider: &dyn AsyncMediaProvider,
        handle: &MediaHandle,
        ctx: &mut DownloadContext<'_>,
        rel: &str,
        spec: &FileSpec,
    ) -> Result<Option<PathBuf>> {
        let Some(fetched) = provider.provide(handle, rel, spec).await? else {
            return Ok(None);
        };
        let dest = ctx.dest_dir.join(rel);
        let copied = provider.copy_file(fetched.path(), &dest).await?;
        ctx.files.push(copied);
        Ok(Some(dest))
    }

    async fn resolve_keyhints(
        provider: &dyn AsyncMediaProvider,
        handle: &MediaHandle,
        ctx: &mut DownloadContext<'_>,
        master_local: &Path,
    ) -> Result<Vec<PublicKeyData>> {
        let hints = repomd::keyhints(master_local)?;
        if hints.is_empty() {
            return Ok(Vec::new());
        }
        debug!("check keyhints: {}", hints.len());

        let mut buddies = Vec::new();
        for (file, keyid) in hints {
            ctx.cancel.check()?;
            if let Some(data) = resolve_keyhint_local(ctx, &file, &keyid)? {
                buddies.push(data);
                continue;
            }

            let Some(fetched) = provider.provide(handle, &file, &optional_spec()).await? else {
                warn!("keyhint file {file} is not present in the repository, skipping it");
                continue;
            };
            let copied = provider
                .copy_file(fetched.path(), &ctx.dest_dir.join(&file))
                .await?;
            fs::create_dir_all(&ctx.key_cache_dir)?;
            let cached = provider
                .copy_file(copied.path(), &ctx.key_cache_dir.join(&file))
                .await?;
            if let Some(data) = ingest_fetched_keyhint(ctx, copied, cached, &file, &keyid)? {
                buddies.push(data);
            }
        }

        let buddies = keep_safe_buddies(buddies);
        info!("check keyhints done, buddy keys: {}", buddies.len());
        Ok(buddies)
    }

    async fn signature_check(
        provider: &dyn AsyncMediaProvider,
        handle: &MediaHandle,
        ctx: &mut DownloadContext<'_>,
        master_local: &Path,
        sig_local: Option<&Path>,
        key_local: Option<&Path>,
        master_rel: &str,
    ) -> Result<Option<Verdict>> {
        if !ctx.repo.repo_gpg_check() {
            warn!(
                "signature checking disabled in config of repository {}",
                ctx.repo.alias()
            );
            return Ok(None);
        }

        let is_signed = sig_local.is_some();
        if !is_signed && !ctx.repo.repo_gpg_check_is_mandatory() {
            warn!(
                "accepting unsigned repository {} because the check is not mandatory",
                ctx.repo.alias()
            );
            return Ok(None);
        }

        let mut vctx =
            VerifyContext::new(master_local).short_desc(ctx.repo.alias().to_string());
        if let Some(sig) = sig_local {
            vctx = vctx.signature(sig);
        }
        import_inline_key(ctx, key_local);

        if is_repomd(master_rel) {
            for data in resolve_keyhints(provider, handle, ctx, master_local).await? {
                debug!("keyhint remember buddy {}", data.id);
                vctx.add_buddy_key(data.id);
            }
        }

        ctx.cancel.check()?;
        Ok(Some(ctx.keyring.verify_file_signature(&vctx)?))
    }

    /// Async twin of [`super::download_master_index`]
    ///
    /// The signature and key fetches run concurrently and join before
    /// the master index fetch starts.
    pub async fn download_master_index_async(
        provider: &dyn AsyncMediaProvider,
        handle: &MediaHandle,
        ctx: &mut DownloadContext<'_>,
        master_rel: &str,
    ) -> Result<()> {
        let sig_rel = format!("{master_rel}.asc");
        let key_rel = format!("{master_rel}.key");

        ctx.cancel.check()?;
        let spec = optional_spec();
        let (sig_fetch, key_fetch) = tokio::join!(
            provider.provide(handle, &sig_rel, &spec),
            provider.provide(handle, &key_rel, &spec),
        );

        let mut sig_local = None;
        if let Some(fetched) = sig_fetch? {
            let dest = ctx.dest_dir.join(&sig_rel);
            ctx.files.push(provider.copy_file(fetched.path(), &dest).await?);
            sig_local = Some(dest);
        }
        let mut key_local = None;
        if let Some(fetched) = key_fetch? {
            let dest = ctx.dest_dir.join(&key_rel);
            ctx.files.push(provider.copy_file(fetched.path(), &dest).await?);
            key_local = Some(dest);
        }

        ctx.cancel.check()?;
        let master = provider
            .provide(handle, master_rel, &master_spec())
            .await?
            .ok_or_else(|| Error::TransportFailed {
                url: format!("{}/{master_rel}", handle.url()),
                reason: "master index is missing".to_string(),
            })?;

        run_plugin_verification(ctx, sig_local.as_deref(), key_local.as_deref(), master.path())?;

        let verdict = signature_check(
            provider,
            handle,
            ctx,
            master.path(),
            sig_local.as_deref(),
            key_local.as_deref(),
            master_rel,
        )
        .await?;
        record_verdict(ctx, verdict)?;

        ctx.cancel.check()?;
        let copied = provider
            .copy_file(master.path(), &ctx.dest_dir.join(master_rel))
            .await?;
        ctx.files.insert(0, copied);

        let dest = ctx.dest_dir.clone();
        ctx.repo.set_metadata_path(dest);
        Ok(())
    }
}

#[cfg(feature = "async")]
pub use async_driver::download_master_index_async;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyring::StubKeyRing;
    use crate::media::LocalMedia;
    use tempfile::TempDir;

    fn rpmmd_fixture(dir: &Path) {
        fs::create_dir_all(dir.join("repodata")).unwrap();
        fs::write(
            dir.join("repodata/repomd.xml"),
            "<repomd><data type=\"primary\">\
             <location href=\"repodata/primary.xml\"/></data></repomd>",
        )
        .unwrap();
        fs::write(
            dir.join("repodata/primary.xml"),
            "<metadata><package><name>a</name><arch>noarch</arch>\
             <version ver=\"1\" rel=\"1\"/></package></metadata>",
        )
        .unwrap();
    }

    #[test]
    fn test_download_unsigned_repo_tolerated() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        rpmmd_fixture(&src);
        let dest = tmp.path().join("dest");

        let provider = LocalMedia;
        let handle = provider.attach(&format!("dir:{}", src.display())).unwrap();
        let keyring = StubKeyRing::accepting();

        let mut repo = RepoInfo::new("t");
        repo.set_repo_type(RepoType::Rpmmd);
        let mut ctx = DownloadContext::new(&mut repo, dest.clone(), &keyring);
        ctx.key_cache_dir = tmp.path().join("pubkeys");

        download_master_index(&provider, &handle, &mut ctx, "repodata/repomd.xml").unwrap();
        ctx.disarm_all();
        drop(ctx);

        assert!(dest.join("repodata/repomd.xml").exists());
        assert_eq!(repo.metadata_path(), Some(dest.as_path()));
        // unsigned and not mandatory: verdict stays indeterminate
        assert_eq!(repo.valid_repo_signature, None);
    }

    #[test]
    fn test_mandatory_check_fails_without_signature() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        rpmmd_fixture(&src);

        let provider = LocalMedia;
        let handle = provider.attach(&format!("dir:{}", src.display())).unwrap();
        // the keyring cannot validate anything without a signature
        let keyring = StubKeyRing::with_verdict(Verdict::Indeterminate);

        let mut repo = RepoInfo::new("t");
        repo.set_repo_type(RepoType::Rpmmd);
        repo.repo_gpg_check = Some(true);
        let mut ctx = DownloadContext::new(&mut repo, tmp.path().join("dest"), &keyring);

        let err =
            download_master_index(&provider, &handle, &mut ctx, "repodata/repomd.xml").unwrap_err();
        assert!(matches!(err, Error::SignatureCheckFailed { .. }));
    }

    #[test]
    fn test_failed_download_leaves_no_files() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        let dest = tmp.path().join("dest");

        let provider = LocalMedia;
        let handle = provider.attach(&format!("dir:{}", src.display())).unwrap();
        let keyring = StubKeyRing::accepting();

        let mut repo = RepoInfo::new("t");
        repo.set_repo_type(RepoType::Rpmmd);
        {
            let mut ctx = DownloadContext::new(&mut repo, dest.clone(), &keyring);
            assert!(
                download_master_index(&provider, &handle, &mut ctx, "repodata/repomd.xml")
                    .is_err()
            );
            // guards drop here without disarm
        }
        assert!(!dest.join("repodata/repomd.xml").exists());
    }

    #[test]
    fn test_cancellation_aborts_early() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        rpmmd_fixture(&src);

        let provider = LocalMedia;
        let handle = provider.attach(&format!("dir:{}", src.display())).unwrap();
        let keyring = StubKeyRing::accepting();

        let mut repo = RepoInfo::new("t");
        repo.set_repo_type(RepoType::Rpmmd);
        let mut ctx = DownloadContext::new(&mut repo, tmp.path().join("dest"), &keyring);
        ctx.cancel.cancel();

        let err =
            download_master_index(&provider, &handle, &mut ctx, "repodata/repomd.xml").unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_keyhint_not_providing_key_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("repodata")).unwrap();
        fs::write(
            src.join("repodata/repomd.xml"),
            "<repomd><tags><content>badkey.asc?fpr=DEADBEEFDEADBEEF</content></tags>\
             <data type=\"primary\"><location href=\"repodata/primary.xml\"/></data></repomd>",
        )
        .unwrap();
        fs::write(src.join("repodata/primary.xml"), "<metadata/>").unwrap();
        fs::write(src.join("repodata/repomd.xml.asc"), "fake signature").unwrap();
        // the hinted file exists but is not a key at all
        fs::write(src.join("badkey.asc"), "definitely not a key").unwrap();

        let provider = LocalMedia;
        let handle = provider.attach(&format!("dir:{}", src.display())).unwrap();
        let keyring = StubKeyRing::accepting();

        let dest = tmp.path().join("dest");
        let mut repo = RepoInfo::new("t");
        repo.set_repo_type(RepoType::Rpmmd);
        let mut ctx = DownloadContext::new(&mut repo, dest.clone(), &keyring);
        ctx.key_cache_dir = tmp.path().join("pubkeys");

        download_master_index(&provider, &handle, &mut ctx, "repodata/repomd.xml").unwrap();
        ctx.disarm_all();
        drop(ctx);

        // the hint was dropped: neither mirrored nor cached, and nothing
        // was imported into the keyring
        assert!(!dest.join("badkey.asc").exists());
        assert!(!tmp.path().join("pubkeys/badkey.asc").exists());
        assert!(keyring.imports().is_empty());
        assert_eq!(repo.valid_repo_signature, Some(true));
    }

    #[test]
    fn test_declared_files_mirrored() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        rpmmd_fixture(&src);
        let dest = tmp.path().join("dest");

        let provider = LocalMedia;
        let handle = provider.attach(&format!("dir:{}", src.display())).unwrap();
        let keyring = StubKeyRing::accepting();

        let mut repo = RepoInfo::new("t");
        repo.set_repo_type(RepoType::Rpmmd);
        let mut ctx = DownloadContext::new(&mut repo, dest.clone(), &keyring);

        download_master_index(&provider, &handle, &mut ctx, "repodata/repomd.xml").unwrap();
        let fetched = download_declared_files(&provider, &handle, &mut ctx).unwrap();
        ctx.disarm_all();

        assert_eq!(fetched, 1);
        assert!(dest.join("repodata/primary.xml").exists());
    }
}
