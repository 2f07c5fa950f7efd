// src/media.rs

//! Media provider: delivers files from repository locations
//!
//! The downloader and prober never touch transports directly; they go
//! through [`MediaProvider`] (and its async twin). Local `dir:`/`file:`
//! locations hand out the real path, remote locations download into a
//! temp file whose guard unlinks it unless the caller persists it.

use crate::dispose::ManagedFile;
use crate::error::{Error, Result};
use crate::info::{url_join, url_scheme};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tracing::{debug, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// How a single file is to be provided
#[derive(Debug, Clone, Default)]
pub struct FileSpec {
    /// Absence is not an error, it is an absent input
    pub optional: bool,
    /// Refuse files larger than this many bytes
    pub size_cap: Option<u64>,
}

impl FileSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn size_cap(mut self, cap: u64) -> Self {
        self.size_cap = Some(cap);
        self
    }
}

/// An attached repository location
#[derive(Debug, Clone)]
pub struct MediaHandle {
    url: String,
}

impl MediaHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    fn scheme(&self) -> Option<String> {
        url_scheme(&self.url)
    }
}

/// Blocking file delivery from an attached location
pub trait MediaProvider: Send + Sync {
    /// Attach to a base location
    fn attach(&self, url: &str) -> Result<MediaHandle>;

    /// Provide one file below the attached location
    ///
    /// Returns `Ok(None)` exactly when the file is absent and the spec
    /// marked it optional.
    fn provide(&self, handle: &MediaHandle, rel: &str, spec: &FileSpec)
        -> Result<Option<ManagedFile>>;

    /// Atomically place `src` at `dst`; the returned guard unlinks `dst`
    /// unless disarmed
    fn copy_file(&self, src: &Path, dst: &Path) -> Result<ManagedFile>;

    /// Names of the entries below the attached location, where listable
    fn dir_entries(&self, handle: &MediaHandle, rel: &str) -> Result<Vec<String>>;
}

/// Resolve a `dir:`/`file:` URL (or a bare path) to a local path
pub fn local_path(url: &str) -> Result<PathBuf> {
    match url_scheme(url).as_deref() {
        Some("dir") | Some("file") => {
            let rest = &url[url.find(':').unwrap() + 1..];
            let path = if let Some(stripped) = rest.strip_prefix("//") {
                stripped
            } else {
                rest
            };
            Ok(PathBuf::from(path))
        }
        Some(other) => Err(Error::TransportFailed {
            url: url.to_string(),
            reason: format!("'{other}' is not a local scheme"),
        }),
        None => Ok(PathBuf::from(url)),
    }
}

fn propagate_mtime(src: &Path, dst: &Path) -> Result<()> {
    let mtime = fs::metadata(src)?.modified()?;
    let file = File::options().write(true).open(dst)?;
    file.set_modified(mtime)?;
    Ok(())
}

/// Atomic copy used by all providers: temp file, mtime, rename
fn copy_with_rename(src: &Path, dst: &Path) -> Result<ManagedFile> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = dst.with_extension("part");
    fs::copy(src, &tmp).map_err(|e| {
        Error::IoFailed(format!(
            "cannot copy {} to {}: {e}",
            src.display(),
            tmp.display()
        ))
    })?;
    // keep the source mtime so status anchors survive the copy
    propagate_mtime(src, &tmp)?;
    fs::rename(&tmp, dst)
        .map_err(|e| Error::IoFailed(format!("cannot move into {}: {e}", dst.display())))?;
    Ok(ManagedFile::with_unlink(dst))
}

/// Provider for `dir:` and `file:` locations
#[derive(Debug, Default)]
pub struct LocalMedia;

impl MediaProvider for LocalMedia {
    fn attach(&self, url: &str) -> Result<MediaHandle> {
        local_path(url)?;
        Ok(MediaHandle {
            url: url.to_string(),
        })
    }

    fn provide(
        &self,
        handle: &MediaHandle,
        rel: &str,
        spec: &FileSpec,
    ) -> Result<Option<ManagedFile>> {
        let root = local_path(handle.url())?;
        let path = if rel.is_empty() {
            root
        } else {
            root.join(rel.trim_start_matches('/'))
        };

        let meta = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if spec.optional {
                    debug!("optional file {} is absent", path.display());
                    return Ok(None);
                }
                return Err(Error::TransportFailed {
                    url: format!("{}/{rel}", handle.url()),
                    reason: "no such file".to_string(),
                });
            }
            Err(e) => return Err(Error::IoFailed(e.to_string())),
        };

        if let Some(cap) = spec.size_cap {
            if meta.len() > cap {
                return Err(Error::TransportFailed {
                    url: format!("{}/{rel}", handle.url()),
                    reason: format!("file exceeds size cap of {cap} bytes"),
                });
            }
        }
        Ok(Some(ManagedFile::new(path)))
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> Result<ManagedFile> {
        copy_with_rename(src, dst)
    }

    fn dir_entries(&self, handle: &MediaHandle, rel: &str) -> Result<Vec<String>> {
        let root = local_path(handle.url())?;
        let dir = if rel.is_empty() {
            root
        } else {
            root.join(rel.trim_start_matches('/'))
        };
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)
            .map_err(|e| Error::IoFailed(format!("cannot read {}: {e}", dir.display())))?
        {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

/// Provider for `http:`/`https:` locations built on a blocking client
pub struct HttpMedia {
    client: reqwest::blocking::Client,
}

impl HttpMedia {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::IoFailed(format!("cannot create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn apply_last_modified(headers: &reqwest::header::HeaderMap, path: &Path) {
        let Some(value) = headers.get(reqwest::header::LAST_MODIFIED) else {
            return;
        };
        let Ok(text) = value.to_str() else { return };
        let Ok(when) = chrono::DateTime::parse_from_rfc2822(text) else {
            warn!("unparsable Last-Modified header: {text}");
            return;
        };
        let mtime = UNIX_EPOCH + Duration::from_secs(when.timestamp().max(0) as u64);
        if let Ok(file) = File::options().write(true).open(path) {
            let _ = file.set_modified(mtime);
        }
    }

    fn stream_capped(
        mut response: reqwest::blocking::Response,
        file: &mut File,
        cap: Option<u64>,
        url: &str,
    ) -> Result<u64> {
        let mut downloaded: u64 = 0;
        let mut buffer = [0u8; STREAM_BUFFER_SIZE];
        loop {
            let n = response
                .read(&mut buffer)
                .map_err(|e| Error::IoFailed(format!("failed to read response: {e}")))?;
            if n == 0 {
                break;
            }
            downloaded += n as u64;
            if let Some(cap) = cap {
                if downloaded > cap {
                    return Err(Error::TransportFailed {
                        url: url.to_string(),
                        reason: format!("download exceeds size cap of {cap} bytes"),
                    });
                }
            }
            file.write_all(&buffer[..n])
                .map_err(|e| Error::IoFailed(format!("failed to write download: {e}")))?;
        }
        Ok(downloaded)
    }
}

impl MediaProvider for HttpMedia {
    fn attach(&self, url: &str) -> Result<MediaHandle> {
        Ok(MediaHandle {
            url: url.to_string(),
        })
    }

    fn provide(
        &self,
        handle: &MediaHandle,
        rel: &str,
        spec: &FileSpec,
    ) -> Result<Option<ManagedFile>> {
        let url = url_join(handle.url(), rel);
        debug!("fetching {url}");

        let response = self.client.get(&url).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                Error::RemoteUnavailable(format!("{url}: {e}"))
            } else {
                Error::TransportFailed {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            if spec.optional {
                debug!("optional file {url} is absent (HTTP {status})");
                return Ok(None);
            }
            return Err(Error::TransportFailed {
                url,
                reason: format!("HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(Error::TransportFailed {
                url,
                reason: format!("HTTP {status}"),
            });
        }

        if let (Some(cap), Some(len)) = (spec.size_cap, response.content_length()) {
            if len > cap {
                return Err(Error::TransportFailed {
                    url,
                    reason: format!("announced size {len} exceeds cap of {cap} bytes"),
                });
            }
        }

        let headers = response.headers().clone();
        let tmp = tempfile::Builder::new()
            .prefix("quarry-dl-")
            .tempfile()
            .map_err(|e| Error::IoFailed(format!("cannot create temp file: {e}")))?;
        let path = tmp
            .into_temp_path()
            .keep()
            .map_err(|e| Error::IoFailed(format!("cannot keep temp file: {e}")))?;
        let guard = ManagedFile::with_unlink(&path);

        let mut file = File::options().write(true).open(&path)?;
        let bytes = Self::stream_capped(response, &mut file, spec.size_cap, &url)?;
        file.sync_all()?;
        drop(file);

        Self::apply_last_modified(&headers, &path);
        debug!("downloaded {bytes} bytes from {url}");
        Ok(Some(guard))
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> Result<ManagedFile> {
        copy_with_rename(src, dst)
    }

    fn dir_entries(&self, handle: &MediaHandle, rel: &str) -> Result<Vec<String>> {
        Err(Error::TransportFailed {
            url: url_join(handle.url(), rel),
            reason: "directory listing is not supported over HTTP".to_string(),
        })
    }
}

/// Scheme-dispatching provider used by the manager
pub struct DefaultMedia {
    local: LocalMedia,
    http: HttpMedia,
}

impl DefaultMedia {
    pub fn new() -> Result<Self> {
        Ok(Self {
            local: LocalMedia,
            http: HttpMedia::new()?,
        })
    }

    fn backend(&self, handle: &MediaHandle) -> Result<&dyn MediaProvider> {
        match handle.scheme().as_deref() {
            Some("dir") | Some("file") | None => Ok(&self.local),
            Some("http") | Some("https") => Ok(&self.http),
            Some(other) => Err(Error::TransportFailed {
                url: handle.url().to_string(),
                reason: format!("scheme '{other}' is not supported by this media backend"),
            }),
        }
    }
}

impl MediaProvider for DefaultMedia {
    fn attach(&self, url: &str) -> Result<MediaHandle> {
        let handle = MediaHandle {
            url: url.to_string(),
        };
        self.backend(&handle)?;
        Ok(handle)
    }

    fn provide(
        &self,
        handle: &MediaHandle,
        rel: &str,
        spec: &FileSpec,
    ) -> Result<Option<ManagedFile>> {
        self.backend(handle)?.provide(handle, rel, spec)
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> Result<ManagedFile> {
        copy_with_rename(src, dst)
    }

    fn dir_entries(&self, handle: &MediaHandle, rel: &str) -> Result<Vec<String>> {
        self.backend(handle)?.dir_entries(handle, rel)
    }
}

/// Async file delivery, mirroring [`MediaProvider`]
///
/// The sync and async downloaders run the same logic; only the awaiting
/// differs. Local files never actually suspend.
#[cfg(feature = "async")]
#[async_trait::async_trait]
pub trait AsyncMediaProvider: Send + Sync {
    fn attach(&self, url: &str) -> Result<MediaHandle>;

    async fn provide(
        &self,
        handle: &MediaHandle,
        rel: &str,
        spec: &FileSpec,
    ) -> Result<Option<ManagedFile>>;

    async fn copy_file(&self, src: &Path, dst: &Path) -> Result<ManagedFile>;
}

/// Async twin of [`DefaultMedia`]
#[cfg(feature = "async")]
pub struct AsyncDefaultMedia {
    local: LocalMedia,
    client: reqwest::Client,
}

#[cfg(feature = "async")]
impl AsyncDefaultMedia {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::IoFailed(format!("cannot create HTTP client: {e}")))?;
        Ok(Self {
            local: LocalMedia,
            client,
        })
    }
}

#[cfg(feature = "async")]
#[async_trait::async_trait]
impl AsyncMediaProvider for AsyncDefaultMedia {
    fn attach(&self, url: &str) -> Result<MediaHandle> {
        let handle = MediaHandle {
            url: url.to_string(),
        };
        match handle.scheme().as_deref() {
            Some("dir") | Some("file") | Some("http") | Some("https") | None => Ok(handle),
            Some(other) => Err(Error::TransportFailed {
                url: handle.url().to_string(),
                reason: format!("scheme '{other}' is not supported by this media backend"),
            }),
        }
    }

    async fn provide(
        &self,
        handle: &MediaHandle,
        rel: &str,
        spec: &FileSpec,
    ) -> Result<Option<ManagedFile>> {
        match handle.scheme().as_deref() {
            Some("http") | Some("https") => {}
            _ => return self.local.provide(handle, rel, spec),
        }

        let url = url_join(handle.url(), rel);
        debug!("fetching {url}");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                Error::RemoteUnavailable(format!("{url}: {e}"))
            } else {
                Error::TransportFailed {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            if spec.optional {
                debug!("optional file {url} is absent (HTTP {status})");
                return Ok(None);
            }
            return Err(Error::TransportFailed {
                url,
                reason: format!("HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(Error::TransportFailed {
                url,
                reason: format!("HTTP {status}"),
            });
        }

        if let (Some(cap), Some(len)) = (spec.size_cap, response.content_length()) {
            if len > cap {
                return Err(Error::TransportFailed {
                    url,
                    reason: format!("announced size {len} exceeds cap of {cap} bytes"),
                });
            }
        }

        let headers = response.headers().clone();
        let tmp = tempfile::Builder::new()
            .prefix("quarry-dl-")
            .tempfile()
            .map_err(|e| Error::IoFailed(format!("cannot create temp file: {e}")))?;
        let path = tmp
            .into_temp_path()
            .keep()
            .map_err(|e| Error::IoFailed(format!("cannot keep temp file: {e}")))?;
        let guard = ManagedFile::with_unlink(&path);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::IoFailed(format!("failed to read response: {e}")))?;
        if let Some(cap) = spec.size_cap {
            if bytes.len() as u64 > cap {
                return Err(Error::TransportFailed {
                    url,
                    reason: format!("download exceeds size cap of {cap} bytes"),
                });
            }
        }
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| Error::IoFailed(format!("failed to write download: {e}")))?;

        HttpMedia::apply_last_modified(&headers, &path);
        debug!("downloaded {} bytes from {url}", bytes.len());
        Ok(Some(guard))
    }

    async fn copy_file(&self, src: &Path, dst: &Path) -> Result<ManagedFile> {
        copy_with_rename(src, dst)
    }
}

/// Verify file checksum matches the expected hex digest
pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    use sha2::{Digest, Sha256};

    let mut file = File::open(path)
        .map_err(|e| Error::IoFailed(format!("failed to open file for checksum: {e}")))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .map_err(|e| Error::IoFailed(format!("failed to read file for checksum: {e}")))?;
    let actual = format!("{:x}", hasher.finalize());

    if !actual.eq_ignore_ascii_case(expected) {
        return Err(Error::CacheCorrupted {
            alias: path.display().to_string(),
            reason: format!("checksum mismatch: expected {expected}, got {actual}"),
        });
    }
    Ok(())
}
