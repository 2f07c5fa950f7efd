// tests/downloader_lockstep.rs

//! Shared test vector keeping the blocking and the async downloader in
//! lockstep: both run over the same fixture and must produce identical
//! results.

#![cfg(feature = "async")]

mod common;

use common::{make_rpmmd_repo, TestSetup};
use quarry::download::{download_master_index, download_master_index_async, DownloadContext};
use quarry::media::{AsyncDefaultMedia, AsyncMediaProvider, LocalMedia, MediaProvider};
use quarry::{RepoInfo, RepoType, StubKeyRing};
use std::fs;
use std::path::{Path, PathBuf};

const MASTER_REL: &str = "repodata/repomd.xml";

fn fixture(test: &TestSetup) -> PathBuf {
    let base = test.data_dir("lockstep");
    make_rpmmd_repo(&base, &[("kernel-default", "6.4.0"), ("bash", "5.2.26")]);
    // a detached signature and an inline key, picked up as optional inputs
    fs::write(
        base.join("repodata/repomd.xml.asc"),
        b"-----BEGIN PGP SIGNATURE-----\nfake\n-----END PGP SIGNATURE-----\n",
    )
    .unwrap();
    fs::write(
        base.join("repodata/repomd.xml.key"),
        b"-----BEGIN PGP PUBLIC KEY BLOCK-----\nfake\n-----END PGP PUBLIC KEY BLOCK-----\n",
    )
    .unwrap();
    base
}

fn collect_tree(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<(String, Vec<u8>)> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(dir)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect();
    files.sort();
    files
}

fn run_sync(base: &Path, dest: &Path) -> RepoInfo {
    let provider = LocalMedia;
    let handle = provider
        .attach(&format!("dir:{}", base.display()))
        .unwrap();
    let keyring = StubKeyRing::accepting();

    let mut repo = RepoInfo::new("lockstep");
    repo.set_repo_type(RepoType::Rpmmd);
    let mut ctx = DownloadContext::new(&mut repo, dest.to_path_buf(), &keyring);
    download_master_index(&provider, &handle, &mut ctx, MASTER_REL).unwrap();
    ctx.disarm_all();
    drop(ctx);
    repo
}

async fn run_async(base: &Path, dest: &Path) -> RepoInfo {
    let provider = AsyncDefaultMedia::new().unwrap();
    let handle = provider
        .attach(&format!("dir:{}", base.display()))
        .unwrap();
    let keyring = StubKeyRing::accepting();

    let mut repo = RepoInfo::new("lockstep");
    repo.set_repo_type(RepoType::Rpmmd);
    let mut ctx = DownloadContext::new(&mut repo, dest.to_path_buf(), &keyring);
    download_master_index_async(&provider, &handle, &mut ctx, MASTER_REL)
        .await
        .unwrap();
    ctx.disarm_all();
    drop(ctx);
    repo
}

#[tokio::test]
async fn test_sync_and_async_downloads_are_identical() {
    let test = TestSetup::new();
    let base = fixture(&test);

    let dest_sync = test.tmp.path().join("dest-sync");
    let dest_async = test.tmp.path().join("dest-async");

    let base_clone = base.clone();
    let dest_sync_clone = dest_sync.clone();
    let repo_sync = tokio::task::spawn_blocking(move || run_sync(&base_clone, &dest_sync_clone))
        .await
        .unwrap();
    let repo_async = run_async(&base, &dest_async).await;

    // both variants record the same outcome on the repo
    assert_eq!(repo_sync.valid_repo_signature, repo_async.valid_repo_signature);
    assert_eq!(repo_sync.valid_repo_signature, Some(true));
    assert_eq!(repo_sync.metadata_path(), Some(dest_sync.as_path()));
    assert_eq!(repo_async.metadata_path(), Some(dest_async.as_path()));

    // and deliver byte-identical trees
    let tree_sync = collect_tree(&dest_sync);
    let tree_async = collect_tree(&dest_async);
    assert_eq!(
        tree_sync.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
        vec!["repodata/repomd.xml", "repodata/repomd.xml.asc", "repodata/repomd.xml.key"],
    );
    assert_eq!(tree_sync, tree_async);
}

#[tokio::test]
async fn test_async_unsigned_repo() {
    let test = TestSetup::new();
    let base = test.data_dir("unsigned");
    make_rpmmd_repo(&base, &[("pkg", "1.0")]);

    let dest = test.tmp.path().join("dest");
    let repo = run_async(&base, &dest).await;
    assert_eq!(repo.valid_repo_signature, None);
    assert!(dest.join(MASTER_REL).exists());
}
