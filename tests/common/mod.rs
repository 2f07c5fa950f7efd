// tests/common/mod.rs

//! Shared fixtures and helpers for the integration tests.

#![allow(dead_code)]

use quarry::{LocalMedia, Pool, RepoManager, RepoManagerOptions, StubKeyRing};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A manager over a throwaway state directory plus an empty pool.
///
/// Keep the TempDir alive to prevent cleanup.
pub struct TestSetup {
    pub tmp: TempDir,
    pub manager: RepoManager,
    pub pool: Pool,
}

impl TestSetup {
    /// Manager with a scripted always-valid keyring and local media.
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let options = RepoManagerOptions::test_setup(tmp.path().join("state"));
        let manager = RepoManager::with_collaborators(
            options,
            Box::new(LocalMedia),
            Arc::new(StubKeyRing::accepting()),
        )
        .unwrap();
        Self {
            tmp,
            manager,
            pool: Pool::new(),
        }
    }

    /// A scratch directory below the test root for fixture data.
    pub fn data_dir(&self, name: &str) -> PathBuf {
        let dir = self.tmp.path().join("data").join(name);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn dir_url(path: &Path) -> String {
        format!("dir:{}", path.display())
    }
}

/// Write a susetags (yast2) repository tree.
///
/// `pkgs` are `(name, version, release, arch, summary)` tuples.
pub fn make_susetags_repo(dir: &Path, pkgs: &[(&str, &str, &str, &str, &str)], license: bool) {
    let descr = dir.join("suse/setup/descr");
    fs::create_dir_all(&descr).unwrap();

    let mut packages = String::from("=Ver: 2.0\n");
    for (name, ver, rel, arch, summary) in pkgs {
        packages.push_str("##----------------------------------------\n");
        packages.push_str(&format!("=Pkg: {name} {ver} {rel} {arch}\n"));
        packages.push_str(&format!("=Sum: {summary}\n"));
    }
    fs::write(descr.join("packages"), packages).unwrap();

    let content = "\
LABEL Test Addon
DESCRDIR suse/setup/descr
DATADIR suse
META SHA256 0000000000000000000000000000000000000000000000000000000000000000 packages
";
    fs::write(dir.join("content"), content).unwrap();

    if license {
        fs::write(dir.join("license.tar.gz"), b"\x1f\x8b\x08\x00license").unwrap();
    }
}

/// Write an rpm-md repository tree with a gzipped primary.
///
/// `pkgs` are `(name, version)` pairs; release is pinned to `1`.
pub fn make_rpmmd_repo(dir: &Path, pkgs: &[(&str, &str)]) {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let repodata = dir.join("repodata");
    fs::create_dir_all(&repodata).unwrap();

    let mut primary = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<metadata xmlns=\"http://linux.duke.edu/metadata/common\">\n",
    );
    for (name, ver) in pkgs {
        primary.push_str(&format!(
            "  <package type=\"rpm\">\n    <name>{name}</name>\n    <arch>x86_64</arch>\n    \
             <version epoch=\"0\" ver=\"{ver}\" rel=\"1\"/>\n    <summary>test {name}</summary>\n  </package>\n"
        ));
    }
    primary.push_str("</metadata>\n");

    let mut enc = GzEncoder::new(
        fs::File::create(repodata.join("primary.xml.gz")).unwrap(),
        Compression::default(),
    );
    enc.write_all(primary.as_bytes()).unwrap();
    enc.finish().unwrap();

    let repomd = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<repomd xmlns=\"http://linux.duke.edu/metadata/repo\">\n\
  <data type=\"primary\">\n\
    <location href=\"repodata/primary.xml.gz\"/>\n\
  </data>\n\
</repomd>\n";
    fs::write(repodata.join("repomd.xml"), repomd).unwrap();
}

/// Install a service plugin executable emitting the given repositories.
#[cfg(unix)]
pub fn install_service_plugin(plugins_dir: &Path, name: &str, repos: &[(&str, &str)]) {
    use std::os::unix::fs::PermissionsExt;

    fs::create_dir_all(plugins_dir).unwrap();

    let mut script = String::from("#!/bin/sh\ncat <<'EOF'\n");
    for (alias, url) in repos {
        script.push_str(&format!(
            "[{alias}]\nname=Service repo {alias}\nbaseurl={url}\nenabled=1\nautorefresh=0\n\n"
        ));
    }
    script.push_str("EOF\n");

    let path = plugins_dir.join(name);
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// Write a repoindex.xml for a remote-index service.
pub fn make_repoindex(dir: &Path, repos: &[(&str, &str)]) {
    fs::create_dir_all(dir).unwrap();
    let mut text = String::from("<repoindex>\n");
    for (alias, url) in repos {
        text.push_str(&format!(
            "  <repo alias=\"{alias}\" url=\"{url}\" name=\"{alias}\" enabled=\"true\"/>\n"
        ));
    }
    text.push_str("</repoindex>\n");
    fs::write(dir.join("repoindex.xml"), text).unwrap();
}

/// Write a multi-section .repo file.
pub fn write_repo_file(path: &Path, aliases: &[&str]) {
    let mut text = String::new();
    for alias in aliases {
        text.push_str(&format!(
            "[{alias}]\nname=Repo {alias}\nbaseurl=http://example.com/{alias}\nenabled=1\n\n"
        ));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}
