// src/keyring.rs

//! Keyring boundary: key import, lookup and signature verification
//!
//! The core never embeds crypto decisions; it talks to the [`KeyRing`]
//! trait. The production implementation is backed by sequoia-openpgp
//! with two on-disk keyrings (trusted and general); tests inject
//! [`StubKeyRing`] to script verification outcomes.

use crate::error::{Error, Result};
use sequoia_openpgp as openpgp;

use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::SerializeInto;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Ternary outcome of a signature verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid,
    /// No signature, or the signing key is unknown
    Indeterminate,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }

    /// The tri-state recorded on the repo after a download
    pub fn as_tribool(&self) -> Option<bool> {
        match self {
            Verdict::Valid => Some(true),
            Verdict::Invalid => Some(false),
            Verdict::Indeterminate => None,
        }
    }
}

/// Identifying data of a public key, without the key material
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyData {
    /// Short key id (hex, uppercase)
    pub id: String,
    /// Full fingerprint (hex, uppercase)
    pub fingerprint: String,
    /// Primary key algorithm family
    pub algorithm: String,
    /// Primary key size in bits, 0 when unknown
    pub bits: usize,
}

impl PublicKeyData {
    /// Weak-key predicate: weak keys may be cached but never auto-vouch
    /// for a signature
    pub fn is_safe(&self) -> bool {
        match self.algorithm.as_str() {
            "DSA" | "ElGamal" => false,
            "RSA" => self.bits >= 2048,
            _ => true,
        }
    }

    /// Suffix match the way OpenPGP ids are usually quoted
    pub fn matches_id(&self, id: &str) -> bool {
        let id = normalize_id(id);
        !id.is_empty() && (self.fingerprint.ends_with(&id) || id.ends_with(&self.id))
    }
}

fn normalize_id(id: &str) -> String {
    id.trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

fn algo_family(algo: openpgp::types::PublicKeyAlgorithm) -> &'static str {
    use openpgp::types::PublicKeyAlgorithm::*;
    match algo {
        RSAEncryptSign | RSAEncrypt | RSASign => "RSA",
        DSA => "DSA",
        ElGamalEncrypt | ElGamalEncryptSign => "ElGamal",
        ECDSA => "ECDSA",
        EdDSA => "EdDSA",
        ECDH => "ECDH",
        _ => "other",
    }
}

/// A public key loaded from an (armored) key file
pub struct PublicKey {
    path: PathBuf,
    cert: openpgp::Cert,
}

impl PublicKey {
    pub fn from_file(path: &Path) -> Result<Self> {
        let cert = openpgp::Cert::from_file(path)
            .map_err(|e| Error::KeyringFailed(format!("failed to parse {}: {e}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            cert,
        })
    }

    /// Like [`PublicKey::from_file`] but swallowing the error
    pub fn no_throw(path: &Path) -> Option<Self> {
        Self::from_file(path).ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> PublicKeyData {
        cert_data(&self.cert)
    }

    /// Whether this key file carries the given (sub)key id
    pub fn file_provides_key(&self, id: &str) -> bool {
        let id = normalize_id(id);
        if id.is_empty() {
            return false;
        }
        self.cert.keys().any(|ka| {
            let fpr = ka.key().fingerprint().to_hex();
            let kid = ka.key().keyid().to_hex();
            fpr.ends_with(&id) || id.ends_with(&kid)
        })
    }
}

fn cert_data(cert: &openpgp::Cert) -> PublicKeyData {
    let primary = cert.primary_key();
    PublicKeyData {
        id: primary.key().keyid().to_hex(),
        fingerprint: cert.fingerprint().to_hex(),
        algorithm: algo_family(primary.key().pk_algo()).to_string(),
        bits: primary.key().mpis().bits().unwrap_or(0),
    }
}

/// What a verification run needs to know
#[derive(Debug, Clone)]
pub struct VerifyContext {
    /// The file whose authenticity is being checked
    pub file: PathBuf,
    /// Detached signature, when one exists
    pub signature: Option<PathBuf>,
    /// Short description for log messages (usually the repo alias)
    pub short_desc: String,
    /// Additional key ids allowed to vouch for this file
    pub buddy_keys: Vec<String>,
}

impl VerifyContext {
    pub fn new<P: Into<PathBuf>>(file: P) -> Self {
        Self {
            file: file.into(),
            signature: None,
            short_desc: String::new(),
            buddy_keys: Vec::new(),
        }
    }

    pub fn signature<P: Into<PathBuf>>(mut self, sig: P) -> Self {
        self.signature = Some(sig.into());
        self
    }

    pub fn short_desc<S: Into<String>>(mut self, desc: S) -> Self {
        self.short_desc = desc.into();
        self
    }

    pub fn add_buddy_key<S: Into<String>>(&mut self, id: S) {
        self.buddy_keys.push(id.into());
    }
}

/// The four-method keyring contract consumed by the downloader
pub trait KeyRing: Send + Sync {
    /// Import a key into the trusted or the general keyring
    fn import_key(&self, key: &PublicKey, trusted: bool) -> Result<()>;

    /// Look up a key in the trusted keyring
    fn trusted_public_key_data(&self, id: &str) -> Option<PublicKeyData>;

    /// Look up a key in the general (untrusted) keyring
    fn public_key_data(&self, id: &str) -> Option<PublicKeyData>;

    /// Verify a (possibly detached) signature over a file
    fn verify_file_signature(&self, ctx: &VerifyContext) -> Result<Verdict>;
}

/// File-backed keyring built on sequoia-openpgp
pub struct SequoiaKeyRing {
    trusted_dir: PathBuf,
    general_dir: PathBuf,
    policy: StandardPolicy<'static>,
}

impl SequoiaKeyRing {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base = base_dir.as_ref();
        let trusted_dir = base.join("trusted");
        let general_dir = base.join("general");
        fs::create_dir_all(&trusted_dir)?;
        fs::create_dir_all(&general_dir)?;
        Ok(Self {
            trusted_dir,
            general_dir,
            policy: StandardPolicy::new(),
        })
    }

    fn load_certs(dir: &Path) -> Vec<openpgp::Cert> {
        let mut certs = Vec::new();
        let Ok(entries) = fs::read_dir(dir) else {
            return certs;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("asc") {
                continue;
            }
            match openpgp::Cert::from_file(&path) {
                Ok(cert) => certs.push(cert),
                Err(e) => warn!("skipping unreadable key {}: {e}", path.display()),
            }
        }
        certs
    }

    fn find_in(dir: &Path, id: &str) -> Option<PublicKeyData> {
        Self::load_certs(dir)
            .iter()
            .map(cert_data)
            .find(|data| data.matches_id(id))
    }
}

impl KeyRing for SequoiaKeyRing {
    fn import_key(&self, key: &PublicKey, trusted: bool) -> Result<()> {
        let dir = if trusted {
            &self.trusted_dir
        } else {
            &self.general_dir
        };
        let armored = key
            .cert
            .armored()
            .to_vec()
            .map_err(|e| Error::KeyringFailed(format!("failed to armor key: {e}")))?;
        let target = dir.join(format!("{}.asc", key.cert.fingerprint().to_hex()));
        fs::write(&target, armored)?;
        info!(
            "imported key {} into the {} keyring",
            key.cert.fingerprint().to_hex(),
            if trusted { "trusted" } else { "general" }
        );
        Ok(())
    }

    fn trusted_public_key_data(&self, id: &str) -> Option<PublicKeyData> {
        Self::find_in(&self.trusted_dir, id)
    }

    fn public_key_data(&self, id: &str) -> Option<PublicKeyData> {
        Self::find_in(&self.general_dir, id)
    }

    fn verify_file_signature(&self, ctx: &VerifyContext) -> Result<Verdict> {
        let Some(sig_path) = &ctx.signature else {
            debug!("no signature for {}, indeterminate", ctx.file.display());
            return Ok(Verdict::Indeterminate);
        };

        let message = fs::read(&ctx.file)
            .map_err(|e| Error::IoFailed(format!("cannot read {}: {e}", ctx.file.display())))?;
        let sig_data = fs::read(sig_path)
            .map_err(|e| Error::IoFailed(format!("cannot read {}: {e}", sig_path.display())))?;

        let pile = openpgp::PacketPile::from_bytes(&sig_data)
            .map_err(|e| Error::KeyringFailed(format!("failed to parse signature: {e}")))?;

        // trusted keys always vouch; general keys only when announced as
        // buddy keys of this verification
        let mut certs = Self::load_certs(&self.trusted_dir);
        for cert in Self::load_certs(&self.general_dir) {
            if ctx.buddy_keys.iter().any(|id| cert_data(&cert).matches_id(id)) {
                certs.push(cert);
            }
        }

        let mut saw_signature = false;
        for packet in pile.descendants() {
            let openpgp::Packet::Signature(sig) = packet else {
                continue;
            };
            saw_signature = true;
            for cert in &certs {
                for key in cert.keys().with_policy(&self.policy, None) {
                    if key.for_signing() && sig.verify_message(key.key(), &message).is_ok() {
                        info!("good signature on {} ({})", ctx.file.display(), ctx.short_desc);
                        return Ok(Verdict::Valid);
                    }
                }
            }
        }

        if !saw_signature {
            return Err(Error::KeyringFailed(format!(
                "{} contains no signature packet",
                sig_path.display()
            )));
        }
        if certs.is_empty() {
            debug!("no candidate key for {}, indeterminate", ctx.file.display());
            return Ok(Verdict::Indeterminate);
        }
        warn!("signature on {} did not verify", ctx.file.display());
        Ok(Verdict::Invalid)
    }
}

/// Scripted keyring for tests and embedders' test harnesses
///
/// Verification always returns the configured verdict; imports are
/// recorded so assertions can inspect them.
pub struct StubKeyRing {
    verdict: Verdict,
    trusted: Mutex<BTreeMap<String, PublicKeyData>>,
    general: Mutex<BTreeMap<String, PublicKeyData>>,
    imports: Mutex<Vec<(String, bool)>>,
}

impl StubKeyRing {
    pub fn with_verdict(verdict: Verdict) -> Self {
        Self {
            verdict,
            trusted: Mutex::new(BTreeMap::new()),
            general: Mutex::new(BTreeMap::new()),
            imports: Mutex::new(Vec::new()),
        }
    }

    /// A keyring that vouches for everything
    pub fn accepting() -> Self {
        Self::with_verdict(Verdict::Valid)
    }

    /// A keyring that rejects everything
    pub fn rejecting() -> Self {
        Self::with_verdict(Verdict::Invalid)
    }

    /// Preload a key into one of the scripted keyrings
    pub fn preload(&self, data: PublicKeyData, trusted: bool) {
        let map = if trusted { &self.trusted } else { &self.general };
        map.lock().unwrap().insert(data.id.clone(), data);
    }

    /// Fingerprints imported so far, with their trust flag
    pub fn imports(&self) -> Vec<(String, bool)> {
        self.imports.lock().unwrap().clone()
    }
}

impl KeyRing for StubKeyRing {
    fn import_key(&self, key: &PublicKey, trusted: bool) -> Result<()> {
        let data = key.data();
        self.imports
            .lock()
            .unwrap()
            .push((data.fingerprint.clone(), trusted));
        let map = if trusted { &self.trusted } else { &self.general };
        map.lock().unwrap().insert(data.id.clone(), data);
        Ok(())
    }

    fn trusted_public_key_data(&self, id: &str) -> Option<PublicKeyData> {
        self.trusted
            .lock()
            .unwrap()
            .values()
            .find(|d| d.matches_id(id))
            .cloned()
    }

    fn public_key_data(&self, id: &str) -> Option<PublicKeyData> {
        self.general
            .lock()
            .unwrap()
            .values()
            .find(|d| d.matches_id(id))
            .cloned()
    }

    fn verify_file_signature(&self, _ctx: &VerifyContext) -> Result<Verdict> {
        Ok(self.verdict)
    }
}
