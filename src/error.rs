// src/error.rs

//! Error types shared across quarry
//!
//! One flat enum; kinds map onto CLI exit codes via [`Error::exit_code`].

use thiserror::Error;

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the repository manager
#[derive(Error, Debug)]
pub enum Error {
    /// Probing could not identify the repository type
    #[error("cannot determine type of repository '{alias}' at {url}")]
    RepoUnknownType { alias: String, url: String },

    /// `load_from_cache` was called without a prior successful build
    #[error("repository '{0}' is not cached")]
    RepoNotCached(String),

    /// Alias collision in the registry
    #[error("'{0}' already exists")]
    AlreadyExists(String),

    /// Registry lookup miss
    #[error("'{0}' not found")]
    NotFound(String),

    /// Master index signature did not verify and the check is mandatory
    #[error("signature check failed for '{alias}': {reason}")]
    SignatureCheckFailed { alias: String, reason: String },

    /// A configured verification plugin rejected the metadata
    #[error("repository verification plugin rejected '{alias}': {reason}")]
    PluginVerifyFailed { alias: String, reason: String },

    /// The media provider failed to deliver a non-optional file
    #[error("transport failed for {url}: {reason}")]
    TransportFailed { url: String, reason: String },

    /// The remote side could not be reached; cached data may still be usable
    #[error("remote side not available: {0}")]
    RemoteUnavailable(String),

    /// Cookie mismatch or unreadable solv file
    #[error("cache for '{alias}' is corrupted: {reason}")]
    CacheCorrupted { alias: String, reason: String },

    /// Another process holds the metadata or build lock
    #[error("another process holds the lock at {0}")]
    LockContention(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid alias '{0}'")]
    InvalidAlias(String),

    #[error("I/O error: {0}")]
    IoFailed(String),

    #[error("parse error: {0}")]
    ParseFailed(String),

    #[error("keyring error: {0}")]
    KeyringFailed(String),

    /// A service plugin or remote index could not be expanded
    #[error("service '{alias}' failed: {reason}")]
    ServiceFailed { alias: String, reason: String },
}

impl Error {
    /// Exit code for the CLI surface
    ///
    /// 0 is reserved for success, 1 is the generic failure; the remaining
    /// codes distinguish the failures callers are expected to branch on.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::SignatureCheckFailed { .. } | Error::PluginVerifyFailed { .. } => 2,
            Error::RepoUnknownType { .. } => 3,
            Error::LockContention(_) => 4,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoFailed(e.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::IoFailed(format!("solv database: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let sig = Error::SignatureCheckFailed {
            alias: "a".into(),
            reason: "bad".into(),
        };
        assert_eq!(sig.exit_code(), 2);

        let unknown = Error::RepoUnknownType {
            alias: "a".into(),
            url: "dir:/nowhere".into(),
        };
        assert_eq!(unknown.exit_code(), 3);

        assert_eq!(Error::LockContention("/tmp/l".into()).exit_code(), 4);
        assert_eq!(Error::NotFound("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::IoFailed(_)));
    }
}
