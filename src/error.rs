//! Crate-wide error type.
//!
//! Every failure is fatal to the current invocation and carries a message
//! naming the offending path, key, or package. There is no retry at this
//! layer.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Manifest shape error: type mismatch, unknown key, mutually
    /// exclusive flags, escape from root.
    #[error("{0}")]
    Manifest(String),

    /// Source discovery error: empty file set, disallowed filename,
    /// unrecognized file kind, oversized license.
    #[error("{0}")]
    Sources(String),

    /// Registry protocol error, including an `error` field returned by
    /// the server (surfaced verbatim).
    #[error("{0}")]
    Registry(String),

    /// Transport failure talking to the registry or downloading archives.
    #[error("request to '{url}' failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Downloaded archive does not match the registry-supplied digest.
    #[error("md5 does not match for package '{package}'")]
    Md5Mismatch { package: String },

    #[error("cannot {action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot unpack '{path}': {message}")]
    Archive { path: PathBuf, message: String },

    #[error("cannot get user's home directory ({0})")]
    MissingHome(&'static str),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for path-carrying I/O errors.
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
