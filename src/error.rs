//! Crate-wide error type.
//!
//! Expected conditions (a missing key, a user transaction body returning an
//! error) are ordinary `Result` values. Corruption conditions (a key that
//! doesn't parse, an entry too large to encode) are fatal to the operation
//! that hit them, but are still plain `Error` variants rather than panics, so
//! callers embedding this crate can log and recover at their own boundary.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The LSM substrate has no entry for the requested key.
    #[error("key not found")]
    KeyNotFound,

    /// Record encode/decode failed in the external codec.
    #[error("codec error: {0}")]
    Codec(String),

    /// A stored key could not be parsed back into its logical tuple.
    #[error("malformed key: {0:?}")]
    MalformedKey(String),

    /// A key or value exceeded the 65535-byte block entry limit.
    #[error("entry too large: {len} bytes (max {max})")]
    EntryTooLarge { len: usize, max: usize },

    /// The closure passed to `Store::tx` returned an error; the transaction
    /// was rolled back before this error was propagated.
    #[error("transaction aborted by caller: {0}")]
    UserAborted(String),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest corrupt: {0}")]
    Manifest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io { path: None, source }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Codec(err.to_string())
    }
}

impl Error {
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: Some(path.into()), source }
    }
}
