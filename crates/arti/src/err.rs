//! The error type for this crate's own code (config and directory-snapshot
//! loading). Everything downstream of a built [`arti_client::TorClient`]
//! is reported as `anyhow::Error` straight to [`tor_error::report_and_exit`],
//! the teacher's top-level convention.

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

/// An error loading this binary's own configuration or directory snapshot.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The config file (or directory-snapshot file it points at) couldn't
    /// be read from disk.
    #[error("could not read {path}: {source}")]
    Io {
        /// The path that couldn't be read.
        path: String,
        /// The underlying IO failure.
        #[source]
        source: Arc<io::Error>,
    },

    /// The config file wasn't valid TOML, or didn't match the expected
    /// shape.
    #[error("could not parse {path}: {source}")]
    Toml {
        /// The path that failed to parse.
        path: String,
        /// The underlying parse failure.
        #[source]
        source: Arc<toml::de::Error>,
    },

    /// A value in the config file failed this binary's own validation
    /// (distinct from [`arti_client::TorClientConfig::validate`], which is
    /// called separately).
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A relay entry in the directory-snapshot file was malformed (bad hex,
    /// wrong length, unparseable exit policy).
    #[error("malformed directory snapshot: {0}")]
    DirSnapshot(String),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Io { .. } => ErrorKind::PersistentStateAccessFailed,
            Error::Toml { .. } | Error::ConfigInvalid(_) | Error::DirSnapshot(_) => {
                ErrorKind::InvalidConfig
            }
        }
    }
}

/// Result type used throughout this crate's own modules.
pub type Result<T> = std::result::Result<T, Error>;
