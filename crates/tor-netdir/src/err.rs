//! Error types for directory/consensus handling.

use tor_error::{ErrorKind, HasKind};

/// An error arising while building or consulting a network directory.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The consensus is not currently usable (expired, or not yet valid).
    #[error("directory is not live")]
    NotLive,

    /// No relay could be found satisfying the requested constraints.
    #[error("no relay matches the requested constraints")]
    NoRelay,

    /// A malformed exit policy string was encountered.
    #[error("invalid exit policy string")]
    InvalidPolicy,

    /// The underlying directory provider failed to supply a consensus or
    /// descriptor.
    #[error("directory provider failed: {0}")]
    DirProviderFailed(String),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::NotLive => ErrorKind::DirectoryExpired,
            Error::NoRelay => ErrorKind::NoPath,
            Error::InvalidPolicy => ErrorKind::BadApiUsage,
            Error::DirProviderFailed(_) => ErrorKind::TorDirectoryError,
        }
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
