//! Internal: the `Error` type for `tor-guardmgr`.

use std::io;
use std::sync::Arc;

use tor_error::{ErrorKind, HasKind};

/// An error arising while choosing or persisting a guard.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The consensus has no relay flagged `Guard` to sample from.
    #[error("no usable guard relay in the current directory")]
    NoGuardsAvailable,

    /// Every entry in the guard set is currently `Filtered` (demoted) and
    /// none may be tried yet.
    #[error("all guards are currently filtered out")]
    AllGuardsFiltered,

    /// The on-disk guard-state file (`state/guards`) could not be read or
    /// written.
    #[error("could not access persistent guard state: {0}")]
    StateIo(#[source] Arc<io::Error>),

    /// A line in the guard-state file was not in the expected
    /// `FINGERPRINT STATE LAST_TRIED_UNIX` format.
    #[error("malformed guard-state line: {0}")]
    StateCorrupted(String),

    /// The guard-state directory failed its permission check, or couldn't
    /// be created securely.
    #[error("guard-state directory is not trustworthy: {0}")]
    StateDirUntrusted(#[source] Arc<fs_mistrust::Error>),

    /// Couldn't acquire the exclusive lock on the guard-state directory.
    #[error("could not lock persistent guard state: {0}")]
    StateLock(#[source] Arc<io::Error>),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::StateIo(Arc::new(e))
    }
}

impl From<fs_mistrust::Error> for Error {
    fn from(e: fs_mistrust::Error) -> Self {
        Error::StateDirUntrusted(Arc::new(e))
    }
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::NoGuardsAvailable | Error::AllGuardsFiltered => ErrorKind::NoPath,
            Error::StateIo(_) | Error::StateLock(_) => ErrorKind::PersistentStateAccessFailed,
            Error::StateCorrupted(_) => ErrorKind::PersistentStateCorrupted,
            Error::StateDirUntrusted(_) => ErrorKind::FsPermissions,
        }
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
