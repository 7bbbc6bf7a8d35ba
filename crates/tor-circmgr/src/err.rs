//! The error type for this crate.

use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

/// An error building a path or obtaining a usable circuit.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No valid three-relay combination could be sampled (spec.md §4.6:
    /// "Fail with `NoPath` if after 10 sampling attempts no valid triple is
    /// found").
    #[error("no usable path could be built")]
    NoPath,

    /// The circuit pool could not produce a usable circuit after repeated
    /// attempts (spec.md §4.9: "return `NoCircuitAvailable` if build fails
    /// 3x within 30 s").
    #[error("no circuit available")]
    NoCircuitAvailable,

    /// The guard manager could not select a guard.
    #[error("guard selection failed: {0}")]
    Guard(#[from] tor_guardmgr::Error),

    /// The directory collaborator failed, or returned a consensus we
    /// couldn't use.
    #[error("directory error: {0}")]
    Dir(#[from] tor_netdir::Error),

    /// A link, circuit, or stream operation failed.
    #[error("protocol error: {0}")]
    Proto(#[from] tor_proto::Error),

    /// An invariant that should never be violated was violated anyway.
    #[error("internal error: {0}")]
    Internal(#[from] tor_error::InternalError),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            NoPath | NoCircuitAvailable => ErrorKind::NoPath,
            Guard(e) => e.kind(),
            Dir(e) => e.kind(),
            Proto(e) => e.kind(),
            Internal(e) => e.kind(),
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
