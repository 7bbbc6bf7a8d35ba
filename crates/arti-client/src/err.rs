//! The error type for this crate.

use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

/// An error using the high-level client facade (spec.md §7).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// [`crate::config::TorClientConfig::validate`] rejected the
    /// configuration before a [`crate::TorClient`] was ever built.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(&'static str),

    /// The target was a `.onion` address, but connecting to onion services
    /// requires an [`crate::HsClient`] plan the caller didn't wire in via
    /// [`crate::TorClientConfig`].
    #[error("onion-service support not configured")]
    OnionServiceNotConfigured,

    /// `addr` could not be parsed as a connectable target at all.
    #[error("invalid target address: {0}")]
    InvalidAddress(#[from] crate::addr::TorAddrError),

    /// Connecting to a v3 onion service failed.
    #[error("onion-service connection failed: {0}")]
    Hs(#[from] tor_hsclient::Error),

    /// Obtaining or building an exit circuit failed.
    #[error("circuit error: {0}")]
    Circ(#[from] tor_circmgr::Error),

    /// A stream-level protocol error occurred on an otherwise-good circuit.
    #[error("protocol error: {0}")]
    Proto(#[from] tor_proto::Error),

    /// The guard manager failed to select or persist a guard.
    #[error("guard error: {0}")]
    Guard(#[from] tor_guardmgr::Error),

    /// An invariant that should never be violated was violated anyway.
    #[error("internal error: {0}")]
    Internal(#[from] tor_error::InternalError),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            ConfigInvalid(_) => ErrorKind::InvalidConfig,
            OnionServiceNotConfigured => ErrorKind::FeatureDisabled,
            InvalidAddress(_) => ErrorKind::InvalidConfig,
            Hs(e) => e.kind(),
            Circ(e) => e.kind(),
            Proto(e) => e.kind(),
            Guard(e) => e.kind(),
            Internal(e) => e.kind(),
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
