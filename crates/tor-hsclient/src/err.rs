//! The error type for this crate.

use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

/// An error connecting to a v3 onion service (spec.md §4.7, §7).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The `.onion` address could not be parsed.
    #[error("invalid onion address: {0}")]
    AddressInvalid(#[from] tor_hscrypto::Error),

    /// No HSDir in the consensus was close enough (or the HSDir set was
    /// empty) to fetch a descriptor from.
    #[error("no usable HSDir found")]
    NoHsDir,

    /// Every HSDir we tried returned 404 or an unparseable/unverifiable
    /// body, for every replica (spec.md §7 `DescriptorInvalid`).
    #[error("descriptor fetch or verification failed: {0}")]
    DescriptorInvalid(&'static str),

    /// The descriptor we fetched lists no introduction points.
    #[error("descriptor has no introduction points")]
    NoIntroPoints,

    /// The chosen introduction point did not relay our introduction
    /// (spec.md §7 `IntroFailed`).
    #[error("introduction failed: {0}")]
    IntroFailed(&'static str),

    /// The rendezvous point never delivered RENDEZVOUS2 in time, or the
    /// service's half of hs-ntor did not verify (spec.md §7
    /// `RendezvousTimeout`).
    #[error("rendezvous failed: {0}")]
    RendezvousTimeout(&'static str),

    /// Every attempt across distinct intro points/rendezvous relays failed
    /// (spec.md §4.7 "up to 3 attempts").
    #[error("onion-service connection failed after {0} attempts")]
    AttemptsExhausted(u32),

    /// The directory collaborator failed, or returned a consensus/relay set
    /// we couldn't use.
    #[error("directory error: {0}")]
    Dir(#[from] tor_netdir::Error),

    /// A link, circuit, or stream operation failed.
    #[error("protocol error: {0}")]
    Proto(#[from] tor_proto::Error),

    /// Building or obtaining a circuit failed.
    #[error("circuit error: {0}")]
    Circ(#[from] tor_circmgr::Error),

    /// A wire-format field in a descriptor or link specifier was malformed.
    #[error("malformed descriptor field: {0}")]
    Bytes(#[from] tor_bytes::Error),

    /// An invariant that should never be violated was violated anyway.
    #[error("internal error: {0}")]
    Internal(#[from] tor_error::InternalError),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            AddressInvalid(e) => e.kind(),
            NoHsDir | DescriptorInvalid(_) | NoIntroPoints => ErrorKind::OnionServiceProtocolViolation,
            IntroFailed(_) => ErrorKind::OnionServiceConnectionFailed,
            RendezvousTimeout(_) => ErrorKind::TorNetworkTimeout,
            AttemptsExhausted(_) => ErrorKind::OnionServiceConnectionFailed,
            Dir(e) => e.kind(),
            Proto(e) => e.kind(),
            Circ(e) => e.kind(),
            Bytes(_) => ErrorKind::OnionServiceProtocolViolation,
            Internal(e) => e.kind(),
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
