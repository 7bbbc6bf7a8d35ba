//! The error type for this crate.

use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

/// An error encountered while parsing or encoding a SOCKS message.
#[derive(Error, Clone, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The connection did not begin with a SOCKS5 version byte.
    ///
    /// The payload is the byte we actually got, so that a caller can
    /// distinguish "this looks like SOCKS4" from "this looks like an HTTP
    /// request landed on our SOCKS port".
    #[error("not a SOCKS5 version byte: {0:#x}")]
    BadProtocol(u8),

    /// The client offered no acceptable authentication method.
    #[error("no acceptable SOCKS authentication method offered")]
    NoSupportedMethod,

    /// A SOCKS address, hostname, or other wire field failed to parse.
    #[error("malformed SOCKS field: {0}")]
    Bytes(#[from] tor_bytes::Error),

    /// A hostname was too long to encode in a SOCKS message.
    #[error("hostname too long for SOCKS (must fit in one byte's length)")]
    HostnameTooLong,

    /// A message was malformed in some other way.
    #[error("malformed SOCKS message: {0}")]
    Malformed(&'static str),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(#[from] tor_error::InternalError),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            BadProtocol(_) | NoSupportedMethod | Bytes(_) | HostnameTooLong | Malformed(_) => {
                ErrorKind::LocalProtocolViolation
            }
            Internal(e) => e.kind(),
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A marker returned by [`crate::SocksProxyHandshake::handshake`] when the
/// caller needs to read more bytes before the handshake can make progress.
///
/// This is not a real error: it just isn't an [`Error`], since the caller
/// needs to tell the two cases apart (truncated vs. malformed) to decide
/// whether to keep reading or give up.
#[derive(Clone, Copy, Debug)]
pub struct Truncated;
