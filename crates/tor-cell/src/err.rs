//! Internal: the `Error` type for `tor-cell`.

use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

/// An error encountered while encoding or decoding a cell.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A fixed or variable-length cell was malformed: a length field
    /// mismatched the bytes present, a payload exceeded its maximum size,
    /// or a structure's own invariant was violated.
    #[error("malformed cell: {0}")]
    MalformedCell(&'static str),
    /// An underlying `tor-bytes` parse failed while decoding a cell body.
    #[error("error parsing {parsed}: {err}")]
    BytesErr {
        /// What we were trying to parse.
        parsed: &'static str,
        /// The underlying error.
        #[source]
        err: tor_bytes::Error,
    },
    /// We were asked to encode something that can't fit the wire format
    /// (for example, an EXTEND2 body too long for its length field).
    #[error("cannot encode: {0}")]
    CantEncode(&'static str),
}

impl From<tor_bytes::Error> for Error {
    fn from(err: tor_bytes::Error) -> Self {
        Error::BytesErr {
            parsed: "cell",
            err,
        }
    }
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedCell(_) | Error::BytesErr { .. } => ErrorKind::TorProtocolViolation,
            Error::CantEncode(_) => ErrorKind::Internal,
        }
    }
}
