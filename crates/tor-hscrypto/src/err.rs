//! Internal: the `Error` type for `tor-hscrypto`.

use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

/// An error in onion-service cryptography: a malformed address, a
/// descriptor that doesn't verify, or similar.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A `.onion` address was not 56 base32 characters, or its version byte
    /// was not 3.
    #[error("invalid onion address: {0}")]
    InvalidOnionAddress(&'static str),
    /// A `.onion` address's checksum did not match its public key and
    /// version byte.
    #[error("onion address checksum mismatch")]
    ChecksumMismatch,
    /// A descriptor's signing-key certificate did not verify under the
    /// blinded identity key for the time period it claims.
    #[error("descriptor signing-key certificate does not verify")]
    BadSigningKeyCert,
    /// A descriptor's body did not verify under its own signing key.
    #[error("descriptor signature does not verify")]
    BadDescriptorSignature,
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidOnionAddress(_) | Error::ChecksumMismatch => {
                ErrorKind::OnionServiceAddressInvalid
            }
            Error::BadSigningKeyCert | Error::BadDescriptorSignature => {
                ErrorKind::OnionServiceProtocolViolation
            }
        }
    }
}
