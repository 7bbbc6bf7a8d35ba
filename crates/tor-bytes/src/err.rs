//! Internal: the `Error` type for `tor-bytes`.

use thiserror::Error;

/// An error encountered while decoding or encoding a Tor wire-format object.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// We tried to read more bytes than were available.
    #[error("tried to read past the end of the input")]
    Truncated,
    /// A length field in the input didn't match the number of bytes that
    /// followed it.
    #[error("length field did not match the number of bytes present")]
    BadLengthField,
    /// We parsed a structure, but it didn't satisfy some invariant of the
    /// type (for example, a version number we don't recognize).
    #[error("invalid object: {0}")]
    BadMessage(&'static str),
    /// After parsing a structure, there were more bytes left over than the
    /// format allows.
    #[error("extra bytes at end of input")]
    ExtraneousBytes,
    /// We tried to write an object whose length cannot be represented in the
    /// wire format's length field.
    #[error("object too large to encode: {0}")]
    Oversized(&'static str),
}
