//! Encoding and decoding of Tor's cell and relay-cell wire formats.
//!
//! [`chancell`] covers the 514-byte fixed link cells and the handful of
//! variable-length ones (VERSIONS/CERTS/AUTH_CHALLENGE/AUTHENTICATE).
//! [`relaycell`] covers the interpreted RELAY/RELAY_EARLY payload: the
//! relay-command/stream-id/digest/length header and the per-command message
//! bodies (BEGIN, DATA, END, …).
//!
//! This crate only knows about bytes; it has no opinion about which hop a
//! cell is destined for or what cipher state protects it — that's
//! `tor-proto`'s job.

pub mod chancell;
mod err;
pub mod relaycell;

pub use err::Error;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
