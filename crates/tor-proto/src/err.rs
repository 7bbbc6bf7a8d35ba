//! Internal: the `Error` type for `tor-proto` (spec.md §7's failure modes
//! for the link connection, circuit build, and stream layers).

use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

/// An error arising from the link connection, circuit, or stream layers.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A local I/O error talking to the relay (socket, TLS).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS negotiation with the relay failed.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// A cell failed to encode or decode.
    #[error("cell error: {0}")]
    Cell(#[from] tor_cell::Error),

    /// A wire-format object failed to encode or decode.
    #[error("encoding error: {0}")]
    Bytes(#[from] tor_bytes::Error),

    /// The peer violated the link protocol during the VERSIONS/NETINFO
    /// handshake (spec.md §4.3).
    #[error("link protocol violation: {0}")]
    LinkProtocolViolation(&'static str),

    /// We and the relay share no usable link protocol version.
    #[error("no shared link protocol version")]
    NoSharedLinkProtocol,

    /// The link connection (or a circuit on it) closed before an operation
    /// completed.
    #[error("channel closed")]
    ChannelClosed,

    /// The ntor handshake's server reply failed to authenticate (spec.md
    /// §4.4 `AuthFailure`).
    #[error("handshake authentication failed")]
    AuthFailure,

    /// A circuit build step did not complete in time (spec.md §4.4
    /// `HandshakeTimeout`).
    #[error("circuit build timed out")]
    HandshakeTimeout,

    /// We received a relay cell whose Recognized/Digest fields didn't match
    /// any hop's running digest (spec.md §4.4 "Recognized cell").
    #[error("relay cell not recognized at any hop")]
    UnrecognizedCell,

    /// The circuit received a DESTROY cell from the network.
    #[error("circuit destroyed by peer: {0:?}")]
    CircuitDestroyed(tor_cell::chancell::msg::DestroyReason),

    /// A circuit-level operation was attempted on a circuit that is not, or
    /// is no longer, open.
    #[error("circuit not open")]
    CircuitClosed,

    /// We ran out of usable circuit IDs on this channel.
    #[error("no circuit IDs available")]
    IdRangeFull,

    /// We ran out of usable stream IDs on this circuit.
    #[error("no stream IDs available")]
    StreamIdRangeFull,

    /// A stream-level operation was attempted on a stream that is closed.
    #[error("stream not open")]
    StreamClosed,

    /// The exit ended the stream instead of completing the requested
    /// operation (spec.md §4.5's END-reason-to-SOCKS-code mapping happens
    /// one layer up, in the orchestrator).
    #[error("stream ended by exit: {0:?}")]
    StreamEnded(tor_cell::relaycell::msg::EndReason),

    /// An invariant that should never be violated was violated anyway.
    #[error("internal error: {0}")]
    Internal(#[from] tor_error::InternalError),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            Io(_) | Tls(_) => ErrorKind::LocalNetworkError,
            Cell(e) => e.kind(),
            Bytes(_) => ErrorKind::TorProtocolViolation,
            LinkProtocolViolation(_) | UnrecognizedCell => ErrorKind::TorProtocolViolation,
            NoSharedLinkProtocol => ErrorKind::TorProtocolViolation,
            ChannelClosed | CircuitClosed | StreamClosed => ErrorKind::CircuitCollapse,
            StreamEnded(reason) => end_reason_kind(*reason),
            AuthFailure => ErrorKind::RelayIdMismatch,
            HandshakeTimeout => ErrorKind::TorNetworkTimeout,
            CircuitDestroyed(_) => ErrorKind::CircuitCollapse,
            IdRangeFull | StreamIdRangeFull => ErrorKind::LocalResourceExhausted,
            Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Map an `END` reason byte to the closest `tor-error` kind (spec.md §4.5's
/// reason-to-SOCKS-code table, one layer removed: the orchestrator does the
/// final reason-to-SOCKS-code translation, but every caller in between wants
/// a `HasKind` to log and retry against).
fn end_reason_kind(reason: tor_cell::relaycell::msg::EndReason) -> ErrorKind {
    use tor_cell::relaycell::msg::EndReason as R;
    match reason {
        R::MISC => ErrorKind::RemoteStreamError,
        R::RESOLVEFAILED => ErrorKind::RemoteHostNotFound,
        R::CONNECTREFUSED => ErrorKind::RemoteConnectionRefused,
        R::EXITPOLICY => ErrorKind::ExitPolicyRejected,
        R::DESTROY => ErrorKind::CircuitCollapse,
        R::DONE => ErrorKind::RemoteStreamClosed,
        R::TIMEOUT => ErrorKind::ExitTimeout,
        R::NOROUTE | R::HIBERNATING | R::RESOURCELIMIT => ErrorKind::RemoteNetworkFailed,
        R::CONNRESET => ErrorKind::RemoteStreamReset,
        R::TORPROTOCOL | R::NOTDIRECTORY => ErrorKind::TorProtocolViolation,
        R::INTERNAL => ErrorKind::RemoteStreamError,
        _ => ErrorKind::RemoteStreamError,
    }
}
