//! Link-level ("channel") cells: the 514-byte fixed frame and the handful of
//! variable-length cells used only during the link handshake.

pub mod codec;
pub mod msg;

use std::num::NonZeroU32;

use caret::caret_int;

/// The amount of payload data in a fixed-length cell.
///
/// Cells are 514 bytes on the wire (4-byte CircID + 1-byte Command + this),
/// now that link protocol ≥ 4 uses 4-byte circuit IDs.
pub const CELL_DATA_LEN: usize = 509;

/// The total length in bytes of a fixed-length cell.
pub const CELL_LEN: usize = 4 + 1 + CELL_DATA_LEN;

/// A cell body, as a fixed-size byte array.
pub type RawCellBody = [u8; CELL_DATA_LEN];

/// A cell body, boxed up so that copying a [`msg::Relay`](crate::chancell::msg::Relay)
/// around doesn't copy 509 bytes by value.
pub type BoxedCellBody = Box<RawCellBody>;

/// Channel-local identifier for a circuit; zero means "no circuit".
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct CircId(NonZeroU32);

impl CircId {
    /// Wrap a nonzero `u32` as a `CircId`.
    pub fn new(val: u32) -> Option<Self> {
        NonZeroU32::new(val).map(CircId)
    }
    /// Return the numeric value, or 0 for `None`.
    pub fn get_or_zero(id: Option<Self>) -> u32 {
        id.map(|c| c.0.get()).unwrap_or(0)
    }
    /// Return true if this ID has the high bit set, as client-originated
    /// circuit IDs must.
    pub fn is_client_originated(self) -> bool {
        self.0.get() & 0x8000_0000 != 0
    }
}
impl From<CircId> for u32 {
    fn from(id: CircId) -> u32 {
        id.0.get()
    }
}
impl std::fmt::Display for CircId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

caret_int! {
    /// The command byte of a channel cell; determines both its meaning and
    /// whether it uses the fixed or variable-length frame.
    pub struct ChanCmd(u8) {
        /// Padding; always dropped.
        PADDING = 0,
        /// Obsolete circuit-creation cell; not used by this core.
        CREATE = 1,
        /// Obsolete circuit-creation reply; not used by this core.
        CREATED = 2,
        /// A relay cell, carrying an onion-encrypted RELAY body.
        RELAY = 3,
        /// Tear down a circuit.
        DESTROY = 4,
        /// Obsolete no-pubkey circuit creation; interop test vectors only.
        CREATE_FAST = 5,
        /// Obsolete no-pubkey circuit-creation reply.
        CREATED_FAST = 6,
        /// Finish the link handshake with address/time info.
        NETINFO = 8,
        /// A relay cell sent on the first few hops of a new circuit, where
        /// only CREATE2/EXTEND2 payloads are allowed (anti early-cell abuse).
        RELAY_EARLY = 9,
        /// Current circuit-creation cell (ntor).
        CREATE2 = 10,
        /// Current circuit-creation reply (ntor).
        CREATED2 = 11,
        /// Adjust channel padding settings; accepted and ignored.
        PADDING_NEGOTIATE = 12,

        /// Negotiate the link protocol version. Variable-length despite its
        /// low command number (historical wart).
        VERSIONS = 7,
        /// Variable-length padding.
        VPADDING = 128,
        /// Additional link certificates.
        CERTS = 129,
        /// Challenge material for relay-to-relay auth (unused by a client).
        AUTH_CHALLENGE = 130,
        /// Response material for relay-to-relay auth (unused by a client).
        AUTHENTICATE = 131,
    }
}

impl ChanCmd {
    /// Return true if this command uses the variable-length frame.
    pub fn is_var_cell(self) -> bool {
        self == ChanCmd::VERSIONS || u8::from(self) >= 128
    }

    /// Return true if a cell with this command is allowed to carry the
    /// given (possibly absent) circuit ID.
    pub fn accepts_circid_val(self, id: Option<CircId>) -> bool {
        match self {
            ChanCmd::PADDING
            | ChanCmd::NETINFO
            | ChanCmd::PADDING_NEGOTIATE
            | ChanCmd::VERSIONS
            | ChanCmd::VPADDING
            | ChanCmd::CERTS
            | ChanCmd::AUTH_CHALLENGE
            | ChanCmd::AUTHENTICATE => id.is_none(),
            _ => id.is_some(),
        }
    }
}

/// Trait implemented by anything that can serve as the body of a channel
/// cell.
pub trait ChanMsg {
    /// Return this message's command.
    fn cmd(&self) -> ChanCmd;
    /// Encode the body (not the CircID/Command/length prefix) onto `w`.
    fn encode_onto<W: tor_bytes::Writer + ?Sized>(self, w: &mut W) -> tor_bytes::Result<()>;
    /// Decode a body of the given command from a reader truncated to the
    /// body's exact length.
    fn decode_from_reader(cmd: ChanCmd, r: &mut tor_bytes::Reader<'_>) -> tor_bytes::Result<Self>
    where
        Self: Sized;
}

/// A decoded channel cell: a circuit ID (or none, for link-wide messages)
/// plus a message body.
#[derive(Debug, Clone)]
pub struct ChanCell<M> {
    circid: Option<CircId>,
    msg: M,
}

impl<M: ChanMsg> ChanCell<M> {
    /// Construct a new cell.
    pub fn new(circid: Option<CircId>, msg: M) -> Self {
        ChanCell { circid, msg }
    }
    /// Return this cell's circuit ID.
    pub fn circid(&self) -> Option<CircId> {
        self.circid
    }
    /// Return a reference to this cell's message.
    pub fn msg(&self) -> &M {
        &self.msg
    }
    /// Consume the cell, returning its parts.
    pub fn into_circid_and_msg(self) -> (Option<CircId>, M) {
        (self.circid, self.msg)
    }
}

/// A channel cell carrying any recognized channel message.
pub type AnyChanCell = ChanCell<msg::AnyChanMsg>;
