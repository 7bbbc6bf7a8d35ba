//! Relay-cell framing: the interpreted RELAY/RELAY_EARLY payload.
//!
//! A relay cell body is always exactly 509 bytes, laid out as:
//! Relay-Command (1) || Recognized (2) || StreamID (2) || Digest (4) ||
//! Length (2) || Data (≤498) || Padding. This core only ever produces the
//! "legacy" layout (what the teacher calls `RelayCellFormat::V0`); the
//! newer packed/fragmented format introduced for Counter Galois Onion
//! encryption is out of scope (see DESIGN.md).
//!
//! This module only knows about the header and dispatches on command byte;
//! it has no opinion about *which hop* a cell belongs to, or how Recognized
//! and Digest are checked — that's `tor-proto`'s onion-layering job.

use std::num::NonZeroU16;

use crate::chancell::{BoxedCellBody, CELL_DATA_LEN};
use caret::caret_int;
use rand::{CryptoRng, Rng};
use tor_bytes::{EncodeResult, Reader, Result as BytesResult, Writer};

pub mod msg;

/// Byte offset of the 2-byte "Recognized" field within a relay cell body.
pub const RECOGNIZED_OFFSET: usize = 1;
/// Byte offset of the 2-byte StreamID field within a relay cell body.
pub const STREAM_ID_OFFSET: usize = 3;
/// Byte offset of the 4-byte Digest field within a relay cell body.
pub const DIGEST_OFFSET: usize = 5;
/// Byte offset of the 2-byte Length field within a relay cell body.
pub const LENGTH_OFFSET: usize = 9;
/// Byte offset at which the message body (Data) begins.
pub const HEADER_LEN: usize = 11;
/// The most payload bytes a single relay cell's Data field can hold.
pub const PAYLOAD_MAX_LEN: usize = CELL_DATA_LEN - HEADER_LEN;

caret_int! {
    /// A command that identifies the type of a relay cell.
    pub struct RelayCmd(u8) {
        /// Start a new stream.
        BEGIN = 1,
        /// Data on a stream.
        DATA = 2,
        /// Close a stream.
        END = 3,
        /// Acknowledge a BEGIN; stream is open.
        CONNECTED = 4,
        /// Flow control.
        SENDME = 5,
        /// Extend a circuit to a new hop; deprecated TAP form.
        EXTEND = 6,
        /// Reply to EXTEND; deprecated TAP form.
        EXTENDED = 7,
        /// Partially close a circuit.
        TRUNCATE = 8,
        /// Circuit has been partially closed.
        TRUNCATED = 9,
        /// Padding cell.
        DROP = 10,
        /// Start a DNS lookup.
        RESOLVE = 11,
        /// Reply to a DNS lookup.
        RESOLVED = 12,
        /// Start a directory stream.
        BEGIN_DIR = 13,
        /// Extend a circuit to a new hop.
        EXTEND2 = 14,
        /// Reply to an EXTEND2 cell.
        EXTENDED2 = 15,
        /// HS: establish an introduction point.
        ESTABLISH_INTRO = 32,
        /// HS: establish a rendezvous point.
        ESTABLISH_RENDEZVOUS = 33,
        /// HS: client to introduction point.
        INTRODUCE1 = 34,
        /// HS: introduction point to service.
        INTRODUCE2 = 35,
        /// HS: service to rendezvous point.
        RENDEZVOUS1 = 36,
        /// HS: rendezvous point to client.
        RENDEZVOUS2 = 37,
        /// HS: response to ESTABLISH_INTRO.
        INTRO_ESTABLISHED = 38,
        /// HS: response to ESTABLISH_RENDEZVOUS.
        RENDEZVOUS_ESTABLISHED = 39,
        /// HS: response to INTRODUCE1.
        INTRODUCE_ACK = 40,
    }
}

/// Whether a relay command requires a stream ID, requires none, or is
/// unconstrained (for an unrecognized command).
enum StreamIdReq {
    /// Must be sent with StreamID 0 (applies to the circuit as a whole).
    WantNone,
    /// Must be sent with a nonzero StreamID.
    WantSome,
    /// Unrecognized: either is accepted so we don't leak information by
    /// rejecting it.
    Any,
}

impl RelayCmd {
    /// Whether this command is sent with a stream ID.
    fn expects_streamid(self) -> StreamIdReq {
        use RelayCmd::*;
        match self {
            BEGIN | DATA | END | CONNECTED | RESOLVE | RESOLVED | BEGIN_DIR => {
                StreamIdReq::WantSome
            }
            EXTEND | EXTENDED | TRUNCATE | TRUNCATED | DROP | EXTEND2 | EXTENDED2
            | ESTABLISH_INTRO | ESTABLISH_RENDEZVOUS | INTRODUCE1 | INTRODUCE2 | RENDEZVOUS1
            | RENDEZVOUS2 | INTRO_ESTABLISHED | RENDEZVOUS_ESTABLISHED | INTRODUCE_ACK
            | SENDME => StreamIdReq::WantNone,
            _ => StreamIdReq::Any,
        }
    }

    /// Return true if this command is allowed to carry the given stream ID.
    pub fn accepts_streamid_val(self, id: Option<StreamId>) -> bool {
        match self.expects_streamid() {
            StreamIdReq::WantNone => id.is_none(),
            StreamIdReq::WantSome => id.is_some(),
            StreamIdReq::Any => true,
        }
    }
}

/// Identifies a single stream on a circuit. Local to the circuit; never
/// zero (use `Option<StreamId>` for "applies to the whole circuit").
#[derive(Copy, Clone, PartialEq, Eq, Ord, PartialOrd, Debug, Hash)]
pub struct StreamId(NonZeroU16);

impl StreamId {
    /// Build a `StreamId`, returning `None` for the value 0.
    pub fn new(id: u16) -> Option<Self> {
        NonZeroU16::new(id).map(Self)
    }
    /// Convert back to `u16`, mapping `None` to 0.
    pub fn get_or_zero(id: Option<Self>) -> u16 {
        id.map(|s| s.0.get()).unwrap_or(0)
    }
}
impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Trait implemented by every relay-cell message body.
pub trait RelayMsg: Sized {
    /// Return this message's command.
    fn cmd(&self) -> RelayCmd;
    /// Encode the message body (everything after Length) onto `w`.
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()>;
    /// Decode a body of the given command from a reader already truncated
    /// to the body's exact length.
    fn decode_from_reader(cmd: RelayCmd, r: &mut Reader<'_>) -> BytesResult<Self>;
}

/// A decoded relay message together with the (optional) stream it belongs
/// to.
#[derive(Debug, Clone)]
pub struct RelayMsgOuter<M> {
    /// `None` for circuit-level messages (e.g. a circuit SENDME).
    streamid: Option<StreamId>,
    /// The parsed message body.
    msg: M,
}

/// An `RelayMsgOuter` over the full recognized message set.
pub type AnyRelayMsgOuter = RelayMsgOuter<msg::AnyRelayMsg>;

impl<M: RelayMsg> RelayMsgOuter<M> {
    /// Construct a new relay message with an optional stream ID.
    pub fn new(streamid: Option<StreamId>, msg: M) -> Self {
        RelayMsgOuter { streamid, msg }
    }
    /// Return this message's command.
    pub fn cmd(&self) -> RelayCmd {
        self.msg.cmd()
    }
    /// Return the stream this message applies to, if any.
    pub fn stream_id(&self) -> Option<StreamId> {
        self.streamid
    }
    /// Return a reference to the underlying message.
    pub fn msg(&self) -> &M {
        &self.msg
    }
    /// Consume this wrapper, returning the underlying message.
    pub fn into_msg(self) -> M {
        self.msg
    }
    /// Consume this wrapper, returning its stream ID and message.
    pub fn into_streamid_and_msg(self) -> (Option<StreamId>, M) {
        (self.streamid, self.msg)
    }

    /// Encode this message into a 509-byte relay cell body.
    ///
    /// The Digest field is left zero: the circuit engine fills it in after
    /// updating the hop's running digest with this exact encoding. Unused
    /// trailing space past the message is filled with random bytes, as the
    /// reference implementation does, so that cell lengths don't leak
    /// information about padding.
    pub fn encode<R: Rng + CryptoRng>(self, rng: &mut R) -> crate::Result<BoxedCellBody> {
        let cmd = self.msg.cmd();
        if !cmd.accepts_streamid_val(self.streamid) {
            return Err(crate::Error::CantEncode("wrong stream ID for relay command"));
        }
        let mut body = Box::new([0_u8; CELL_DATA_LEN]);
        let mut w: Vec<u8> = Vec::with_capacity(CELL_DATA_LEN);
        w.write_u8(cmd.into());
        w.write_u16(0); // Recognized
        w.write_u16(StreamId::get_or_zero(self.streamid));
        w.write_u32(0); // Digest, filled in later
        w.write_u16(0); // Length placeholder
        self.msg.encode_onto(&mut w)?;
        let payload_len = w.len() - HEADER_LEN;
        if payload_len > PAYLOAD_MAX_LEN {
            return Err(crate::Error::CantEncode("relay message too long for one cell"));
        }
        w[LENGTH_OFFSET..LENGTH_OFFSET + 2].copy_from_slice(&(payload_len as u16).to_be_bytes());
        body[..w.len()].copy_from_slice(&w);
        // Minimum gap before padding, matching the reference client's
        // convention of never padding right up against the payload.
        const MIN_SPACE_BEFORE_PADDING: usize = 4;
        if w.len() < CELL_DATA_LEN - MIN_SPACE_BEFORE_PADDING {
            rng.fill_bytes(&mut body[w.len() + MIN_SPACE_BEFORE_PADDING..]);
        }
        Ok(body)
    }

    /// Parse a relay cell body (already unwrapped from onion encryption and
    /// recognized at this hop) into a message.
    pub fn decode(body: &BoxedCellBody) -> crate::Result<Self> {
        let mut r = Reader::from_slice(body.as_ref());
        let cmd: RelayCmd = r.take_u8()?.into();
        r.advance(2)?; // Recognized, already checked by the caller
        let streamid = StreamId::new(r.take_u16()?);
        if !cmd.accepts_streamid_val(streamid) {
            return Err(crate::Error::MalformedCell("wrong stream ID for relay command"));
        }
        r.advance(4)?; // Digest, already checked by the caller
        let len = r.take_u16()? as usize;
        if len > r.remaining() {
            return Err(crate::Error::MalformedCell("relay Length field exceeds cell"));
        }
        let msg = r.take_into(len, |rr| Ok(M::decode_from_reader(cmd, rr)?))?;
        Ok(RelayMsgOuter { streamid, msg })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use msg::AnyRelayMsg;
    use rand::rngs::OsRng;

    #[test]
    fn begin_roundtrip() {
        let sid = StreamId::new(7).unwrap();
        let begin = msg::Begin::new("example.com", 80, 0).unwrap();
        let cell = AnyRelayMsgOuter::new(Some(sid), AnyRelayMsg::Begin(begin));
        let encoded = cell.encode(&mut OsRng).unwrap();
        let decoded = AnyRelayMsgOuter::decode(&encoded).unwrap();
        assert_eq!(decoded.stream_id(), Some(sid));
        assert_eq!(decoded.cmd(), RelayCmd::BEGIN);
    }

    #[test]
    fn data_max_len() {
        assert_eq!(PAYLOAD_MAX_LEN, 498);
    }
}
