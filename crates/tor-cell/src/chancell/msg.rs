//! The messages that can appear as the body of a channel cell.

use std::net::{IpAddr, Ipv4Addr};

use caret::caret_int;
use tor_bytes::{Error as BytesError, Readable, Reader, Result as BytesResult, Writer};

use super::{BoxedCellBody, ChanCmd, ChanMsg, CELL_DATA_LEN};

/// A message body that can appear inside a channel cell.
///
/// This is a narrower trait than [`ChanMsg`]: it only knows how to read and
/// write its own body, not which command it goes with. [`ChanMsg`] is
/// implemented once, for [`AnyChanMsg`], by dispatching on the command byte.
pub trait Body: Readable {
    /// Decode a body from a reader that has already been truncated to the
    /// body's exact length.
    fn decode_from_reader(r: &mut Reader<'_>) -> BytesResult<Self> {
        r.extract()
    }
    /// Encode this body (and nothing else) onto `w`.
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> BytesResult<()>;
}

/// A decoded channel message: the body of a cell received on, or to be sent
/// on, a channel.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum AnyChanMsg {
    /// Fixed-length padding; always dropped.
    Padding(Padding),
    /// Variable-length padding; always dropped.
    Vpadding(Vpadding),
    /// Create a circuit using the current (ntor) handshake.
    Create2(Create2),
    /// Reply to a [`Create2`].
    Created2(Created2),
    /// A relay cell.
    Relay(Relay),
    /// A relay cell sent on one of the first few hops of a circuit.
    RelayEarly(RelayEarly),
    /// Tear down a circuit.
    Destroy(Destroy),
    /// Finish channel negotiation with address and time information.
    Netinfo(Netinfo),
    /// Begin channel negotiation by announcing supported link versions.
    Versions(Versions),
    /// Adjust channel padding parameters; accepted and ignored by a client.
    PaddingNegotiate(PaddingNegotiate),
    /// Additional certificates exchanged outside of the TLS handshake.
    Certs(Certs),
    /// Challenge material sent by a responder during relay-to-relay auth.
    AuthChallenge(AuthChallenge),
    /// A cell whose command this core does not interpret.
    Unrecognized(Unrecognized),
}

impl ChanMsg for AnyChanMsg {
    fn cmd(&self) -> ChanCmd {
        use AnyChanMsg::*;
        match self {
            Padding(_) => ChanCmd::PADDING,
            Vpadding(_) => ChanCmd::VPADDING,
            Create2(_) => ChanCmd::CREATE2,
            Created2(_) => ChanCmd::CREATED2,
            Relay(_) => ChanCmd::RELAY,
            RelayEarly(_) => ChanCmd::RELAY_EARLY,
            Destroy(_) => ChanCmd::DESTROY,
            Netinfo(_) => ChanCmd::NETINFO,
            Versions(_) => ChanCmd::VERSIONS,
            PaddingNegotiate(_) => ChanCmd::PADDING_NEGOTIATE,
            Certs(_) => ChanCmd::CERTS,
            AuthChallenge(_) => ChanCmd::AUTH_CHALLENGE,
            Unrecognized(u) => u.cmd,
        }
    }

    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> BytesResult<()> {
        use AnyChanMsg::*;
        match self {
            Padding(b) => b.encode_onto(w),
            Vpadding(b) => b.encode_onto(w),
            Create2(b) => b.encode_onto(w),
            Created2(b) => b.encode_onto(w),
            Relay(b) => b.encode_onto(w),
            RelayEarly(b) => b.encode_onto(w),
            Destroy(b) => b.encode_onto(w),
            Netinfo(b) => b.encode_onto(w),
            Versions(b) => b.encode_onto(w),
            PaddingNegotiate(b) => b.encode_onto(w),
            Certs(b) => b.encode_onto(w),
            AuthChallenge(b) => b.encode_onto(w),
            Unrecognized(b) => b.encode_onto(w),
        }
    }

    fn decode_from_reader(cmd: ChanCmd, r: &mut Reader<'_>) -> BytesResult<Self> {
        use AnyChanMsg::*;
        Ok(match cmd {
            ChanCmd::PADDING => Padding(Body::decode_from_reader(r)?),
            ChanCmd::VPADDING => Vpadding(Body::decode_from_reader(r)?),
            ChanCmd::CREATE2 => Create2(Body::decode_from_reader(r)?),
            ChanCmd::CREATED2 => Created2(Body::decode_from_reader(r)?),
            ChanCmd::RELAY => Relay(Body::decode_from_reader(r)?),
            ChanCmd::RELAY_EARLY => RelayEarly(Body::decode_from_reader(r)?),
            ChanCmd::DESTROY => Destroy(Body::decode_from_reader(r)?),
            ChanCmd::NETINFO => Netinfo(Body::decode_from_reader(r)?),
            ChanCmd::VERSIONS => Versions(Body::decode_from_reader(r)?),
            ChanCmd::PADDING_NEGOTIATE => PaddingNegotiate(Body::decode_from_reader(r)?),
            ChanCmd::CERTS => Certs(Body::decode_from_reader(r)?),
            ChanCmd::AUTH_CHALLENGE => AuthChallenge(Body::decode_from_reader(r)?),
            _ => Unrecognized(Unrecognized {
                cmd,
                body: r.take_rest().into(),
            }),
        })
    }
}

/// A fixed-length padding cell; the correct response is to drop it.
#[derive(Clone, Debug, Default)]
pub struct Padding {}
impl Padding {
    /// Construct a new padding cell.
    pub fn new() -> Self {
        Padding {}
    }
}
impl Body for Padding {
    fn encode_onto<W: Writer + ?Sized>(self, _w: &mut W) -> BytesResult<()> {
        Ok(())
    }
}
impl Readable for Padding {
    fn take_from(_r: &mut Reader<'_>) -> BytesResult<Self> {
        Ok(Padding {})
    }
}

/// A variable-length padding cell; the correct response is to drop it.
#[derive(Clone, Debug)]
pub struct Vpadding {
    /// The number of padding bytes to send.
    len: u16,
}
impl Vpadding {
    /// Construct a new vpadding cell of the given length.
    pub fn new(len: u16) -> Self {
        Vpadding { len }
    }
}
impl Body for Vpadding {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> BytesResult<()> {
        w.write_zeros(self.len as usize);
        Ok(())
    }
}
impl Readable for Vpadding {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        if r.remaining() > u16::MAX as usize {
            return Err(BytesError::BadMessage("too many bytes in VPADDING cell"));
        }
        Ok(Vpadding {
            len: r.remaining() as u16,
        })
    }
}

caret_int! {
    /// The handshake type named in a CREATE2 cell, determining which key
    /// exchange its body holds.
    pub struct HandshakeType(u16) {
        /// ntor: the curve25519+SHA256 handshake this core implements.
        NTOR = 2,
        /// ntor-v3: ntor extended with extra encrypted data.
        NTOR_V3 = 3,
    }
}

/// Create a circuit hop using a typed handshake, almost always ntor.
#[derive(Clone, Debug)]
pub struct Create2 {
    /// Which handshake type this is.
    handshake_type: HandshakeType,
    /// The handshake's client-side material.
    handshake: Vec<u8>,
}
impl Create2 {
    /// Wrap a handshake's client material into a CREATE2 body.
    pub fn new<B: Into<Vec<u8>>>(handshake_type: HandshakeType, handshake: B) -> Self {
        Create2 {
            handshake_type,
            handshake: handshake.into(),
        }
    }
    /// Return the handshake type.
    pub fn handshake_type(&self) -> HandshakeType {
        self.handshake_type
    }
    /// Return the handshake's client material.
    pub fn body(&self) -> &[u8] {
        &self.handshake
    }
}
impl Body for Create2 {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> BytesResult<()> {
        w.write_u16(self.handshake_type.into());
        let len: u16 = self
            .handshake
            .len()
            .try_into()
            .map_err(|_| BytesError::Oversized("CREATE2 handshake"))?;
        w.write_u16(len);
        w.write_all(&self.handshake);
        Ok(())
    }
}
impl Readable for Create2 {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        let handshake_type = HandshakeType::from(r.take_u16()?);
        let len = r.take_u16()?;
        let handshake = r.take(len as usize)?.into();
        Ok(Create2 {
            handshake_type,
            handshake,
        })
    }
}

/// Reply to a [`Create2`]: the relay's side of the handshake.
#[derive(Clone, Debug)]
pub struct Created2 {
    /// The handshake's server-side material.
    handshake: Vec<u8>,
}
impl Created2 {
    /// Wrap a handshake's server material into a CREATED2 body.
    pub fn new<B: Into<Vec<u8>>>(handshake: B) -> Self {
        Created2 {
            handshake: handshake.into(),
        }
    }
    /// Consume this message, returning the handshake's server material.
    pub fn into_body(self) -> Vec<u8> {
        self.handshake
    }
}
impl Body for Created2 {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> BytesResult<()> {
        let len: u16 = self
            .handshake
            .len()
            .try_into()
            .map_err(|_| BytesError::Oversized("CREATED2 handshake"))?;
        w.write_u16(len);
        w.write_all(&self.handshake);
        Ok(())
    }
}
impl Readable for Created2 {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        let len = r.take_u16()?;
        Ok(Created2 {
            handshake: r.take(len as usize)?.into(),
        })
    }
}

/// A relay cell, carrying an onion-encrypted relay-cell body.
///
/// This crate only knows the body as opaque bytes; the onion layering and
/// digest live at a different layer.
#[derive(Clone)]
pub struct Relay {
    /// The cell's 509-byte body, boxed to avoid copying it by value.
    body: BoxedCellBody,
}
impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay").finish_non_exhaustive()
    }
}
impl Relay {
    /// Build a relay cell body from a slice, zero-padding to 509 bytes.
    ///
    /// Panics if `body` is longer than 509 bytes, which would indicate a
    /// programming error upstream.
    pub fn new(body: impl AsRef<[u8]>) -> Self {
        let body = body.as_ref();
        let mut r = [0_u8; CELL_DATA_LEN];
        r[..body.len()].copy_from_slice(body);
        Relay { body: Box::new(r) }
    }
    /// Wrap an already-sized body.
    pub fn from_raw(body: super::RawCellBody) -> Self {
        Relay {
            body: Box::new(body),
        }
    }
    /// Consume this message, returning its body for onion en/decryption.
    pub fn into_relay_body(self) -> BoxedCellBody {
        self.body
    }
    /// Rewrap this message as a RELAY_EARLY cell.
    pub fn into_early(self) -> AnyChanMsg {
        AnyChanMsg::RelayEarly(RelayEarly(self))
    }
}
impl Body for Relay {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> BytesResult<()> {
        w.write_all(&self.body[..]);
        Ok(())
    }
}
impl Readable for Relay {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        let mut body = Box::new([0_u8; CELL_DATA_LEN]);
        body.copy_from_slice(r.take(CELL_DATA_LEN)?);
        Ok(Relay { body })
    }
}

/// A relay cell sent on one of the first few hops of a fresh circuit, where
/// only CREATE2/EXTEND2 payloads are allowed.
#[derive(Clone, Debug)]
pub struct RelayEarly(Relay);
impl Body for RelayEarly {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> BytesResult<()> {
        self.0.encode_onto(w)
    }
}
impl Readable for RelayEarly {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        Ok(RelayEarly(Relay::take_from(r)?))
    }
}
impl RelayEarly {
    /// Consume this message, returning its body for onion en/decryption.
    pub fn into_relay_body(self) -> BoxedCellBody {
        self.0.body
    }
}

caret_int! {
    /// Why a circuit was torn down.
    pub struct DestroyReason(u8) {
        /// No reason given; the only reason a client ever sends.
        NONE = 0,
        /// Protocol violation.
        PROTOCOL = 1,
        /// Internal error at the peer.
        INTERNAL = 2,
        /// The client sent a TRUNCATE.
        REQUESTED = 3,
        /// The relay is hibernating.
        HIBERNATING = 4,
        /// The relay ran out of memory, sockets, or circuit IDs.
        RESOURCELIMIT = 5,
        /// Could not connect to the next relay.
        CONNECTFAILED = 6,
        /// Connected, but the next relay's identity did not match.
        OR_IDENTITY = 7,
        /// The channel carrying this circuit closed.
        CHANNEL_CLOSED = 8,
        /// Circuit expired for being too old or dirty.
        FINISHED = 9,
        /// Circuit construction timed out.
        TIMEOUT = 10,
        /// Circuit was destroyed without a client truncate.
        DESTROYED = 11,
        /// Request for an unknown onion service.
        NOSUCHSERVICE = 12,
    }
}

/// Tear down a circuit; propagated to every later hop.
#[derive(Clone, Debug)]
pub struct Destroy {
    /// Why the circuit is being torn down.
    reason: DestroyReason,
}
impl Destroy {
    /// Construct a new DESTROY body with the given reason.
    pub fn new(reason: DestroyReason) -> Self {
        Destroy { reason }
    }
    /// Return the reason given for tearing down the circuit.
    pub fn reason(&self) -> DestroyReason {
        self.reason
    }
}
impl Body for Destroy {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> BytesResult<()> {
        w.write_u8(self.reason.into());
        Ok(())
    }
}
impl Readable for Destroy {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        Ok(Destroy {
            reason: r.take_u8()?.into(),
        })
    }
}

/// helper: encode one address as a NETINFO cell expects.
fn enc_one_netinfo_addr<W: Writer + ?Sized>(w: &mut W, addr: &IpAddr) {
    match addr {
        IpAddr::V4(ip) => {
            w.write_u8(0x04);
            w.write_u8(4);
            w.write_all(&ip.octets());
        }
        IpAddr::V6(ip) => {
            w.write_u8(0x06);
            w.write_u8(16);
            w.write_all(&ip.octets());
        }
    }
}
/// helper: decode one address as encoded in a NETINFO cell, returning `None`
/// for an address type this core doesn't recognize.
fn take_one_netinfo_addr(r: &mut Reader<'_>) -> BytesResult<Option<IpAddr>> {
    let atype = r.take_u8()?;
    let alen = r.take_u8()?;
    let body = r.take(alen as usize)?;
    Ok(match (atype, alen) {
        (0x04, 4) => Some(IpAddr::V4(Ipv4Addr::new(body[0], body[1], body[2], body[3]))),
        (0x06, 16) => {
            let mut bytes = [0_u8; 16];
            bytes.copy_from_slice(body);
            Some(IpAddr::V6(bytes.into()))
        }
        _ => None,
    })
}

/// Finishes channel negotiation: reports the current time and each side's
/// view of its own and the peer's address.
#[derive(Clone, Debug)]
pub struct Netinfo {
    /// Sender's clock, in seconds since the epoch, or 0 for a client.
    timestamp: u32,
    /// The address the sender believes the recipient is connecting from.
    their_addr: Option<IpAddr>,
    /// The addresses the sender is reachable at (empty for a client).
    my_addr: Vec<IpAddr>,
}
impl Netinfo {
    /// Construct the NETINFO a client sends: no timestamp, no addresses of
    /// its own.
    pub fn from_client(their_addr: Option<IpAddr>) -> Self {
        Netinfo {
            timestamp: 0,
            their_addr,
            my_addr: Vec::new(),
        }
    }
    /// Return this side's observed address for the peer, if any.
    pub fn their_addr(&self) -> Option<IpAddr> {
        self.their_addr
    }
}
impl Body for Netinfo {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> BytesResult<()> {
        w.write_u32(self.timestamp);
        let their_addr = self.their_addr.unwrap_or(Ipv4Addr::UNSPECIFIED.into());
        enc_one_netinfo_addr(w, &their_addr);
        let n: u8 = self
            .my_addr
            .len()
            .try_into()
            .map_err(|_| BytesError::Oversized("NETINFO address list"))?;
        w.write_u8(n);
        for addr in &self.my_addr {
            enc_one_netinfo_addr(w, addr);
        }
        Ok(())
    }
}
impl Readable for Netinfo {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        let timestamp = r.take_u32()?;
        let their_addr = take_one_netinfo_addr(r)?.filter(|a| !a.is_unspecified());
        let n = r.take_u8()?;
        let mut my_addr = Vec::with_capacity(n as usize);
        for _ in 0..n {
            if let Some(a) = take_one_netinfo_addr(r)? {
                my_addr.push(a);
            }
        }
        Ok(Netinfo {
            timestamp,
            their_addr,
            my_addr,
        })
    }
}

/// Begins channel negotiation by listing supported link protocol versions.
///
/// Unlike every other channel message, a VERSIONS cell is framed with an
/// obsolete two-byte circuit ID, since the width of the circuit ID itself
/// hasn't been negotiated yet. [`Versions::encode_for_handshake`] produces
/// that framing directly; [`super::codec::ChannelCodec`] is never used for
/// this message.
#[derive(Clone, Debug)]
pub struct Versions {
    /// The link protocol versions this side supports, in no particular
    /// order.
    versions: Vec<u16>,
}
impl Versions {
    /// Construct a new VERSIONS body from a list of supported versions.
    pub fn new(vs: impl Into<Vec<u16>>) -> crate::Result<Self> {
        let versions = vs.into();
        if versions.len() >= (u16::MAX / 2) as usize {
            return Err(crate::Error::CantEncode("too many versions"));
        }
        Ok(Versions { versions })
    }
    /// Encode this cell with the two-byte-circ-ID framing the handshake
    /// requires, rather than the usual `ChannelCodec` framing.
    pub fn encode_for_handshake(self) -> crate::Result<Vec<u8>> {
        let mut v = Vec::new();
        v.write_u16(0);
        v.write_u8(ChanCmd::VERSIONS.into());
        let len: u16 = (self.versions.len() * 2)
            .try_into()
            .map_err(|_| crate::Error::CantEncode("too many versions"))?;
        v.write_u16(len);
        self.encode_onto(&mut v)?;
        Ok(v)
    }
    /// Return the highest link protocol version in `my_protos` that this
    /// message also lists, if any.
    pub fn best_shared_link_protocol(&self, my_protos: &[u16]) -> Option<u16> {
        my_protos
            .iter()
            .filter(|p| self.versions.contains(p))
            .copied()
            .max()
    }
}
impl Body for Versions {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> BytesResult<()> {
        for v in &self.versions {
            w.write_u16(*v);
        }
        Ok(())
    }
}
impl Readable for Versions {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        let mut versions = Vec::new();
        while r.remaining() > 0 {
            versions.push(r.take_u16()?);
        }
        Ok(Versions { versions })
    }
}

caret_int! {
    /// Whether a PADDING_NEGOTIATE message starts or stops padding.
    pub struct PaddingNegotiateCmd(u8) {
        /// Stop padding.
        STOP = 1,
        /// Start padding.
        START = 2,
    }
}

/// Adjusts channel padding parameters on the link to a guard.
///
/// A client accepts and ignores these; this core never generates one of its
/// own, since it carries no inter-relay padding logic.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PaddingNegotiate {
    /// Start or stop.
    command: PaddingNegotiateCmd,
    /// Suggested lower bound on the inter-packet timeout, in milliseconds.
    ito_low_ms: u16,
    /// Suggested upper bound on the inter-packet timeout, in milliseconds.
    ito_high_ms: u16,
}
impl PaddingNegotiate {
    /// A PADDING_NEGOTIATE START requesting the guard's default timing.
    pub fn start_default() -> Self {
        PaddingNegotiate {
            command: PaddingNegotiateCmd::START,
            ito_low_ms: 0,
            ito_high_ms: 0,
        }
    }
    /// A PADDING_NEGOTIATE STOP.
    pub fn stop() -> Self {
        PaddingNegotiate {
            command: PaddingNegotiateCmd::STOP,
            ito_low_ms: 0,
            ito_high_ms: 0,
        }
    }
}
impl Body for PaddingNegotiate {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> BytesResult<()> {
        w.write_u8(0);
        w.write_u8(self.command.into());
        w.write_u16(self.ito_low_ms);
        w.write_u16(self.ito_high_ms);
        Ok(())
    }
}
impl Readable for PaddingNegotiate {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        let version = r.take_u8()?;
        if version != 0 {
            return Err(BytesError::BadMessage(
                "unrecognized padding negotiation version",
            ));
        }
        Ok(PaddingNegotiate {
            command: r.take_u8()?.into(),
            ito_low_ms: r.take_u16()?,
            ito_high_ms: r.take_u16()?,
        })
    }
}

/// One certificate within a [`Certs`] cell, opaque to this crate.
#[derive(Clone, Debug)]
struct TorCert {
    /// The certificate's type code.
    certtype: u8,
    /// Its encoded bytes.
    cert: Vec<u8>,
}

/// Additional certificates exchanged as part of the link handshake, outside
/// the TLS handshake proper.
///
/// This core only needs to read the relay's identity certificates back out
/// by type; it doesn't parse their contents (that's `tor-proto`'s job, once
/// it validates the chain against the observed TLS key).
#[derive(Clone, Debug)]
pub struct Certs {
    /// The certificates in this cell, in the order they arrived.
    certs: Vec<TorCert>,
}
impl Certs {
    /// Return the body of the first certificate tagged with `certtype`, if
    /// any.
    pub fn cert_body(&self, certtype: u8) -> Option<&[u8]> {
        self.certs
            .iter()
            .find(|c| c.certtype == certtype)
            .map(|c| &c.cert[..])
    }
}
impl Body for Certs {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> BytesResult<()> {
        let n: u8 = self
            .certs
            .len()
            .try_into()
            .map_err(|_| BytesError::Oversized("CERTS list"))?;
        w.write_u8(n);
        for c in &self.certs {
            w.write_u8(c.certtype);
            let len: u16 = c
                .cert
                .len()
                .try_into()
                .map_err(|_| BytesError::Oversized("certificate body"))?;
            w.write_u16(len);
            w.write_all(&c.cert);
        }
        Ok(())
    }
}
impl Readable for Certs {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        let n = r.take_u8()?;
        let mut certs = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let certtype = r.take_u8()?;
            let len = r.take_u16()?;
            let cert = r.take(len as usize)?.into();
            certs.push(TorCert { certtype, cert });
        }
        Ok(Certs { certs })
    }
}

/// Length in bytes of the random challenge in an AUTH_CHALLENGE cell.
const CHALLENGE_LEN: usize = 32;

/// Sent by a responder to an initiator as part of relay-to-relay link
/// authentication.
///
/// A client ignores this message; it has nothing to authenticate.
#[derive(Clone, Debug)]
pub struct AuthChallenge {
    /// Random challenge material.
    challenge: [u8; CHALLENGE_LEN],
    /// Authentication methods the responder will accept.
    methods: Vec<u16>,
}
impl Body for AuthChallenge {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> BytesResult<()> {
        w.write_all(&self.challenge);
        let n: u16 = self
            .methods
            .len()
            .try_into()
            .map_err(|_| BytesError::Oversized("AUTH_CHALLENGE method list"))?;
        w.write_u16(n);
        for m in self.methods {
            w.write_u16(m);
        }
        Ok(())
    }
}
impl Readable for AuthChallenge {
    fn take_from(r: &mut Reader<'_>) -> BytesResult<Self> {
        let challenge = r.extract()?;
        let n = r.take_u16()?;
        let mut methods = Vec::with_capacity(n as usize);
        for _ in 0..n {
            methods.push(r.take_u16()?);
        }
        Ok(AuthChallenge { challenge, methods })
    }
}

/// A cell whose command byte this core doesn't interpret.
///
/// We still need to be able to round-trip it (for example, to forward a
/// channel cell whose meaning doesn't matter to a client), so we keep the
/// raw body around.
#[derive(Clone, Debug)]
pub struct Unrecognized {
    /// The cell's command byte.
    cmd: ChanCmd,
    /// Its raw body.
    body: Vec<u8>,
}
impl Unrecognized {
    /// Return the command byte.
    pub fn cmd(&self) -> ChanCmd {
        self.cmd
    }
    /// Return the raw body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
impl Body for Unrecognized {
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> BytesResult<()> {
        w.write_all(&self.body);
        Ok(())
    }
}
impl Readable for Unrecognized {
    fn take_from(_r: &mut Reader<'_>) -> BytesResult<Self> {
        // Never reached directly: AnyChanMsg::decode_from_reader builds
        // Unrecognized itself, since it needs the command byte.
        Err(BytesError::BadMessage(
            "Unrecognized can only be decoded with its command byte",
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn versions_roundtrip() {
        let v = Versions::new(vec![3, 4, 5]).unwrap();
        let mut w: Vec<u8> = Vec::new();
        v.clone().encode_onto(&mut w).unwrap();
        let mut r = Reader::from_slice(&w);
        let v2 = Versions::take_from(&mut r).unwrap();
        r.should_be_exhausted().unwrap();
        assert_eq!(v2.best_shared_link_protocol(&[1, 4]), Some(4));
    }

    #[test]
    fn netinfo_roundtrip() {
        let addr: IpAddr = "198.51.100.7".parse().unwrap();
        let n = Netinfo::from_client(Some(addr));
        let mut w: Vec<u8> = Vec::new();
        n.encode_onto(&mut w).unwrap();
        let mut r = Reader::from_slice(&w);
        let n2 = Netinfo::take_from(&mut r).unwrap();
        r.should_be_exhausted().unwrap();
        assert_eq!(n2.their_addr(), Some(addr));
    }

    #[test]
    fn create2_roundtrip() {
        let c = Create2::new(HandshakeType::NTOR, vec![1, 2, 3, 4]);
        let mut w: Vec<u8> = Vec::new();
        c.encode_onto(&mut w).unwrap();
        let mut r = Reader::from_slice(&w);
        let c2 = Create2::take_from(&mut r).unwrap();
        r.should_be_exhausted().unwrap();
        assert_eq!(c2.handshake_type(), HandshakeType::NTOR);
        assert_eq!(c2.body(), &[1, 2, 3, 4]);
    }

    #[test]
    fn any_chan_msg_roundtrip_via_cmd() {
        let cell = AnyChanMsg::Destroy(Destroy::new(DestroyReason::REQUESTED));
        let cmd = cell.cmd();
        let mut w: Vec<u8> = Vec::new();
        cell.encode_onto(&mut w).unwrap();
        let mut r = Reader::from_slice(&w);
        let decoded = AnyChanMsg::decode_from_reader(cmd, &mut r).unwrap();
        match decoded {
            AnyChanMsg::Destroy(d) => assert_eq!(d.reason(), DestroyReason::REQUESTED),
            _ => panic!("wrong variant"),
        }
    }
}
