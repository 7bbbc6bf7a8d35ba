//! The message bodies that can appear inside a relay cell.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use caret::caret_int;
use tor_bytes::{EncodeResult, Error as BytesError, Reader, Result, Writer};
use tor_linkspec::LinkSpec;

use crate::chancell::msg::HandshakeType;
use crate::relaycell::{RelayCmd, RelayMsg};

/// Internal: traits in common across different relay-cell bodies.
pub trait Body: Sized {
    /// Decode a body from a reader already truncated to its exact length.
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self>;
    /// Encode this body (and nothing else) onto `w`.
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()>;
}

/// A fully parsed relay message of any recognized command.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AnyRelayMsg {
    /// Create a stream.
    Begin(Begin),
    /// Data on a stream.
    Data(Data),
    /// Close a stream.
    End(End),
    /// Successful response to Begin.
    Connected(Connected),
    /// Flow control.
    Sendme(Sendme),
    /// Extend a circuit (current form).
    Extend2(Extend2),
    /// Reply to Extend2.
    Extended2(Extended2),
    /// Partially close a circuit.
    Truncate(Truncate),
    /// Reply to Truncate.
    Truncated(Truncated),
    /// Padding; always dropped.
    Drop(Drop),
    /// DNS lookup request.
    Resolve(Resolve),
    /// DNS lookup reply.
    Resolved(Resolved),
    /// Open a directory stream.
    BeginDir(BeginDir),
    /// Client to rendezvous point: set up a rendezvous cookie.
    EstablishRendezvous(EstablishRendezvous),
    /// Client to introduction point.
    Introduce1(Introduce1),
    /// Introduction point to client: acknowledge Introduce1.
    IntroduceAck(IntroduceAck),
    /// Service to rendezvous point.
    Rendezvous1(Rendezvous1),
    /// Rendezvous point to client.
    Rendezvous2(Rendezvous2),
    /// Rendezvous point to client: acknowledge EstablishRendezvous.
    RendezvousEstablished(RendezvousEstablished),
    /// A command this core does not interpret; forwarded-compatible
    /// Kept opaque: unknown commands are dropped, not treated as errors.
    Unrecognized(Unrecognized),
}

impl RelayMsg for AnyRelayMsg {
    fn cmd(&self) -> RelayCmd {
        use AnyRelayMsg::*;
        match self {
            Begin(_) => RelayCmd::BEGIN,
            Data(_) => RelayCmd::DATA,
            End(_) => RelayCmd::END,
            Connected(_) => RelayCmd::CONNECTED,
            Sendme(_) => RelayCmd::SENDME,
            Extend2(_) => RelayCmd::EXTEND2,
            Extended2(_) => RelayCmd::EXTENDED2,
            Truncate(_) => RelayCmd::TRUNCATE,
            Truncated(_) => RelayCmd::TRUNCATED,
            Drop(_) => RelayCmd::DROP,
            Resolve(_) => RelayCmd::RESOLVE,
            Resolved(_) => RelayCmd::RESOLVED,
            BeginDir(_) => RelayCmd::BEGIN_DIR,
            EstablishRendezvous(_) => RelayCmd::ESTABLISH_RENDEZVOUS,
            Introduce1(_) => RelayCmd::INTRODUCE1,
            IntroduceAck(_) => RelayCmd::INTRODUCE_ACK,
            Rendezvous1(_) => RelayCmd::RENDEZVOUS1,
            Rendezvous2(_) => RelayCmd::RENDEZVOUS2,
            RendezvousEstablished(_) => RelayCmd::RENDEZVOUS_ESTABLISHED,
            Unrecognized(u) => u.cmd,
        }
    }

    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        use AnyRelayMsg::*;
        match self {
            Begin(b) => b.encode_onto(w),
            Data(b) => b.encode_onto(w),
            End(b) => b.encode_onto(w),
            Connected(b) => b.encode_onto(w),
            Sendme(b) => b.encode_onto(w),
            Extend2(b) => b.encode_onto(w),
            Extended2(b) => b.encode_onto(w),
            Truncate(b) => b.encode_onto(w),
            Truncated(b) => b.encode_onto(w),
            Drop(b) => b.encode_onto(w),
            Resolve(b) => b.encode_onto(w),
            Resolved(b) => b.encode_onto(w),
            BeginDir(b) => b.encode_onto(w),
            EstablishRendezvous(b) => b.encode_onto(w),
            Introduce1(b) => b.encode_onto(w),
            IntroduceAck(b) => b.encode_onto(w),
            Rendezvous1(b) => b.encode_onto(w),
            Rendezvous2(b) => b.encode_onto(w),
            RendezvousEstablished(b) => b.encode_onto(w),
            Unrecognized(b) => b.encode_onto(w),
        }
    }

    fn decode_from_reader(cmd: RelayCmd, r: &mut Reader<'_>) -> Result<Self> {
        use AnyRelayMsg::*;
        Ok(match cmd {
            RelayCmd::BEGIN => Begin(Body::decode_from_reader(r)?),
            RelayCmd::DATA => Data(Body::decode_from_reader(r)?),
            RelayCmd::END => End(Body::decode_from_reader(r)?),
            RelayCmd::CONNECTED => Connected(Body::decode_from_reader(r)?),
            RelayCmd::SENDME => Sendme(Body::decode_from_reader(r)?),
            RelayCmd::EXTEND2 => Extend2(Body::decode_from_reader(r)?),
            RelayCmd::EXTENDED2 => Extended2(Body::decode_from_reader(r)?),
            RelayCmd::TRUNCATE => Truncate(Body::decode_from_reader(r)?),
            RelayCmd::TRUNCATED => Truncated(Body::decode_from_reader(r)?),
            RelayCmd::DROP => Drop(Body::decode_from_reader(r)?),
            RelayCmd::RESOLVE => Resolve(Body::decode_from_reader(r)?),
            RelayCmd::RESOLVED => Resolved(Body::decode_from_reader(r)?),
            RelayCmd::BEGIN_DIR => BeginDir(Body::decode_from_reader(r)?),
            RelayCmd::ESTABLISH_RENDEZVOUS => {
                EstablishRendezvous(Body::decode_from_reader(r)?)
            }
            RelayCmd::INTRODUCE1 => Introduce1(Body::decode_from_reader(r)?),
            RelayCmd::INTRODUCE_ACK => IntroduceAck(Body::decode_from_reader(r)?),
            RelayCmd::RENDEZVOUS1 => Rendezvous1(Body::decode_from_reader(r)?),
            RelayCmd::RENDEZVOUS2 => Rendezvous2(Body::decode_from_reader(r)?),
            RelayCmd::RENDEZVOUS_ESTABLISHED => {
                RendezvousEstablished(Body::decode_from_reader(r)?)
            }
            _ => Unrecognized(Unrecognized {
                cmd,
                body: r.take_rest().into(),
            }),
        })
    }
}

/// Flags describing how an exit should resolve a Begin's target address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BeginFlags(u32);
impl BeginFlags {
    /// The client will accept a connection to an IPv6 address.
    pub const IPV6_OKAY: u32 = 1 << 0;
    /// The client will not accept a connection to an IPv4 address.
    pub const IPV4_NOT_OKAY: u32 = 1 << 1;
    /// The client would rather have IPv6.
    pub const IPV6_PREFERRED: u32 = 1 << 2;
}
impl From<u32> for BeginFlags {
    fn from(v: u32) -> Self {
        BeginFlags(v)
    }
}
impl From<BeginFlags> for u32 {
    fn from(f: BeginFlags) -> u32 {
        f.0
    }
}

/// Creates a new data stream.
#[derive(Debug, Clone)]
pub struct Begin {
    /// ASCII "host:port" target, NUL-terminated on the wire.
    addr: Vec<u8>,
    /// Target port (also embedded in `addr`, kept separately for convenience).
    port: u16,
    /// Address-resolution preference flags.
    flags: BeginFlags,
}
impl Begin {
    /// Construct a new Begin cell for `host:port`.
    pub fn new(host: &str, port: u16, flags: impl Into<BeginFlags>) -> crate::Result<Self> {
        if !host.is_ascii() {
            return Err(crate::Error::MalformedCell("non-ASCII stream target"));
        }
        let addr = format!("{}:{}", host, port).into_bytes();
        Ok(Begin {
            addr,
            port,
            flags: flags.into(),
        })
    }
    /// Return the "host:port" target string.
    pub fn addr(&self) -> &[u8] {
        &self.addr
    }
    /// Return the target port.
    pub fn port(&self) -> u16 {
        self.port
    }
    /// Return the resolution-preference flags.
    pub fn flags(&self) -> BeginFlags {
        self.flags
    }
}
impl Body for Begin {
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let body = r.take_rest();
        let nul = body
            .iter()
            .position(|b| *b == 0)
            .ok_or(BytesError::BadMessage("missing NUL in BEGIN address"))?;
        let addr_str = std::str::from_utf8(&body[..nul])
            .map_err(|_| BytesError::BadMessage("non-UTF8 BEGIN address"))?;
        let (host, port_str) = addr_str
            .rsplit_once(':')
            .ok_or(BytesError::BadMessage("missing port in BEGIN address"))?;
        let port: u16 = port_str
            .parse()
            .map_err(|_| BytesError::BadMessage("bad port in BEGIN address"))?;
        let flags = if body.len() >= nul + 5 {
            u32::from_be_bytes(
                body[nul + 1..nul + 5]
                    .try_into()
                    .map_err(|_| BytesError::Truncated)?,
            )
        } else {
            0
        };
        Ok(Begin {
            addr: format!("{}:{}", host, port).into_bytes(),
            port,
            flags: flags.into(),
        })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_all(&self.addr);
        w.write_u8(0);
        w.write_u32(self.flags.into());
        Ok(())
    }
}

/// Opens a directory stream to the relay's own directory port.
#[derive(Debug, Clone)]
pub struct BeginDir {}
impl BeginDir {
    /// Construct a new BEGIN_DIR cell.
    pub fn new() -> Self {
        BeginDir {}
    }
}
impl Default for BeginDir {
    fn default() -> Self {
        Self::new()
    }
}
impl Body for BeginDir {
    fn decode_from_reader(_r: &mut Reader<'_>) -> Result<Self> {
        Ok(BeginDir {})
    }
    fn encode_onto<W: Writer + ?Sized>(self, _w: &mut W) -> EncodeResult<()> {
        Ok(())
    }
}

/// The longest allowed Data message body: PAYLOAD_MAX_LEN (498) bytes.
pub const DATA_MAXLEN: usize = super::PAYLOAD_MAX_LEN;

/// Carries application data on a stream.
#[derive(Debug, Clone)]
pub struct Data {
    /// 1..=DATA_MAXLEN bytes of stream payload.
    body: Vec<u8>,
}
impl Data {
    /// Construct a new Data cell. Fails if `inp` is empty or too long.
    pub fn new(inp: &[u8]) -> crate::Result<Self> {
        if inp.is_empty() || inp.len() > DATA_MAXLEN {
            return Err(crate::Error::CantEncode("DATA message wrong length"));
        }
        Ok(Data { body: inp.into() })
    }
}
impl AsRef<[u8]> for Data {
    fn as_ref(&self) -> &[u8] {
        &self.body
    }
}
impl From<Data> for Vec<u8> {
    fn from(d: Data) -> Vec<u8> {
        d.body
    }
}
impl Body for Data {
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        if r.remaining() == 0 {
            return Err(BytesError::BadMessage("empty DATA message"));
        }
        Ok(Data {
            body: r.take_rest().into(),
        })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_all(&self.body);
        Ok(())
    }
}

caret_int! {
    /// Why a stream is being closed.
    pub struct EndReason(u8) {
        /// Unspecified; the only reason a client sends.
        MISC = 1,
        /// Couldn't look up the hostname.
        RESOLVEFAILED = 2,
        /// Remote host refused the connection.
        CONNECTREFUSED = 3,
        /// Exit-policy violation.
        EXITPOLICY = 4,
        /// Circuit destroyed.
        DESTROY = 5,
        /// Connection closed cleanly.
        DONE = 6,
        /// Connection or handshake timed out.
        TIMEOUT = 7,
        /// No route to destination.
        NOROUTE = 8,
        /// Relay is hibernating.
        HIBERNATING = 9,
        /// Internal error at the relay.
        INTERNAL = 10,
        /// Relay is out of resources.
        RESOURCELIMIT = 11,
        /// Connection was reset.
        CONNRESET = 12,
        /// Tor protocol violation.
        TORPROTOCOL = 13,
        /// BEGIN_DIR sent to a non-directory-cache.
        NOTDIRECTORY = 14,
    }
}

/// Closes a stream.
#[derive(Debug, Clone)]
pub struct End {
    /// The reason the stream is closing.
    reason: EndReason,
    /// For EXITPOLICY, the address that was rejected and its TTL.
    addr: Option<(IpAddr, u32)>,
}
impl End {
    /// The only reason a client ever sends: no explanation given.
    pub fn new_misc() -> Self {
        End {
            reason: EndReason::MISC,
            addr: None,
        }
    }
    /// Return the reason this stream is ending.
    pub fn reason(&self) -> EndReason {
        self.reason
    }
}
impl Body for End {
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        if r.remaining() == 0 {
            return Ok(End {
                reason: EndReason::MISC,
                addr: None,
            });
        }
        let reason = r.take_u8()?.into();
        if reason == EndReason::EXITPOLICY {
            let addr = match r.remaining() {
                4 | 8 => IpAddr::V4(r.take_u32()?.into()),
                16 | 20 => IpAddr::V6(Ipv6Addr::from(r.take_array::<16>()?)),
                _ => return Ok(End { reason, addr: None }),
            };
            let ttl = if r.remaining() == 4 {
                r.take_u32()?
            } else {
                u32::MAX
            };
            Ok(End {
                reason,
                addr: Some((addr, ttl)),
            })
        } else {
            Ok(End { reason, addr: None })
        }
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_u8(self.reason.into());
        if let (EndReason::EXITPOLICY, Some((addr, ttl))) = (self.reason, self.addr) {
            match addr {
                IpAddr::V4(v4) => w.write_all(&v4.octets()),
                IpAddr::V6(v6) => w.write_all(&v6.octets()),
            }
            w.write_u32(ttl);
        }
        Ok(())
    }
}

/// Successful reply to Begin.
#[derive(Debug, Clone)]
pub struct Connected {
    /// The resolved address and its TTL, if any was given.
    addr: Option<(IpAddr, u32)>,
}
impl Connected {
    /// Construct a Connected cell without address information.
    pub fn new_empty() -> Self {
        Connected { addr: None }
    }
    /// The resolved address and TTL the exit reported, if any.
    pub fn addr(&self) -> Option<(IpAddr, u32)> {
        self.addr
    }
}
impl Body for Connected {
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        if r.remaining() == 0 {
            return Ok(Connected { addr: None });
        }
        let ipv4 = r.take_u32()?;
        let addr = if ipv4 == 0 {
            if r.take_u8()? != 6 {
                return Err(BytesError::BadMessage("invalid address type in CONNECTED"));
            }
            IpAddr::V6(Ipv6Addr::from(r.take_array::<16>()?))
        } else {
            IpAddr::V4(ipv4.into())
        };
        let ttl = r.take_u32()?;
        Ok(Connected {
            addr: Some((addr, ttl)),
        })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        if let Some((addr, ttl)) = self.addr {
            match addr {
                IpAddr::V4(v4) => w.write_all(&v4.octets()),
                IpAddr::V6(v6) => {
                    w.write_u32(0);
                    w.write_u8(6);
                    w.write_all(&v6.octets());
                }
            }
            w.write_u32(ttl);
        }
        Ok(())
    }
}

/// Flow-control acknowledgement.
#[derive(Debug, Clone)]
pub struct Sendme {
    /// Authentication tag over the acknowledged cells (absent only for the
    /// oldest, unauthenticated stream-level SENDMEs).
    tag: Option<Vec<u8>>,
}
impl Sendme {
    /// A SENDME with no authentication tag (used for stream-level SENDMEs).
    pub fn new_empty() -> Self {
        Sendme { tag: None }
    }
    /// A circuit-level SENDME carrying the digest-derived authentication tag.
    pub fn new_tag(tag: [u8; 20]) -> Self {
        Sendme {
            tag: Some(tag.to_vec()),
        }
    }
    /// Return the authentication tag, if any.
    pub fn into_tag(self) -> Option<Vec<u8>> {
        self.tag
    }
}
impl Body for Sendme {
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let tag = if r.remaining() == 0 {
            None
        } else {
            let ver = r.take_u8()?;
            match ver {
                0 => None,
                1 => {
                    let len = r.take_u16()?;
                    Some(r.take(len as usize)?.into())
                }
                _ => return Err(BytesError::BadMessage("unrecognized SENDME version")),
            }
        };
        Ok(Sendme { tag })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        if let Some(tag) = self.tag {
            w.write_u8(1);
            let len: u16 = tag.len().try_into().map_err(|_| BytesError::Oversized("field length exceeds wire limit"))?;
            w.write_u16(len);
            w.write_all(&tag);
        }
        Ok(())
    }
}

/// Extend a circuit to a new hop.
#[derive(Debug, Clone)]
pub struct Extend2 {
    /// Where to find the next hop.
    linkspecs: Vec<LinkSpec>,
    /// The handshake type to use with it (always ntor in this core).
    handshake_type: HandshakeType,
    /// The CREATE2 handshake body to relay onward.
    handshake: Vec<u8>,
}
impl Extend2 {
    /// Construct a new EXTEND2 message.
    pub fn new(linkspecs: Vec<LinkSpec>, handshake_type: HandshakeType, handshake: Vec<u8>) -> Self {
        Extend2 {
            linkspecs,
            handshake_type,
            handshake,
        }
    }
    /// Return the link specifiers describing the target hop.
    pub fn linkspecs(&self) -> &[LinkSpec] {
        &self.linkspecs
    }
    /// Return the handshake type requested.
    pub fn handshake_type(&self) -> HandshakeType {
        self.handshake_type
    }
    /// Return the CREATE2 handshake body.
    pub fn handshake(&self) -> &[u8] {
        &self.handshake
    }
}
impl Body for Extend2 {
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let n = r.take_u8()?;
        let mut linkspecs = Vec::with_capacity(n as usize);
        for _ in 0..n {
            linkspecs.push(r.extract()?);
        }
        let handshake_type = r.take_u16()?.into();
        let hlen = r.take_u16()?;
        let handshake = r.take(hlen as usize)?.into();
        Ok(Extend2 {
            linkspecs,
            handshake_type,
            handshake,
        })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        let n: u8 = self
            .linkspecs
            .len()
            .try_into()
            .map_err(|_| BytesError::Oversized("field length exceeds wire limit"))?;
        w.write_u8(n);
        for ls in &self.linkspecs {
            w.write(ls)?;
        }
        w.write_u16(self.handshake_type.into());
        let hlen: u16 = self
            .handshake
            .len()
            .try_into()
            .map_err(|_| BytesError::Oversized("field length exceeds wire limit"))?;
        w.write_u16(hlen);
        w.write_all(&self.handshake);
        Ok(())
    }
}

/// Reply to Extend2: the new hop's CREATED2 body.
#[derive(Debug, Clone)]
pub struct Extended2 {
    /// The handshake's server-side material.
    handshake: Vec<u8>,
}
impl Extended2 {
    /// Wrap a CREATED2 body into an EXTENDED2 message.
    pub fn new(handshake: Vec<u8>) -> Self {
        Extended2 { handshake }
    }
    /// Consume this message, returning the handshake body.
    pub fn into_body(self) -> Vec<u8> {
        self.handshake
    }
}
impl Body for Extended2 {
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let len = r.take_u16()?;
        Ok(Extended2 {
            handshake: r.take(len as usize)?.into(),
        })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        let len: u16 = self
            .handshake
            .len()
            .try_into()
            .map_err(|_| BytesError::Oversized("field length exceeds wire limit"))?;
        w.write_u16(len);
        w.write_all(&self.handshake);
        Ok(())
    }
}

/// Partially close a circuit at the last hop.
#[derive(Debug, Clone)]
pub struct Truncate {}
impl Truncate {
    /// Construct a new TRUNCATE message.
    pub fn new() -> Self {
        Truncate {}
    }
}
impl Default for Truncate {
    fn default() -> Self {
        Self::new()
    }
}
impl Body for Truncate {
    fn decode_from_reader(_r: &mut Reader<'_>) -> Result<Self> {
        Ok(Truncate {})
    }
    fn encode_onto<W: Writer + ?Sized>(self, _w: &mut W) -> EncodeResult<()> {
        Ok(())
    }
}

/// Reply to Truncate or an unsolicited notice that a circuit was cut short.
#[derive(Debug, Clone)]
pub struct Truncated {
    /// Why the circuit was cut, reusing DESTROY's reason codes.
    reason: crate::chancell::msg::DestroyReason,
}
impl Truncated {
    /// Construct a new TRUNCATED message.
    pub fn new(reason: crate::chancell::msg::DestroyReason) -> Self {
        Truncated { reason }
    }
    /// Return the reason given.
    pub fn reason(&self) -> crate::chancell::msg::DestroyReason {
        self.reason
    }
}
impl Body for Truncated {
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Truncated {
            reason: r.take_u8()?.into(),
        })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_u8(self.reason.into());
        Ok(())
    }
}

/// Padding; recipients always drop it without acting on its contents.
#[derive(Debug, Clone)]
pub struct Drop {}
impl Drop {
    /// Construct a new DROP (padding) cell.
    pub fn new() -> Self {
        Drop {}
    }
}
impl Default for Drop {
    fn default() -> Self {
        Self::new()
    }
}
impl Body for Drop {
    fn decode_from_reader(_r: &mut Reader<'_>) -> Result<Self> {
        Ok(Drop {})
    }
    fn encode_onto<W: Writer + ?Sized>(self, _w: &mut W) -> EncodeResult<()> {
        Ok(())
    }
}

/// Requests that the exit resolve a name.
#[derive(Debug, Clone)]
pub struct Resolve {
    /// The hostname to resolve, or (for a reverse lookup) a `"in-addr.arpa"`
    /// / `"ip6.arpa"` query string.
    query: Vec<u8>,
}
impl Resolve {
    /// Construct a RESOLVE cell for the given hostname.
    pub fn new(query: &str) -> Self {
        Resolve {
            query: query.as_bytes().into(),
        }
    }
    /// Return the query string.
    pub fn query(&self) -> &[u8] {
        &self.query
    }
}
impl Body for Resolve {
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let body = r.take_rest();
        let nul = body.iter().position(|b| *b == 0).unwrap_or(body.len());
        Ok(Resolve {
            query: body[..nul].into(),
        })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_all(&self.query);
        w.write_u8(0);
        Ok(())
    }
}

/// One answer within a RESOLVED reply.
#[derive(Debug, Clone)]
pub enum ResolvedVal {
    /// A resolved IPv4 address.
    Ip(IpAddr),
    /// A resolved hostname (used for RESOLVE_PTR replies).
    Hostname(Vec<u8>),
    /// The resolution failed transiently (retry later).
    TransientError,
    /// The resolution failed permanently.
    NontransientError,
}

/// Reply to a RESOLVE cell, possibly carrying several answers.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// The answers, each with a TTL in seconds.
    answers: Vec<(ResolvedVal, u32)>,
}
impl Resolved {
    /// Construct a RESOLVED reply carrying a single IP answer.
    pub fn new_ip(addr: IpAddr, ttl: u32) -> Self {
        Resolved {
            answers: vec![(ResolvedVal::Ip(addr), ttl)],
        }
    }
    /// Construct a RESOLVED reply carrying a single hostname answer (a
    /// RESOLVE_PTR reply).
    pub fn new_hostname(name: &str, ttl: u32) -> Self {
        Resolved {
            answers: vec![(ResolvedVal::Hostname(name.as_bytes().into()), ttl)],
        }
    }
    /// Construct an error reply.
    pub fn new_error(transient: bool) -> Self {
        let val = if transient {
            ResolvedVal::TransientError
        } else {
            ResolvedVal::NontransientError
        };
        Resolved {
            answers: vec![(val, 0)],
        }
    }
    /// Return the answers in this reply.
    pub fn answers(&self) -> &[(ResolvedVal, u32)] {
        &self.answers
    }
}
impl Body for Resolved {
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let mut answers = Vec::new();
        while r.remaining() > 0 {
            let atype = r.take_u8()?;
            let alen = r.take_u8()? as usize;
            let body = r.take(alen)?;
            let val = match (atype, alen) {
                (0x04, 4) => ResolvedVal::Ip(IpAddr::V4(Ipv4Addr::new(
                    body[0], body[1], body[2], body[3],
                ))),
                (0x06, 16) => {
                    let mut b = [0_u8; 16];
                    b.copy_from_slice(body);
                    ResolvedVal::Ip(IpAddr::V6(Ipv6Addr::from(b)))
                }
                (0x00, _) => ResolvedVal::Hostname(body.into()),
                (0xF0, _) => ResolvedVal::TransientError,
                (0xF1, _) => ResolvedVal::NontransientError,
                _ => ResolvedVal::NontransientError,
            };
            let ttl = r.take_u32()?;
            answers.push((val, ttl));
        }
        Ok(Resolved { answers })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        for (val, ttl) in self.answers {
            match val {
                ResolvedVal::Ip(IpAddr::V4(ip)) => {
                    w.write_u8(0x04);
                    w.write_u8(4);
                    w.write_all(&ip.octets());
                }
                ResolvedVal::Ip(IpAddr::V6(ip)) => {
                    w.write_u8(0x06);
                    w.write_u8(16);
                    w.write_all(&ip.octets());
                }
                ResolvedVal::Hostname(name) => {
                    w.write_u8(0x00);
                    let len: u8 = name.len().try_into().map_err(|_| BytesError::Oversized("field length exceeds wire limit"))?;
                    w.write_u8(len);
                    w.write_all(&name);
                }
                ResolvedVal::TransientError => {
                    w.write_u8(0xF0);
                    w.write_u8(0);
                }
                ResolvedVal::NontransientError => {
                    w.write_u8(0xF1);
                    w.write_u8(0);
                }
            }
            w.write_u32(ttl);
        }
        Ok(())
    }
}

/// Client to rendezvous point: establish a rendezvous cookie.
#[derive(Debug, Clone)]
pub struct EstablishRendezvous {
    /// A random 20-byte cookie chosen by the client.
    cookie: [u8; 20],
}
impl EstablishRendezvous {
    /// The fixed length of a rendezvous cookie.
    pub const COOKIE_LEN: usize = 20;
    /// Construct a new ESTABLISH_RENDEZVOUS message.
    pub fn new(cookie: [u8; Self::COOKIE_LEN]) -> Self {
        EstablishRendezvous { cookie }
    }
    /// Return the cookie.
    pub fn cookie(&self) -> &[u8; 20] {
        &self.cookie
    }
}
impl Body for EstablishRendezvous {
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        Ok(EstablishRendezvous {
            cookie: r.extract()?,
        })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write(&self.cookie)
    }
}

/// Acknowledges an EstablishRendezvous message.
#[derive(Debug, Clone, Default)]
pub struct RendezvousEstablished {}
impl RendezvousEstablished {
    /// Construct a new RENDEZVOUS_ESTABLISHED message.
    pub fn new() -> Self {
        Self::default()
    }
}
impl Body for RendezvousEstablished {
    fn decode_from_reader(_r: &mut Reader<'_>) -> Result<Self> {
        Ok(RendezvousEstablished {})
    }
    fn encode_onto<W: Writer + ?Sized>(self, _w: &mut W) -> EncodeResult<()> {
        Ok(())
    }
}

/// Client to introduction point.
///
/// The legacy 20-byte RSA key-ID field required by rend-spec-v3 is always
/// zero here: this core's introduction points are identified purely by
/// Ed25519 auth key, never by RSA identity.
#[derive(Debug, Clone)]
pub struct Introduce1 {
    /// The type of `auth_key` (always Ed25519/SHA3-256 in this core).
    auth_key_type: u8,
    /// The introduction point's per-service Ed25519 auth key.
    auth_key: Vec<u8>,
    /// The hs-ntor-encrypted introduction payload.
    encrypted: Vec<u8>,
}
impl Introduce1 {
    /// Ed25519-SHA3-256 auth key type, the only one this core produces.
    pub const AUTH_KEY_TYPE_ED25519_SHA3_256: u8 = 2;
    /// Construct a new INTRODUCE1 message.
    pub fn new(auth_key: Vec<u8>, encrypted: Vec<u8>) -> Self {
        Introduce1 {
            auth_key_type: Self::AUTH_KEY_TYPE_ED25519_SHA3_256,
            auth_key,
            encrypted,
        }
    }
    /// Return the encrypted introduction payload.
    pub fn encrypted(&self) -> &[u8] {
        &self.encrypted
    }
}
impl Body for Introduce1 {
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let legacy_key_id: [u8; 20] = r.extract()?;
        if legacy_key_id != [0_u8; 20] {
            return Err(BytesError::BadMessage("nonzero legacy key id in INTRODUCE1"));
        }
        let auth_key_type = r.take_u8()?;
        let auth_key_len = r.take_u16()?;
        let auth_key = r.take(auth_key_len as usize)?.into();
        let n_ext = r.take_u8()?;
        for _ in 0..n_ext {
            let _ext_type = r.take_u8()?;
            let ext_len = r.take_u8()?;
            r.advance(ext_len as usize)?;
        }
        let encrypted = r.take_rest().into();
        Ok(Introduce1 {
            auth_key_type,
            auth_key,
            encrypted,
        })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_all(&[0_u8; 20]);
        w.write_u8(self.auth_key_type);
        let len: u16 = self
            .auth_key
            .len()
            .try_into()
            .map_err(|_| BytesError::Oversized("field length exceeds wire limit"))?;
        w.write_u16(len);
        w.write_all(&self.auth_key);
        w.write_u8(0); // no extensions
        w.write_all(&self.encrypted);
        Ok(())
    }
}

caret_int! {
    /// Status reported in an INTRODUCE_ACK reply.
    pub struct IntroduceAckStatus(u16) {
        /// The introduction was relayed successfully.
        SUCCESS = 0x0000,
        /// The introduction point has no live circuit to the service.
        NOT_RECOGNIZED = 0x0001,
        /// The INTRODUCE1 message was malformed.
        BAD_MESSAGE_FORMAT = 0x0002,
        /// The introduction point could not relay the message.
        CANT_RELAY = 0x0003,
    }
}

/// Introduction point to client: acknowledges Introduce1.
#[derive(Debug, Clone)]
pub struct IntroduceAck {
    /// The status code.
    status: IntroduceAckStatus,
}
impl IntroduceAck {
    /// Construct a new INTRODUCE_ACK with the given status.
    pub fn new(status: IntroduceAckStatus) -> Self {
        IntroduceAck { status }
    }
    /// Return the status code.
    pub fn status(&self) -> IntroduceAckStatus {
        self.status
    }
}
impl Body for IntroduceAck {
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let status = r.take_u16()?.into();
        let n_ext = if r.remaining() > 0 { r.take_u8()? } else { 0 };
        for _ in 0..n_ext {
            let _ext_type = r.take_u8()?;
            let ext_len = r.take_u8()?;
            r.advance(ext_len as usize)?;
        }
        Ok(IntroduceAck { status })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_u16(self.status.into());
        w.write_u8(0); // no extensions
        Ok(())
    }
}

/// Service to rendezvous point: deliver the rendezvous handshake.
#[derive(Debug, Clone)]
pub struct Rendezvous1 {
    /// The rendezvous cookie the client originally chose.
    cookie: [u8; 20],
    /// The hs-ntor server handshake plus AUTH.
    message: Vec<u8>,
}
impl Rendezvous1 {
    /// Construct a new RENDEZVOUS1 message.
    pub fn new(cookie: [u8; 20], message: Vec<u8>) -> Self {
        Rendezvous1 { cookie, message }
    }
}
impl Body for Rendezvous1 {
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        let cookie = r.extract()?;
        let message = r.take_rest().into();
        Ok(Rendezvous1 { cookie, message })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write(&self.cookie)?;
        w.write_all(&self.message);
        Ok(())
    }
}

/// Rendezvous point to client: the service's half of the rendezvous
/// handshake.
#[derive(Debug, Clone)]
pub struct Rendezvous2 {
    /// The hs-ntor server handshake plus AUTH (copied verbatim from the
    /// Rendezvous1 the rendezvous point received).
    message: Vec<u8>,
}
impl Rendezvous2 {
    /// Construct a new RENDEZVOUS2 message.
    pub fn new(message: Vec<u8>) -> Self {
        Rendezvous2 { message }
    }
    /// Return the handshake bytes.
    pub fn message(&self) -> &[u8] {
        &self.message
    }
}
impl From<Rendezvous1> for Rendezvous2 {
    fn from(r1: Rendezvous1) -> Self {
        Rendezvous2 { message: r1.message }
    }
}
impl Body for Rendezvous2 {
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Rendezvous2 {
            message: r.take_rest().into(),
        })
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_all(&self.message);
        Ok(())
    }
}

/// A cell whose relay-command byte this core does not interpret.
#[derive(Debug, Clone)]
pub struct Unrecognized {
    /// The command byte.
    cmd: RelayCmd,
    /// Its raw body.
    body: Vec<u8>,
}
impl Unrecognized {
    /// Return the command byte.
    pub fn cmd(&self) -> RelayCmd {
        self.cmd
    }
    /// Return the raw body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
impl Body for Unrecognized {
    fn decode_from_reader(_r: &mut Reader<'_>) -> Result<Self> {
        Err(BytesError::BadMessage(
            "Unrecognized can only be built with its command byte",
        ))
    }
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()> {
        w.write_all(&self.body);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn begin_roundtrip() {
        let b = Begin::new("example.com", 80, 0).unwrap();
        let mut w = Vec::new();
        b.clone().encode_onto(&mut w).unwrap();
        let mut r = Reader::from_slice(&w);
        let b2 = Begin::decode_from_reader(&mut r).unwrap();
        r.should_be_exhausted().unwrap();
        assert_eq!(b2.addr(), b"example.com:80");
        assert_eq!(b2.port(), 80);
    }

    #[test]
    fn resolved_roundtrip() {
        let addr: IpAddr = "198.51.100.7".parse().unwrap();
        let res = Resolved::new_ip(addr, 300);
        let mut w = Vec::new();
        res.encode_onto(&mut w).unwrap();
        let mut r = Reader::from_slice(&w);
        let res2 = Resolved::decode_from_reader(&mut r).unwrap();
        match &res2.answers()[0] {
            (ResolvedVal::Ip(a), ttl) => {
                assert_eq!(*a, addr);
                assert_eq!(*ttl, 300);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn extend2_roundtrip() {
        let ls = vec![LinkSpec::OrPortV4(Ipv4Addr::new(192, 0, 2, 1), 9001)];
        let e = Extend2::new(ls, HandshakeType::NTOR, vec![1, 2, 3]);
        let mut w = Vec::new();
        e.encode_onto(&mut w).unwrap();
        let mut r = Reader::from_slice(&w);
        let e2 = Extend2::decode_from_reader(&mut r).unwrap();
        r.should_be_exhausted().unwrap();
        assert_eq!(e2.handshake(), &[1, 2, 3]);
        assert_eq!(e2.handshake_type(), HandshakeType::NTOR);
    }
}
