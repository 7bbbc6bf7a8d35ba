//! Link specifiers: the encoded "how to reach the next hop" entries carried
//! inside an EXTEND2 cell.

use caret::caret_int;
use std::net::{Ipv4Addr, SocketAddr};
use tor_bytes::{EncodeResult, Readable, Reader, Result, Writeable, Writer};
use tor_llcrypto::pk::ed25519::Ed25519Identity;

use crate::ids::RsaIdentity;

caret_int! {
    /// The on-the-wire type tag of a [`LinkSpec`].
    pub struct LinkSpecType(u8) {
        /// IPv4 address and ORPort.
        ORPORT_V4 = 0,
        /// IPv6 address and ORPort.
        ORPORT_V6 = 1,
        /// Legacy RSA identity fingerprint.
        RSAID = 2,
        /// Ed25519 identity.
        ED25519ID = 3,
    }
}

/// One piece of "how to reach the relay we're extending to".
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LinkSpec {
    /// An IPv4 address and ORPort.
    OrPortV4(Ipv4Addr, u16),
    /// The relay's legacy RSA identity fingerprint.
    RsaId(RsaIdentity),
    /// The relay's Ed25519 identity.
    Ed25519Id(Ed25519Identity),
    /// A link specifier type this core doesn't recognize; kept as an opaque
    /// blob so it can be re-encoded unchanged rather than silently dropped.
    Unrecognized(LinkSpecType, Vec<u8>),
}

impl LinkSpec {
    /// Return the wire type tag for this link specifier.
    fn lstype(&self) -> LinkSpecType {
        match self {
            LinkSpec::OrPortV4(..) => LinkSpecType::ORPORT_V4,
            LinkSpec::RsaId(_) => LinkSpecType::RSAID,
            LinkSpec::Ed25519Id(_) => LinkSpecType::ED25519ID,
            LinkSpec::Unrecognized(t, _) => *t,
        }
    }

    fn encode_body(&self, w: &mut Vec<u8>) -> EncodeResult<()> {
        match self {
            LinkSpec::OrPortV4(ip, port) => {
                w.write_all(&ip.octets());
                w.write_u16(*port);
            }
            LinkSpec::RsaId(id) => w.write_all(id.as_bytes()),
            LinkSpec::Ed25519Id(id) => w.write_all(id.as_bytes()),
            LinkSpec::Unrecognized(_, body) => w.write_all(body),
        }
        Ok(())
    }

    fn from_type_and_body(lstype: LinkSpecType, body: &[u8]) -> Result<Self> {
        Ok(match lstype {
            LinkSpecType::ORPORT_V4 => {
                if body.len() != 6 {
                    return Err(tor_bytes::Error::BadLengthField);
                }
                let ip = Ipv4Addr::new(body[0], body[1], body[2], body[3]);
                let port = u16::from_be_bytes([body[4], body[5]]);
                LinkSpec::OrPortV4(ip, port)
            }
            LinkSpecType::RSAID => {
                let id = RsaIdentity::from_bytes(body).ok_or(tor_bytes::Error::BadLengthField)?;
                LinkSpec::RsaId(id)
            }
            LinkSpecType::ED25519ID => {
                if body.len() != 32 {
                    return Err(tor_bytes::Error::BadLengthField);
                }
                let mut buf = [0_u8; 32];
                buf.copy_from_slice(body);
                LinkSpec::Ed25519Id(Ed25519Identity::new(buf))
            }
            other => LinkSpec::Unrecognized(other, body.to_vec()),
        })
    }
}

impl Readable for LinkSpec {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        let lstype: LinkSpecType = r.take_u8()?.into();
        let len = r.take_u8()? as usize;
        r.take_into(len, |inner| {
            let body = inner.take_rest();
            Self::from_type_and_body(lstype, body)
        })
    }
}

impl Writeable for LinkSpec {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) -> EncodeResult<()> {
        w.write_u8(self.lstype().into());
        let mut body = Vec::new();
        self.encode_body(&mut body)?;
        if body.len() > u8::MAX as usize {
            return Err(tor_bytes::Error::Oversized("link specifier body"));
        }
        w.write_u8(body.len() as u8);
        w.write_all(&body);
        Ok(())
    }
}

impl From<SocketAddr> for LinkSpec {
    fn from(sa: SocketAddr) -> Self {
        match sa {
            SocketAddr::V4(v4) => LinkSpec::OrPortV4(*v4.ip(), v4.port()),
            SocketAddr::V6(v6) => {
                // This core only targets IPv4 relay addresses; encode as an
                // unrecognized-but-roundtrippable blob rather than silently
                // dropping the address.
                let mut body = v6.ip().octets().to_vec();
                body.extend_from_slice(&v6.port().to_be_bytes());
                LinkSpec::Unrecognized(LinkSpecType::ORPORT_V6, body)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip_orport() {
        let ls = LinkSpec::OrPortV4(Ipv4Addr::new(192, 0, 2, 1), 9001);
        let mut w = Vec::new();
        ls.write_onto(&mut w).unwrap();
        let mut r = Reader::from_slice(&w);
        let back: LinkSpec = r.extract().unwrap();
        assert_eq!(ls, back);
    }

    #[test]
    fn roundtrip_ed25519id() {
        let ls = LinkSpec::Ed25519Id(Ed25519Identity::new([9_u8; 32]));
        let mut w = Vec::new();
        ls.write_onto(&mut w).unwrap();
        let mut r = Reader::from_slice(&w);
        let back: LinkSpec = r.extract().unwrap();
        assert_eq!(ls, back);
    }
}
