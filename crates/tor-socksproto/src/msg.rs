//! Types used in SOCKS requests and replies: commands, addresses,
//! authentication, and reply status codes.

use caret::caret_int;
use std::fmt;
use std::net::IpAddr;

use crate::err::{Error, Result};

caret_int! {
    /// A SOCKS client's requested command.
    ///
    /// Values 0xF0 and 0xF1 are Tor-specific extensions (not part of RFC
    /// 1928): a plain hostname-to-address lookup and its reverse, performed
    /// by the exit relay rather than locally.
    #[derive(Hash)]
    pub struct SocksCmd(u8) {
        /// Connect to a remote host and relay traffic.
        CONNECT = 0x01,
        /// Accept a connection from a remote host (unsupported here).
        BIND = 0x02,
        /// Relay UDP datagrams (unsupported here).
        UDP_ASSOCIATE = 0x03,
        /// Resolve a hostname to an address, over the Tor network.
        RESOLVE = 0xF0,
        /// Resolve an address to a hostname, over the Tor network.
        RESOLVE_PTR = 0xF1,
    }
}

caret_int! {
    /// A reply status code, sent back to the SOCKS client in our response.
    #[derive(Hash)]
    pub struct SocksStatus(u8) {
        /// Request granted.
        SUCCEEDED = 0x00,
        /// Catch-all failure: used whenever no more specific code applies.
        GENERAL_FAILURE = 0x01,
        /// Not allowed by ruleset (we use this for "address looks like an
        /// onion service but onion-service connections are disabled").
        NOT_ALLOWED = 0x02,
        /// The target network is unreachable.
        NETWORK_UNREACHABLE = 0x03,
        /// The target host is unreachable (exit `EXITPOLICY`/`NOROUTE`).
        HOST_UNREACHABLE = 0x04,
        /// The target refused the connection (exit `CONNECTREFUSED`).
        CONNECTION_REFUSED = 0x05,
        /// TTL expired en route (exit `TIMEOUT`).
        TTL_EXPIRED = 0x06,
        /// We don't implement the requested command.
        COMMAND_NOT_SUPPORTED = 0x07,
        /// We don't implement the requested address type.
        ADDRTYPE_NOT_SUPPORTED = 0x08,
    }
}

/// The SOCKS address type tag (RFC 1928 ATYP field).
mod atyp {
    /// IPv4 address.
    pub(super) const IPV4: u8 = 0x01;
    /// Fully-qualified domain name.
    pub(super) const DOMAINNAME: u8 = 0x03;
    /// IPv6 address.
    pub(super) const IPV6: u8 = 0x04;
}

/// An address as carried in a SOCKS request or reply.
///
/// Hostnames are kept un-resolved: per spec, only the exit relay resolves
/// them. We only resolve (or refuse) addresses that already look like
/// literal IPs.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SocksAddr {
    /// A literal IP address.
    Ip(IpAddr),
    /// An unresolved hostname, at most 255 bytes once encoded as UTF-8.
    Hostname(String),
}

impl SocksAddr {
    /// Construct a hostname address, checking that it will fit in the
    /// one-byte SOCKS length field.
    pub fn hostname(name: String) -> Result<Self> {
        if name.len() > u8::MAX as usize {
            return Err(Error::HostnameTooLong);
        }
        Ok(SocksAddr::Hostname(name))
    }

    /// Parse a `(ATYP, body)` pair out of `r`.
    ///
    /// Returns a plain [`tor_bytes::Error`] rather than our own [`Error`] so
    /// that callers driving the incremental handshake can tell a truncated
    /// read (need more bytes) apart from a malformed one (give up).
    pub(crate) fn take_from(r: &mut tor_bytes::Reader<'_>) -> tor_bytes::Result<Self> {
        let atyp = r.take_u8()?;
        match atyp {
            atyp::IPV4 => {
                let octets: [u8; 4] = r.take_array()?;
                Ok(SocksAddr::Ip(IpAddr::from(octets)))
            }
            atyp::IPV6 => {
                let octets: [u8; 16] = r.take_array()?;
                Ok(SocksAddr::Ip(IpAddr::from(octets)))
            }
            atyp::DOMAINNAME => {
                let len = r.take_u8()?;
                let bytes = r.take(len as usize)?;
                let name = std::str::from_utf8(bytes)
                    .map_err(|_| tor_bytes::Error::BadMessage("hostname is not UTF-8"))?;
                Ok(SocksAddr::Hostname(name.to_string()))
            }
            _ => Err(tor_bytes::Error::BadMessage(
                "unrecognized SOCKS address type",
            )),
        }
    }

    /// Encode this address onto `w`, as an (ATYP, body) pair.
    pub(crate) fn write_onto(&self, w: &mut Vec<u8>) -> Result<()> {
        use tor_bytes::Writer;
        match self {
            SocksAddr::Ip(IpAddr::V4(v4)) => {
                w.write_u8(atyp::IPV4);
                w.write_all(&v4.octets());
            }
            SocksAddr::Ip(IpAddr::V6(v6)) => {
                w.write_u8(atyp::IPV6);
                w.write_all(&v6.octets());
            }
            SocksAddr::Hostname(name) => {
                if name.len() > u8::MAX as usize {
                    return Err(Error::HostnameTooLong);
                }
                w.write_u8(atyp::DOMAINNAME);
                w.write_u8(name.len() as u8);
                w.write_all(name.as_bytes());
            }
        }
        Ok(())
    }

    /// A "don't care" address to fill the BND.ADDR field of a reply that
    /// isn't reporting a real bound address.
    pub(crate) fn unspecified() -> Self {
        SocksAddr::Ip(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED))
    }
}

impl fmt::Display for SocksAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksAddr::Ip(ip) => write!(f, "{}", ip),
            SocksAddr::Hostname(h) => write!(f, "{}", h),
        }
    }
}

/// Authentication data a SOCKS client presented when connecting.
///
/// We never check credentials against anything: spec.md §4.8 says
/// usernames and passwords are "not checked but are captured and fed into
/// the isolation key". This type exists to carry them that far, and to keep
/// them out of `Debug` output and logs otherwise.
#[derive(Clone, PartialEq, Eq, educe::Educe)]
#[educe(Debug)]
#[non_exhaustive]
pub enum SocksAuth {
    /// No authentication was offered or required.
    NoAuth,
    /// A username/password pair (RFC 1929), as raw bytes: SOCKS usernames
    /// and passwords are not necessarily valid UTF-8.
    Username(
        #[educe(Debug(method = "fmt_redacted"))] Vec<u8>,
        #[educe(Debug(method = "fmt_redacted"))] Vec<u8>,
    ),
}

/// `educe(Debug)` helper: format a captured credential as redacted.
fn fmt_redacted<T>(_val: &T, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[scrubbed]")
}
