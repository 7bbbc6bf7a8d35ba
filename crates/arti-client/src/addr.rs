//! Types and traits for converting objects into addresses Tor can connect
//! to (spec.md §4.7 step 1, §4.8's "dest-host").
//!
//! A client shouldn't resolve a hostname locally before handing it to
//! Tor: doing so leaks the target to the local DNS resolver. [`TorAddr`] is
//! the address type every connect/resolve call in this crate takes;
//! [`IntoTorAddr`] is implemented for hostname-and-port sources that are
//! safe to convert without a local lookup. [`DangerouslyIntoTorAddr`] is a
//! separate, differently-named trait for IP-based sources, so that
//! "I already have an `IpAddr`, where did it come from?" stays a question
//! callers have to answer.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

use tor_hscrypto::addr::OnionAddress;

/// An error parsing or constructing a [`TorAddr`].
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TorAddrError {
    /// The hostname half of a `"host:port"` string was empty, or contained
    /// characters no valid hostname or `.onion` address can contain.
    #[error("invalid hostname: {0}")]
    InvalidHostname(String),

    /// The port half of a `"host:port"` string wasn't a valid `u16`, or was
    /// missing entirely.
    #[error("invalid or missing port")]
    InvalidPort,

    /// The hostname looked like a `.onion` address but didn't parse as one.
    #[error("invalid onion address: {0}")]
    InvalidOnionAddress(#[from] tor_hscrypto::Error),
}

/// What a [`TorAddr`] names: an ordinary hostname, a `.onion` address, or a
/// literal IP (only reachable through [`DangerouslyIntoTorAddr`]).
#[derive(Clone, Debug)]
enum Kind {
    /// A DNS hostname, to be resolved by the exit relay.
    Hostname(String),
    /// A v3 onion-service identity.
    Onion(OnionAddress),
    /// A literal IP address.
    Ip(IpAddr),
}

/// An address that can be connected to over the Tor network: a hostname,
/// `.onion` address, or (if the caller asserts it came from somewhere safe)
/// a literal IP, plus a port.
#[derive(Clone, Debug)]
pub struct TorAddr {
    kind: Kind,
    port: u16,
}

impl TorAddr {
    /// The port this address should be connected to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// If this address names a `.onion` service, its parsed identity.
    pub fn onion_address(&self) -> Option<OnionAddress> {
        match &self.kind {
            Kind::Onion(addr) => Some(*addr),
            _ => None,
        }
    }

    /// The string to put in a relay `BEGIN` cell's host field: the
    /// hostname, the `.onion`-suffixed address, or the IP's string form.
    pub fn host_str(&self) -> String {
        match &self.kind {
            Kind::Hostname(h) => h.clone(),
            Kind::Onion(addr) => addr.to_onion_string(),
            Kind::Ip(ip) => ip.to_string(),
        }
    }

    /// A literal IPv4 address this address names, if it is one (used by
    /// exit-policy matching, spec.md §4.6 `ExitConstraint::Target`).
    pub fn ip(&self) -> Option<std::net::Ipv4Addr> {
        match &self.kind {
            Kind::Ip(IpAddr::V4(v4)) => Some(*v4),
            _ => None,
        }
    }

    /// Parse `"host:port"` or a bare `.onion` address with no port.
    fn parse(s: &str) -> Result<Self, TorAddrError> {
        let (host, port_str) = s
            .rsplit_once(':')
            .ok_or(TorAddrError::InvalidPort)?;
        if host.is_empty() {
            return Err(TorAddrError::InvalidHostname(s.to_string()));
        }
        let port: u16 = port_str.parse().map_err(|_| TorAddrError::InvalidPort)?;
        Self::from_host_and_port(host, port)
    }

    /// Build a [`TorAddr`] from an already-split hostname and port,
    /// recognizing a `.onion` suffix.
    fn from_host_and_port(host: &str, port: u16) -> Result<Self, TorAddrError> {
        if host.ends_with(".onion") {
            let onion = OnionAddress::parse(host)?;
            return Ok(TorAddr {
                kind: Kind::Onion(onion),
                port,
            });
        }
        if host.parse::<IpAddr>().is_ok() {
            return Err(TorAddrError::InvalidHostname(
                "use DangerouslyIntoTorAddr for a literal IP".into(),
            ));
        }
        Ok(TorAddr {
            kind: Kind::Hostname(host.to_string()),
            port,
        })
    }
}

impl fmt::Display for TorAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host_str(), self.port)
    }
}

/// An object that can be converted to a [`TorAddr`] with a minimum of risk:
/// a hostname (or `.onion` address) and a port, from a source that hasn't
/// already done a local DNS lookup.
pub trait IntoTorAddr {
    /// Try to make a [`TorAddr`] to represent connecting to this address.
    fn into_tor_addr(self) -> Result<TorAddr, TorAddrError>;
}

/// An object that can be converted to a [`TorAddr`], but which it might be
/// risky to get in the first place: if the `IpAddr` came from a local DNS
/// lookup, using it has already leaked the target hostname.
pub trait DangerouslyIntoTorAddr {
    /// Try to make a [`TorAddr`] to represent connecting to `self`. By
    /// calling this, the caller asserts `self` did not come from a local
    /// hostname lookup.
    fn into_tor_addr_dangerously(self) -> Result<TorAddr, TorAddrError>;
}

impl IntoTorAddr for &str {
    fn into_tor_addr(self) -> Result<TorAddr, TorAddrError> {
        TorAddr::parse(self)
    }
}

impl IntoTorAddr for (&str, u16) {
    fn into_tor_addr(self) -> Result<TorAddr, TorAddrError> {
        TorAddr::from_host_and_port(self.0, self.1)
    }
}

impl IntoTorAddr for (String, u16) {
    fn into_tor_addr(self) -> Result<TorAddr, TorAddrError> {
        TorAddr::from_host_and_port(&self.0, self.1)
    }
}

impl IntoTorAddr for TorAddr {
    fn into_tor_addr(self) -> Result<TorAddr, TorAddrError> {
        Ok(self)
    }
}

impl DangerouslyIntoTorAddr for SocketAddr {
    fn into_tor_addr_dangerously(self) -> Result<TorAddr, TorAddrError> {
        Ok(TorAddr {
            kind: Kind::Ip(self.ip()),
            port: self.port(),
        })
    }
}

impl DangerouslyIntoTorAddr for (IpAddr, u16) {
    fn into_tor_addr_dangerously(self) -> Result<TorAddr, TorAddrError> {
        Ok(TorAddr {
            kind: Kind::Ip(self.0),
            port: self.1,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_hostname_and_port() {
        let addr = "example.com:443".into_tor_addr().unwrap();
        assert_eq!(addr.port(), 443);
        assert_eq!(addr.host_str(), "example.com");
        assert!(addr.onion_address().is_none());
    }

    #[test]
    fn recognizes_onion_suffix() {
        // A syntactically valid (if semantically meaningless) v3 address.
        let onion = "2gzyxa5ihm7nsggfxnu52rck2vv4rvmdlkiu3zzui5du4xyclen53id.onion:80";
        let addr = onion.into_tor_addr().unwrap();
        assert_eq!(addr.port(), 80);
        assert!(addr.onion_address().is_some());
    }

    #[test]
    fn rejects_literal_ip_without_dangerous_opt_in() {
        assert!("127.0.0.1:80".into_tor_addr().is_err());
    }

    #[test]
    fn accepts_literal_ip_via_dangerous_trait() {
        let sa: SocketAddr = "127.0.0.1:80".parse().unwrap();
        let addr = sa.into_tor_addr_dangerously().unwrap();
        assert_eq!(addr.ip(), Some(std::net::Ipv4Addr::new(127, 0, 0, 1)));
    }

    #[test]
    fn rejects_missing_port() {
        assert!("example.com".into_tor_addr().is_err());
    }
}
