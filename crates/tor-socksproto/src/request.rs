//! A fully-parsed SOCKS request, and encoding of the reply to it.

use tor_bytes::Writer;

use crate::err::Result;
use crate::msg::{SocksAddr, SocksAuth, SocksCmd, SocksStatus};

/// SOCKS protocol version byte, as sent on the wire.
const VERSION_5: u8 = 0x05;
/// Reserved byte in the request/reply, always zero.
const RESERVED: u8 = 0x00;

/// A parsed SOCKS5 request: what a client asked us to do, plus whatever
/// authentication it presented along the way.
#[derive(Clone, Debug)]
pub struct SocksRequest {
    /// What the client wants us to do.
    command: SocksCmd,
    /// The destination the client gave us.
    addr: SocksAddr,
    /// The destination port.
    port: u16,
    /// Authentication the client presented while negotiating the
    /// connection, if any.
    auth: SocksAuth,
}

impl SocksRequest {
    /// Construct a request from its already-parsed fields.
    pub(crate) fn new(command: SocksCmd, addr: SocksAddr, port: u16, auth: SocksAuth) -> Self {
        SocksRequest {
            command,
            addr,
            port,
            auth,
        }
    }

    /// The command the client asked us to perform.
    pub fn command(&self) -> SocksCmd {
        self.command
    }

    /// The destination address the client gave us.
    pub fn addr(&self) -> &SocksAddr {
        &self.addr
    }

    /// The destination port the client gave us.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The authentication the client presented.
    pub fn auth(&self) -> &SocksAuth {
        &self.auth
    }

    /// Encode a reply to this request with the given `status` and, if we
    /// have one, the address we actually bound or resolved to.
    ///
    /// If `addr` is `None`, the reply carries an unspecified (`0.0.0.0:0`)
    /// bound address, which is what real SOCKS5 clients expect when we have
    /// nothing meaningful to report (this is what happens for ordinary
    /// `CONNECT` replies: we never learn, let alone report, the exit's own
    /// IP).
    pub fn reply(&self, status: SocksStatus, addr: Option<&SocksAddr>) -> Result<Vec<u8>> {
        let mut w = Vec::new();
        w.write_u8(VERSION_5);
        w.write_u8(status.into());
        w.write_u8(RESERVED);
        match addr {
            Some(a) => a.write_onto(&mut w)?,
            None => SocksAddr::unspecified().write_onto(&mut w)?,
        }
        // The bound port; we never have a real one to report, so zero it.
        w.write_u16(0);
        Ok(w)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn reply_encodes_unspecified_bound_addr() {
        let req = SocksRequest::new(
            SocksCmd::CONNECT,
            SocksAddr::Ip(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            9050,
            SocksAuth::NoAuth,
        );
        let reply = req.reply(SocksStatus::SUCCEEDED, None).unwrap();
        assert_eq!(reply, vec![0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn reply_encodes_resolved_ip() {
        let req = SocksRequest::new(
            SocksCmd::RESOLVE,
            SocksAddr::Hostname("example.com".into()),
            0,
            SocksAuth::NoAuth,
        );
        let resolved = SocksAddr::Ip(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)));
        let reply = req
            .reply(SocksStatus::SUCCEEDED, Some(&resolved))
            .unwrap();
        assert_eq!(
            reply,
            vec![0x05, 0x00, 0x00, 0x01, 93, 184, 216, 34, 0, 0]
        );
    }
}
