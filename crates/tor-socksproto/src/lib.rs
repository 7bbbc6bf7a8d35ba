//! Incremental encode/decode of a SOCKS5 proxy handshake (spec.md §4.8, §6
//! "SOCKS5 (local)").
//!
//! A real client writes the handshake in whatever chunks its TCP stack
//! hands back, which rarely line up with message boundaries. This crate
//! never reads from a socket itself: [`SocksProxyHandshake`] is fed
//! whatever bytes have arrived so far and reports either that it needs
//! more, that a reply should be written back before the client continues,
//! or that the request is fully parsed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod err;
mod msg;
mod request;

pub use err::{Error, Result, Truncated};
pub use msg::{SocksAddr, SocksAuth, SocksCmd, SocksStatus};
pub use request::SocksRequest;

use tor_bytes::Reader;

/// SOCKS protocol version byte, as sent on the wire.
const VERSION_5: u8 = 0x05;
/// "No authentication required" method (spec.md §6: "methods offered: 0x00, 0x02").
const AUTH_NONE: u8 = 0x00;
/// "Username/password" method (RFC 1929).
const AUTH_USERPASS: u8 = 0x02;
/// Version byte of the username/password sub-negotiation (RFC 1929 §2).
const USERPASS_VERSION: u8 = 0x01;

/// Where an in-progress handshake stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Waiting for the client's method-selection greeting.
    Greeting,
    /// Waiting for the username/password sub-negotiation.
    UserPass,
    /// Waiting for the CONNECT/RESOLVE/RESOLVE_PTR request.
    Request,
}

/// What to do after feeding more input to [`SocksProxyHandshake::handshake`].
#[derive(Debug)]
pub enum NextStep {
    /// Not enough bytes yet. Nothing was consumed; read more from the
    /// client and call `handshake` again with the larger buffer.
    Incomplete,
    /// Write `reply` back to the client, drop the first `consumed` bytes
    /// of the buffer, and call `handshake` again with what's left.
    Reply {
        /// How many bytes of the input this step consumed.
        consumed: usize,
        /// The bytes to write back to the client.
        reply: Vec<u8>,
    },
    /// The handshake is complete. Drop the first `consumed` bytes of the
    /// buffer; anything after that belongs to the proxied data stream, not
    /// the handshake.
    Finished {
        /// How many bytes of the input this step consumed.
        consumed: usize,
        /// The request the client made.
        request: SocksRequest,
    },
}

/// Incremental SOCKS5 handshake state machine: method negotiation, optional
/// username/password sub-negotiation, then the request itself.
#[derive(Clone, Debug)]
pub struct SocksProxyHandshake {
    state: State,
    auth: SocksAuth,
}

impl Default for SocksProxyHandshake {
    fn default() -> Self {
        Self::new()
    }
}

impl SocksProxyHandshake {
    /// Start a fresh handshake.
    pub fn new() -> Self {
        SocksProxyHandshake {
            state: State::Greeting,
            auth: SocksAuth::NoAuth,
        }
    }

    /// The reply to send, and the handshake to then abandon, when the
    /// client's greeting offered no method we accept.
    pub fn no_acceptable_method_reply() -> Vec<u8> {
        vec![VERSION_5, 0xFF]
    }

    /// Feed more bytes to the handshake.
    ///
    /// `input` should be every byte read from the client since the last
    /// call that consumed some (i.e. the caller owns draining a growing
    /// buffer; this type holds no buffer of its own).
    pub fn handshake(&mut self, input: &[u8]) -> Result<NextStep> {
        match self.state {
            State::Greeting => self.handshake_greeting(input),
            State::UserPass => self.handshake_userpass(input),
            State::Request => self.handshake_request(input),
        }
    }

    fn handshake_greeting(&mut self, input: &[u8]) -> Result<NextStep> {
        match parse_greeting(input) {
            Ok((consumed, methods)) => {
                if methods.contains(&AUTH_NONE) {
                    self.state = State::Request;
                    Ok(NextStep::Reply {
                        consumed,
                        reply: vec![VERSION_5, AUTH_NONE],
                    })
                } else if methods.contains(&AUTH_USERPASS) {
                    self.state = State::UserPass;
                    Ok(NextStep::Reply {
                        consumed,
                        reply: vec![VERSION_5, AUTH_USERPASS],
                    })
                } else {
                    Err(Error::NoSupportedMethod)
                }
            }
            Err(Error::Bytes(tor_bytes::Error::Truncated)) => Ok(NextStep::Incomplete),
            Err(e) => Err(e),
        }
    }

    fn handshake_userpass(&mut self, input: &[u8]) -> Result<NextStep> {
        match parse_userpass(input) {
            Ok((consumed, uname, passwd)) => {
                self.auth = SocksAuth::Username(uname, passwd);
                self.state = State::Request;
                Ok(NextStep::Reply {
                    consumed,
                    reply: vec![USERPASS_VERSION, 0x00],
                })
            }
            Err(Error::Bytes(tor_bytes::Error::Truncated)) => Ok(NextStep::Incomplete),
            Err(e) => Err(e),
        }
    }

    fn handshake_request(&mut self, input: &[u8]) -> Result<NextStep> {
        match parse_request(input, self.auth.clone()) {
            Ok((consumed, request)) => Ok(NextStep::Finished { consumed, request }),
            Err(Error::Bytes(tor_bytes::Error::Truncated)) => Ok(NextStep::Incomplete),
            Err(e) => Err(e),
        }
    }
}

/// Parse a method-selection greeting: `VER NMETHODS METHODS[NMETHODS]`.
fn parse_greeting(input: &[u8]) -> Result<(usize, Vec<u8>)> {
    let mut r = Reader::from_slice(input);
    let ver = r.take_u8()?;
    if ver != VERSION_5 {
        return Err(Error::BadProtocol(ver));
    }
    let nmethods = r.take_u8()?;
    let methods = r.take(nmethods as usize)?.to_vec();
    Ok((r.consumed(), methods))
}

/// Parse a username/password sub-negotiation (RFC 1929 §2):
/// `VER ULEN UNAME PLEN PASSWD`.
fn parse_userpass(input: &[u8]) -> Result<(usize, Vec<u8>, Vec<u8>)> {
    let mut r = Reader::from_slice(input);
    let ver = r.take_u8()?;
    if ver != USERPASS_VERSION {
        return Err(Error::Malformed(
            "unrecognized username/password sub-negotiation version",
        ));
    }
    let ulen = r.take_u8()?;
    let uname = r.take(ulen as usize)?.to_vec();
    let plen = r.take_u8()?;
    let passwd = r.take(plen as usize)?.to_vec();
    Ok((r.consumed(), uname, passwd))
}

/// Parse a request: `VER CMD RSV ATYP DST.ADDR DST.PORT`.
fn parse_request(input: &[u8], auth: SocksAuth) -> Result<(usize, SocksRequest)> {
    let mut r = Reader::from_slice(input);
    let ver = r.take_u8()?;
    if ver != VERSION_5 {
        return Err(Error::BadProtocol(ver));
    }
    let cmd: SocksCmd = r.take_u8()?.into();
    let _reserved = r.take_u8()?;
    let addr = SocksAddr::take_from(&mut r)?;
    let port = r.take_u16()?;
    Ok((r.consumed(), SocksRequest::new(cmd, addr, port, auth)))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn noauth_connect_roundtrip() {
        let mut hs = SocksProxyHandshake::new();
        let greeting = [0x05, 0x01, AUTH_NONE];
        let step = hs.handshake(&greeting).unwrap();
        let consumed = match step {
            NextStep::Reply { consumed, reply } => {
                assert_eq!(reply, vec![0x05, AUTH_NONE]);
                consumed
            }
            _ => panic!("expected a method-selection reply"),
        };
        assert_eq!(consumed, greeting.len());

        let mut request_bytes = vec![0x05, 0x01, 0x00, 0x01];
        request_bytes.extend_from_slice(&Ipv4Addr::new(198, 51, 100, 7).octets());
        request_bytes.extend_from_slice(&9001_u16.to_be_bytes());
        let sent_len = request_bytes.len();
        match hs.handshake(&request_bytes).unwrap() {
            NextStep::Finished { consumed, request } => {
                assert_eq!(consumed, sent_len);
                assert_eq!(request.command(), SocksCmd::CONNECT);
                assert_eq!(
                    request.addr(),
                    &SocksAddr::Ip(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7)))
                );
                assert_eq!(request.port(), 9001);
            }
            _ => panic!("expected a finished handshake"),
        }
    }

    #[test]
    fn split_across_two_reads_reports_incomplete() {
        let mut hs = SocksProxyHandshake::new();
        let first_half = [0x05, 0x01];
        assert!(matches!(
            hs.handshake(&first_half).unwrap(),
            NextStep::Incomplete
        ));
        let whole = [0x05, 0x01, AUTH_NONE];
        assert!(matches!(
            hs.handshake(&whole).unwrap(),
            NextStep::Reply { .. }
        ));
    }

    #[test]
    fn userpass_then_resolve() {
        let mut hs = SocksProxyHandshake::new();
        hs.handshake(&[0x05, 0x01, AUTH_USERPASS]).unwrap();

        let mut userpass = vec![USERPASS_VERSION, 5];
        userpass.extend_from_slice(b"alice");
        userpass.push(3);
        userpass.extend_from_slice(b"hi!");
        match hs.handshake(&userpass).unwrap() {
            NextStep::Reply { reply, .. } => assert_eq!(reply, vec![USERPASS_VERSION, 0x00]),
            _ => panic!("expected a userpass reply"),
        }

        let mut request = vec![0x05, 0xF0_u8, 0x00, 0x03];
        request.push(b"example.com".len() as u8);
        request.extend_from_slice(b"example.com");
        request.extend_from_slice(&0_u16.to_be_bytes());
        match hs.handshake(&request).unwrap() {
            NextStep::Finished { request, .. } => {
                assert_eq!(request.command(), SocksCmd::RESOLVE);
                assert_eq!(
                    request.auth(),
                    &SocksAuth::Username(b"alice".to_vec(), b"hi!".to_vec())
                );
            }
            _ => panic!("expected a finished handshake"),
        }
    }

    #[test]
    fn rejects_socks4() {
        let mut hs = SocksProxyHandshake::new();
        let err = hs.handshake(&[0x04, 0x01, 0x00]).unwrap_err();
        assert!(matches!(err, Error::BadProtocol(0x04)));
    }

    #[test]
    fn no_acceptable_method_is_refused() {
        let mut hs = SocksProxyHandshake::new();
        // Offers only an unsupported GSSAPI method (0x01).
        let err = hs.handshake(&[0x05, 0x01, 0x01]).unwrap_err();
        assert!(matches!(err, Error::NoSupportedMethod));
    }
}
