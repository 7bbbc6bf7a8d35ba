//! The link connection: TLS to a relay's OR port, the VERSIONS/NETINFO
//! handshake, and per-circuit cell dispatch (spec.md §4.3, §5).
//!
//! A [`Channel`] is cheap to clone and is shared by every circuit built on
//! it. It owns one reader task (demultiplexing inbound cells to whichever
//! circuit's dispatch channel matches their circuit ID) and one writer task
//! (draining an outbound queue fed by every circuit's [`CircChannel::send`]).
//! Per spec.md §5, "the circuit ID allocator...is single-threaded, owned by
//! the link writer task"; here that single-threading is a mutex around the
//! allocator and dispatch table rather than a dedicated task, since both
//! operations are non-blocking and never held across an `.await`.

pub(crate) mod codec;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_rustls::{client::TlsStream, TlsConnector};
use tokio_util::codec::Framed;
use tor_bytes::Reader;
use tor_cell::chancell::msg::{AnyChanMsg, Netinfo, Versions};
use tor_cell::chancell::{AnyChanCell, ChanCmd, ChanMsg, CircId};
use tor_linkspec::ChanTarget;

use crate::err::{Error, Result};
use codec::TokioChannelCodec;

/// Link protocol versions this core offers in its VERSIONS cell (spec.md
/// §4.3).
const OFFERED_VERSIONS: [u16; 3] = [3, 4, 5];
/// The lowest link protocol version this core accepts: the first to use
/// 4-byte circuit IDs, which every later cell on this connection assumes.
const MIN_LINK_VERSION: u16 = 4;

type TlsIo = TlsStream<TcpStream>;

/// An established link connection to one relay.
///
/// Cloning a `Channel` is cheap: every clone shares the same outbound queue
/// and circuit dispatch table. The underlying socket closes once the peer
/// hangs up (or the reader/writer tasks otherwise exit); existing
/// [`CircChannel`]s then observe [`Error::ChannelClosed`] on their next call.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

struct Inner {
    to_writer: mpsc::UnboundedSender<AnyChanCell>,
    link_version: u16,
    table: Arc<Mutex<CircuitTable>>,
}

/// The circuit ID allocator and cell-dispatch map for one link connection.
struct CircuitTable {
    next_id: u32,
    by_id: HashMap<CircId, mpsc::UnboundedSender<AnyChanMsg>>,
}

/// A circuit's private handle onto its link connection: the circuit ID it
/// was allocated, a way to send cells on it, and the channel the reader task
/// feeds with cells addressed to it.
pub struct CircChannel {
    circ_id: CircId,
    channel: Channel,
    from_reader: mpsc::UnboundedReceiver<AnyChanMsg>,
}

impl CircChannel {
    /// This circuit's ID on its link connection.
    pub fn circ_id(&self) -> CircId {
        self.circ_id
    }

    /// Send a cell addressed to this circuit.
    pub fn send(&self, msg: AnyChanMsg) -> Result<()> {
        let cell = AnyChanCell::new(Some(self.circ_id), msg);
        self.channel
            .inner
            .to_writer
            .send(cell)
            .map_err(|_| Error::ChannelClosed)
    }

    /// Receive the next cell the link connection's reader task routed to
    /// this circuit.
    pub async fn recv(&mut self) -> Result<AnyChanMsg> {
        self.from_reader.recv().await.ok_or(Error::ChannelClosed)
    }

    /// The link connection this circuit is built on, for extending it to a
    /// further hop or opening a sibling circuit.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}

impl Drop for CircChannel {
    fn drop(&mut self) {
        self.channel.retire_circuit(self.circ_id);
    }
}

/// Accepts any TLS certificate the relay presents.
///
/// Tor relays don't carry WebPKI certificates, and this core doesn't parse
/// the CERTS-cell identity chain real Tor clients check: a circuit only
/// trusts a hop once CREATE2/EXTEND2's ntor handshake authenticates its
/// onion key (`crypto::handshake::client_handshake2`), which is independent
/// of anything presented at the TLS layer. The TLS handshake here exists
/// only to get an encrypted, tamper-evident pipe to the right address.
#[derive(Debug)]
struct NoCertVerification;

impl rustls::client::danger::ServerCertVerifier for NoCertVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
        ]
    }
}

fn tls_connector() -> TlsConnector {
    let mut config = rustls::ClientConfig::builder()
        .with_root_certificates(rustls::RootCertStore::empty())
        .with_no_client_auth();
    config
        .dangerous()
        .set_certificate_verifier(Arc::new(NoCertVerification));
    TlsConnector::from(Arc::new(config))
}

impl Channel {
    /// This link connection's negotiated link protocol version.
    pub fn link_version(&self) -> u16 {
        self.inner.link_version
    }

    /// Dial `target`'s OR port and complete the VERSIONS/NETINFO handshake
    /// (spec.md §4.3: "Establishes TLS...exchanges a VERSIONS cell...Then
    /// exchanges NETINFO").
    pub async fn dial<T: ChanTarget + ?Sized>(target: &T, deadline: Duration) -> Result<Channel> {
        let addr = target.addr();
        tracing::debug!(%addr, ids = %target.ids(), "dialing link connection");

        let tcp = timeout(deadline, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::HandshakeTimeout)??;
        tcp.set_nodelay(true).ok();

        let connector = tls_connector();
        // Never checked by either side (the server doesn't vhost by SNI;
        // `NoCertVerification` skips our own check), so any valid
        // `ServerName` will do.
        let server_name = ServerName::IpAddress(addr.ip().into());
        let mut tls = timeout(deadline, connector.connect(server_name, tcp))
            .await
            .map_err(|_| Error::HandshakeTimeout)??;

        let link_version = timeout(deadline, send_versions(&mut tls))
            .await
            .map_err(|_| Error::HandshakeTimeout)??;

        let mut framed = Framed::new(tls, TokioChannelCodec::new(link_version));

        let my_netinfo = AnyChanCell::new(
            None,
            AnyChanMsg::Netinfo(Netinfo::from_client(Some(addr.ip()))),
        );
        timeout(deadline, framed.send(my_netinfo))
            .await
            .map_err(|_| Error::HandshakeTimeout)??;
        timeout(deadline, await_netinfo(&mut framed))
            .await
            .map_err(|_| Error::HandshakeTimeout)??;

        Ok(Channel::spawn(framed, link_version))
    }

    fn spawn(framed: Framed<TlsIo, TokioChannelCodec>, link_version: u16) -> Channel {
        let (sink, mut stream) = framed.split();
        let (to_writer, mut from_callers) = mpsc::unbounded_channel::<AnyChanCell>();
        let table = Arc::new(Mutex::new(CircuitTable {
            next_id: 0,
            by_id: HashMap::new(),
        }));

        tokio::spawn(async move {
            let mut sink = sink;
            while let Some(cell) = from_callers.recv().await {
                if sink.send(cell).await.is_err() {
                    break;
                }
            }
        });

        {
            let table = table.clone();
            tokio::spawn(async move {
                loop {
                    match stream.next().await {
                        Some(Ok(cell)) => {
                            let (circid, msg) = cell.into_circid_and_msg();
                            if let Some(circid) = circid {
                                let sender = table
                                    .lock()
                                    .expect("channel circuit table poisoned")
                                    .by_id
                                    .get(&circid)
                                    .cloned();
                                if let Some(sender) = sender {
                                    let _ = sender.send(msg);
                                }
                                // No dispatch entry: a cell for a circuit we
                                // already tore down. Drop it.
                            }
                            // Channel-wide messages after the handshake
                            // (further NETINFO, PADDING, ...) carry nothing
                            // this core acts on.
                        }
                        Some(Err(_)) | None => break,
                    }
                }
                // Link closed: drop every circuit's sender so each circuit
                // reactor observes closure on its next `recv`.
                table
                    .lock()
                    .expect("channel circuit table poisoned")
                    .by_id
                    .clear();
            });
        }

        Channel {
            inner: Arc::new(Inner {
                to_writer,
                link_version,
                table,
            }),
        }
    }

    /// Allocate a circuit ID and register its dispatch entry (spec.md §4.4
    /// build-sequence step 1). Client-originated circuit IDs always have
    /// the high bit set (spec.md §3).
    pub fn new_circuit(&self) -> Result<CircChannel> {
        let mut table = self
            .inner
            .table
            .lock()
            .expect("channel circuit table poisoned");
        let start = table.next_id;
        loop {
            table.next_id = table.next_id.wrapping_add(1) | 0x8000_0000;
            let circid = CircId::new(table.next_id).expect("nonzero by construction");
            if !table.by_id.contains_key(&circid) {
                let (tx, rx) = mpsc::unbounded_channel();
                table.by_id.insert(circid, tx);
                return Ok(CircChannel {
                    circ_id: circid,
                    channel: self.clone(),
                    from_reader: rx,
                });
            }
            if table.next_id == start {
                return Err(Error::IdRangeFull);
            }
        }
    }

    fn retire_circuit(&self, circ_id: CircId) {
        self.inner
            .table
            .lock()
            .expect("channel circuit table poisoned")
            .by_id
            .remove(&circ_id);
    }
}

/// Send our VERSIONS cell and read the peer's, returning the best shared
/// link protocol version.
///
/// VERSIONS is always framed with the obsolete 2-byte circuit ID
/// (`Versions::encode_for_handshake`'s doc comment) regardless of which
/// version we end up negotiating, since that framing hasn't taken effect
/// yet.
async fn send_versions(tls: &mut TlsIo) -> Result<u16> {
    let ours = Versions::new(OFFERED_VERSIONS.to_vec())?.encode_for_handshake()?;
    tls.write_all(&ours).await?;

    let mut header = [0_u8; 5];
    tls.read_exact(&mut header).await?;
    let mut hr = Reader::from_slice(&header);
    let _legacy_circid: u16 = hr.extract()?;
    let cmd: u8 = hr.extract()?;
    if cmd != u8::from(ChanCmd::VERSIONS) {
        return Err(Error::LinkProtocolViolation("expected VERSIONS cell first"));
    }
    let len: u16 = hr.extract()?;
    let mut body = vec![0_u8; len as usize];
    tls.read_exact(&mut body).await?;
    let peer_versions: Versions = Reader::from_slice(&body).extract()?;

    peer_versions
        .best_shared_link_protocol(&OFFERED_VERSIONS)
        .filter(|v| *v >= MIN_LINK_VERSION)
        .ok_or(Error::NoSharedLinkProtocol)
}

/// Wait for the peer's NETINFO cell, ignoring anything else it sends first.
///
/// This core doesn't validate the CERTS/AUTH_CHALLENGE link-authentication
/// chain (see `NoCertVerification`), so those cells, if sent, are simply
/// skipped here rather than processed.
async fn await_netinfo(framed: &mut Framed<TlsIo, TokioChannelCodec>) -> Result<Netinfo> {
    for _ in 0..8 {
        let cell = framed.next().await.ok_or(Error::ChannelClosed)??;
        let (_circid, msg) = cell.into_circid_and_msg();
        if let AnyChanMsg::Netinfo(n) = msg {
            return Ok(n);
        }
    }
    Err(Error::LinkProtocolViolation("peer never sent NETINFO"))
}
