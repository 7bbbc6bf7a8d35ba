//! The circuit state machine (spec.md §4.4): `CREATE2`/`CREATED2` and
//! `EXTEND2`/`EXTENDED2` to build a path, onion-layered encryption of every
//! relay cell sent or received on it, SENDME-based flow control, and
//! `DESTROY` propagation.
//!
//! Building a circuit (`Circuit::build`) is a synchronous hop-by-hop
//! exchange directly over the allocated [`CircChannel`]: `None -> Building`.
//! Once every hop is up, [`Circuit::build`] spawns a reactor task that owns
//! the circuit for the rest of its life (`Open` through `Closed`),
//! multiplexing streams over it and applying flow control; the returned
//! [`Circuit`] is just a handle that posts commands to that task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::OsRng;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::time::timeout;

use tor_cell::chancell::msg::{AnyChanMsg, Create2, Created2, Destroy, HandshakeType};
use tor_cell::relaycell::msg::{
    AnyRelayMsg, BeginDir, Data, EndReason, Extend2, Extended2, Relay, Resolve, Sendme,
};
use tor_cell::relaycell::{AnyRelayMsgOuter, StreamId};
use tor_linkspec::{LinkSpec, RelayIds};
use tor_llcrypto::pk::curve25519;

use crate::channel::{Channel, CircChannel};
use crate::crypto::cell::CircuitCrypto;
use crate::crypto::handshake::{client_handshake, client_handshake2, NtorClientState, NtorKeys};
use crate::err::{Error, Result};
use crate::stream::{Stream, StreamEvent};

/// The initial circuit-level SENDME window, and the number of cells
/// acknowledged by each SENDME (spec.md §4.4 "flow control").
const CIRCUIT_WINDOW: usize = 1000;
/// How many cells a circuit-level SENDME acknowledges.
const CIRCUIT_WINDOW_INCREMENT: usize = 100;
/// The initial per-stream SENDME window.
const STREAM_WINDOW: usize = 500;
/// How many cells a stream-level SENDME acknowledges.
const STREAM_WINDOW_INCREMENT: usize = 50;

/// One hop to build a circuit through: everything [`Circuit::build`] needs
/// to dial and handshake with it, detached from whatever directory type
/// (`tor_netdir::Relay`, a guard entry, an onion descriptor's link
/// specifiers) it was chosen from.
#[derive(Clone, Debug)]
pub struct PathHop {
    /// The hop's identities, for guard/path-selection bookkeeping.
    pub ids: RelayIds,
    /// The EXTEND2 link specifiers naming this hop to the previous one.
    pub linkspecs: Vec<LinkSpec>,
    /// The hop's ntor onion key.
    pub ntor_key: curve25519::PublicKey,
}

/// One hop of a built circuit, kept for reporting back to the guard
/// manager and path selector.
#[derive(Clone, Debug)]
pub struct HopInfo {
    /// The hop's identities.
    pub ids: RelayIds,
}

/// A handle to an open (or opening) circuit.
///
/// Cheap to clone: every clone posts commands to the same reactor task.
#[derive(Clone)]
pub struct Circuit {
    inner: Arc<CircuitState>,
}

struct CircuitState {
    to_reactor: mpsc::UnboundedSender<ReactorCommand>,
    hops: Vec<HopInfo>,
    built_at: Instant,
    /// Shared with every [`Stream`] opened on this circuit: the circuit-wide
    /// outbound flow-control window (spec.md §4.4 "package_window").
    send_window: Arc<Semaphore>,
}

/// A command posted to a circuit's reactor task.
pub(crate) enum ReactorCommand {
    /// Allocate a stream ID, send `msg` as its opening cell, and register a
    /// dispatch channel for later events on that stream.
    OpenStream {
        msg: AnyRelayMsg,
        reply: oneshot::Sender<
            Result<(StreamId, mpsc::UnboundedReceiver<StreamEvent>, Arc<Semaphore>)>,
        >,
    },
    /// Send a relay message already addressed to an open stream (or, with
    /// `stream_id: None`, to the circuit as a whole).
    SendRelay {
        stream_id: Option<StreamId>,
        msg: AnyRelayMsg,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Drop a stream's dispatch entry; best-effort, no reply expected.
    EndStream { stream_id: StreamId },
    /// Install an extra hop's key material without an EXTEND2 round trip
    /// (spec.md §4.7 step 8: the rendezvous circuit's last hop is added
    /// once hs-ntor completes locally, not via an EXTEND2 the rendezvous
    /// point would have no way to forward).
    InstallHop {
        keys: NtorKeys,
        reply: oneshot::Sender<()>,
    },
    /// Wait for the next circuit-level (no stream ID) relay message, used
    /// for the onion-service control exchanges that don't open a stream:
    /// RENDEZVOUS_ESTABLISHED after ESTABLISH_RENDEZVOUS, INTRODUCE_ACK
    /// after INTRODUCE1, and the unsolicited RENDEZVOUS2 that follows later
    /// (spec.md §4.7 steps 5-8).
    AwaitControl {
        reply: oneshot::Sender<Result<AnyRelayMsg>>,
    },
}

impl Circuit {
    /// Build a circuit through `path` on `channel`'s first hop, then extend
    /// it to every later hop (spec.md §4.4 build sequence).
    pub async fn build(channel: &Channel, path: &[PathHop], deadline: Duration) -> Result<Circuit> {
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| Error::Internal(tor_error::internal!("empty path")))?;

        let mut circ = channel.new_circuit()?;
        let mut crypto = CircuitCrypto::new();
        let mut hops = Vec::with_capacity(path.len());

        let keys = timeout(deadline, create_first_hop(&mut circ, first)).await.map_err(|_| Error::HandshakeTimeout)??;
        crypto.add_hop(&keys);
        hops.push(HopInfo {
            ids: first.ids.clone(),
        });

        for next in rest {
            let keys = timeout(deadline, extend_one_hop(&mut circ, &mut crypto, next))
                .await
                .map_err(|_| Error::HandshakeTimeout)??;
            crypto.add_hop(&keys);
            hops.push(HopInfo {
                ids: next.ids.clone(),
            });
        }

        Ok(Circuit::spawn(circ, crypto, hops))
    }

    /// This circuit's hops, guard first.
    pub fn hops(&self) -> &[HopInfo] {
        &self.inner.hops
    }

    /// How long ago this circuit finished building (spec.md §4.4
    /// `MaxDirtiness`).
    pub fn age(&self) -> Duration {
        self.inner.built_at.elapsed()
    }

    /// Open an application data stream (spec.md §4.5 `BEGIN`).
    pub async fn begin_stream(
        &self,
        host: &str,
        port: u16,
        flags: impl Into<tor_cell::relaycell::msg::BeginFlags>,
    ) -> Result<Stream> {
        let begin = tor_cell::relaycell::msg::Begin::new(host, port, flags)?;
        self.open_stream(AnyRelayMsg::Begin(begin)).await
    }

    /// Open a directory stream (spec.md §4.7 descriptor fetch: `BEGIN_DIR`).
    pub async fn begin_dir_stream(&self) -> Result<Stream> {
        self.open_stream(AnyRelayMsg::BeginDir(BeginDir::new()))
            .await
    }

    /// Resolve a hostname over this circuit (spec.md §4.8 SOCKS `RESOLVE`).
    pub async fn resolve_stream(&self, hostname: &str) -> Result<Stream> {
        self.open_stream(AnyRelayMsg::Resolve(Resolve::new(hostname)))
            .await
    }

    /// Install the key material derived from completing hs-ntor with a
    /// rendezvous point's ephemeral key (spec.md §4.7 step 8), making it a
    /// new onion-crypto layer at the far end of this circuit. After this
    /// call, relay cells sent on the circuit are onion-wrapped one layer
    /// deeper, addressed past the rendezvous point to the service itself.
    pub async fn install_virtual_hop(&self, keys: NtorKeys) -> Result<()> {
        let (reply, reply_rx) = oneshot::channel();
        self.inner
            .to_reactor
            .send(ReactorCommand::InstallHop { keys, reply })
            .map_err(|_| Error::CircuitClosed)?;
        reply_rx.await.map_err(|_| Error::CircuitClosed)
    }

    /// Send a relay message addressed to the circuit as a whole, not to any
    /// stream (spec.md §4.7's ESTABLISH_RENDEZVOUS/INTRODUCE1).
    pub async fn send_control(&self, msg: AnyRelayMsg) -> Result<()> {
        let (reply, reply_rx) = oneshot::channel();
        self.inner
            .to_reactor
            .send(ReactorCommand::SendRelay {
                stream_id: None,
                msg,
                reply,
            })
            .map_err(|_| Error::CircuitClosed)?;
        reply_rx.await.map_err(|_| Error::CircuitClosed)?
    }

    /// Wait for the next circuit-level relay message to arrive (spec.md
    /// §4.7's RENDEZVOUS_ESTABLISHED/INTRODUCE_ACK/RENDEZVOUS2).
    pub async fn await_control(&self) -> Result<AnyRelayMsg> {
        let (reply, reply_rx) = oneshot::channel();
        self.inner
            .to_reactor
            .send(ReactorCommand::AwaitControl { reply })
            .map_err(|_| Error::CircuitClosed)?;
        reply_rx.await.map_err(|_| Error::CircuitClosed)?
    }

    async fn open_stream(&self, msg: AnyRelayMsg) -> Result<Stream> {
        let (reply, reply_rx) = oneshot::channel();
        self.inner
            .to_reactor
            .send(ReactorCommand::OpenStream { msg, reply })
            .map_err(|_| Error::CircuitClosed)?;
        let (stream_id, from_reactor, stream_permits) =
            reply_rx.await.map_err(|_| Error::CircuitClosed)??;
        Ok(Stream::new(
            stream_id,
            self.inner.to_reactor.clone(),
            from_reactor,
            self.inner.send_window.clone(),
            stream_permits,
        ))
    }

    fn spawn(circ: CircChannel, crypto: CircuitCrypto, hops: Vec<HopInfo>) -> Circuit {
        let (to_reactor, commands) = mpsc::unbounded_channel();
        let send_window = Arc::new(Semaphore::new(CIRCUIT_WINDOW));
        let reactor = Reactor {
            circ,
            crypto,
            commands,
            streams: HashMap::new(),
            next_stream_id: 1,
            deliver_window: CIRCUIT_WINDOW,
            send_window: send_window.clone(),
            pending_control: None,
        };
        tokio::spawn(reactor.run());
        Circuit {
            inner: Arc::new(CircuitState {
                to_reactor,
                hops,
                built_at: Instant::now(),
                send_window,
            }),
        }
    }
}

/// Send `CREATE2` to the first hop and complete the ntor handshake.
async fn create_first_hop(circ: &mut CircChannel, hop: &PathHop) -> Result<NtorKeys> {
    let (state, payload) = client_handshake(&mut OsRng, hop.ids.rsa_identity(), &hop.ntor_key);
    circ.send(AnyChanMsg::Create2(Create2::new(HandshakeType::NTOR, payload)))?;
    let reply = circ.recv().await?;
    finish_create(reply, state)
}

fn finish_create(reply: AnyChanMsg, state: NtorClientState) -> Result<NtorKeys> {
    match reply {
        AnyChanMsg::Created2(c) => client_handshake2(state, &into_created2_body(c)),
        AnyChanMsg::Destroy(d) => Err(Error::CircuitDestroyed(d.reason())),
        _ => Err(Error::LinkProtocolViolation("expected CREATED2")),
    }
}

fn into_created2_body(c: Created2) -> Vec<u8> {
    c.into_body()
}

/// Send an onion-wrapped `EXTEND2` to the last built hop and complete the
/// ntor handshake with the new hop (spec.md §4.4 build-sequence step 5).
async fn extend_one_hop(
    circ: &mut CircChannel,
    crypto: &mut CircuitCrypto,
    hop: &PathHop,
) -> Result<NtorKeys> {
    let (state, payload) = client_handshake(&mut OsRng, hop.ids.rsa_identity(), &hop.ntor_key);
    let extend2 = Extend2::new(hop.linkspecs.clone(), HandshakeType::NTOR, payload);
    let outer = AnyRelayMsgOuter::new(None, AnyRelayMsg::Extend2(extend2));
    let mut body = outer.encode(&mut OsRng)?;
    let target_hop = crypto.len() - 1;
    crypto.encrypt_outbound_to_hop(target_hop, &mut body)?;
    circ.send(Relay::from_raw(*body).into_early())?;

    loop {
        match circ.recv().await? {
            AnyChanMsg::Relay(r) => {
                let mut body = r.into_relay_body();
                let recognized_at = crypto.decrypt_inbound(&mut body)?;
                if recognized_at != target_hop {
                    return Err(Error::LinkProtocolViolation(
                        "EXTENDED2 recognized at the wrong hop",
                    ));
                }
                let outer = AnyRelayMsgOuter::decode(&body)?;
                return match outer.into_msg() {
                    AnyRelayMsg::Extended2(e) => client_handshake2(state, &extended2_body(e)),
                    AnyRelayMsg::Truncated(t) => Err(Error::CircuitDestroyed(t.reason())),
                    _ => Err(Error::LinkProtocolViolation("expected EXTENDED2")),
                };
            }
            AnyChanMsg::Destroy(d) => return Err(Error::CircuitDestroyed(d.reason())),
            // A SENDME from an already-built hop can interleave with the
            // EXTENDED2 reply; it carries nothing useful before the circuit
            // is open, so it's dropped rather than treated as a protocol
            // violation.
            _ => continue,
        }
    }
}

fn extended2_body(e: Extended2) -> Vec<u8> {
    e.into_body()
}

/// Per-stream bookkeeping the reactor keeps.
struct StreamSlot {
    to_app: mpsc::UnboundedSender<StreamEvent>,
    send_permits: Arc<Semaphore>,
    recv_window: usize,
}

/// Owns the circuit for its whole life once built: the network connection,
/// onion-layering state, and every open stream.
struct Reactor {
    circ: CircChannel,
    crypto: CircuitCrypto,
    commands: mpsc::UnboundedReceiver<ReactorCommand>,
    streams: HashMap<StreamId, StreamSlot>,
    next_stream_id: u16,
    deliver_window: usize,
    send_window: Arc<Semaphore>,
    /// A caller waiting on the next circuit-level (no stream ID) relay
    /// message; at most one at a time, since the onion-service control
    /// exchanges this serves are always a strict request/reply sequence.
    pending_control: Option<oneshot::Sender<Result<AnyRelayMsg>>>,
}

impl Reactor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(ReactorCommand::OpenStream { msg, reply }) => {
                            let _ = reply.send(self.handle_open_stream(msg));
                        }
                        Some(ReactorCommand::SendRelay { stream_id, msg, reply }) => {
                            let _ = reply.send(self.send_relay(stream_id, msg));
                        }
                        Some(ReactorCommand::EndStream { stream_id }) => {
                            self.streams.remove(&stream_id);
                        }
                        Some(ReactorCommand::InstallHop { keys, reply }) => {
                            self.crypto.add_hop(&keys);
                            let _ = reply.send(());
                        }
                        Some(ReactorCommand::AwaitControl { reply }) => {
                            self.pending_control = Some(reply);
                        }
                        None => break,
                    }
                }
                cell = self.circ.recv() => {
                    match cell {
                        Ok(msg) => {
                            if self.handle_inbound(msg).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            }
        }
    }

    fn send_relay(&mut self, stream_id: Option<StreamId>, msg: AnyRelayMsg) -> Result<()> {
        let outer = AnyRelayMsgOuter::new(stream_id, msg);
        let mut body = outer.encode(&mut OsRng)?;
        self.crypto.encrypt_outbound(&mut body)?;
        self.circ.send(AnyChanMsg::Relay(Relay::from_raw(*body)))?;
        Ok(())
    }

    fn handle_open_stream(
        &mut self,
        msg: AnyRelayMsg,
    ) -> Result<(StreamId, mpsc::UnboundedReceiver<StreamEvent>, Arc<Semaphore>)> {
        let stream_id = self.alloc_stream_id()?;
        self.send_relay(Some(stream_id), msg)?;
        let (to_app, from_reactor) = mpsc::unbounded_channel();
        let send_permits = Arc::new(Semaphore::new(STREAM_WINDOW));
        self.streams.insert(
            stream_id,
            StreamSlot {
                to_app,
                send_permits: send_permits.clone(),
                recv_window: STREAM_WINDOW,
            },
        );
        Ok((stream_id, from_reactor, send_permits))
    }

    fn alloc_stream_id(&mut self) -> Result<StreamId> {
        let start = self.next_stream_id;
        loop {
            let candidate = self.next_stream_id;
            self.next_stream_id = self.next_stream_id.wrapping_add(2).max(1);
            if let Some(id) = StreamId::new(candidate) {
                if !self.streams.contains_key(&id) {
                    return Ok(id);
                }
            }
            if self.next_stream_id == start {
                return Err(Error::StreamIdRangeFull);
            }
        }
    }

    fn handle_inbound(&mut self, msg: AnyChanMsg) -> Result<()> {
        match msg {
            AnyChanMsg::Relay(r) | AnyChanMsg::RelayEarly(_) => {
                let mut body = match msg_body(r) {
                    Some(b) => b,
                    None => return Ok(()),
                };
                self.crypto.decrypt_inbound(&mut body)?;
                let outer = AnyRelayMsgOuter::decode(&body)?;
                let (stream_id, relay_msg) = outer.into_streamid_and_msg();
                self.dispatch_relay_msg(stream_id, relay_msg)
            }
            AnyChanMsg::Destroy(_) => {
                for (_, slot) in self.streams.drain() {
                    let _ = slot.to_app.send(StreamEvent::End(EndReason::DESTROY));
                }
                if let Some(reply) = self.pending_control.take() {
                    let _ = reply.send(Err(Error::CircuitClosed));
                }
                Err(Error::CircuitClosed)
            }
            _ => Ok(()),
        }
    }

    fn dispatch_relay_msg(&mut self, stream_id: Option<StreamId>, msg: AnyRelayMsg) -> Result<()> {
        match msg {
            AnyRelayMsg::Sendme(_) => {
                match stream_id {
                    None => self.send_window.add_permits(CIRCUIT_WINDOW_INCREMENT),
                    Some(id) => {
                        if let Some(slot) = self.streams.get(&id) {
                            slot.send_permits.add_permits(STREAM_WINDOW_INCREMENT);
                        }
                    }
                }
                Ok(())
            }
            AnyRelayMsg::Data(d) => {
                self.note_circuit_data_received()?;
                if let Some(id) = stream_id {
                    self.note_stream_data_received(id)?;
                    if let Some(slot) = self.streams.get(&id) {
                        let _ = slot.to_app.send(StreamEvent::Data(d.as_ref().to_vec()));
                    }
                }
                Ok(())
            }
            AnyRelayMsg::Connected(c) => {
                if let Some(id) = stream_id {
                    if let Some(slot) = self.streams.get(&id) {
                        let _ = slot.to_app.send(StreamEvent::Connected(c.addr()));
                    }
                }
                Ok(())
            }
            AnyRelayMsg::End(e) => {
                if let Some(id) = stream_id {
                    if let Some(slot) = self.streams.remove(&id) {
                        let _ = slot.to_app.send(StreamEvent::End(e.reason()));
                    }
                }
                Ok(())
            }
            AnyRelayMsg::Resolved(r) => {
                if let Some(id) = stream_id {
                    if let Some(slot) = self.streams.remove(&id) {
                        let _ = slot
                            .to_app
                            .send(StreamEvent::Resolved(r.answers().to_vec()));
                    }
                }
                Ok(())
            }
            AnyRelayMsg::Truncated(t) => {
                for (_, slot) in self.streams.drain() {
                    let _ = slot.to_app.send(StreamEvent::End(EndReason::DESTROY));
                }
                Err(Error::CircuitDestroyed(t.reason()))
            }
            // Every other relay command: EXTEND2/EXTENDED2 after build,
            // padding, and — when a caller is waiting via `AwaitControl` —
            // the onion-service control replies (RENDEZVOUS_ESTABLISHED,
            // INTRODUCE_ACK, RENDEZVOUS2), which always arrive with no
            // stream ID.
            msg => {
                if stream_id.is_none() {
                    if let Some(reply) = self.pending_control.take() {
                        let _ = reply.send(Ok(msg));
                    }
                }
                Ok(())
            }
        }
    }

    /// Count an inbound DATA cell toward the circuit-level deliver window,
    /// emitting a SENDME every time it's fallen by
    /// [`CIRCUIT_WINDOW_INCREMENT`] (spec.md §4.4 "on every 100 cells
    /// received, emit a SENDME").
    fn note_circuit_data_received(&mut self) -> Result<()> {
        self.deliver_window -= 1;
        if self.deliver_window == CIRCUIT_WINDOW - CIRCUIT_WINDOW_INCREMENT {
            self.send_relay(None, AnyRelayMsg::Sendme(Sendme::new_empty()))?;
            self.deliver_window = CIRCUIT_WINDOW;
        }
        Ok(())
    }

    fn note_stream_data_received(&mut self, id: StreamId) -> Result<()> {
        let emit = if let Some(slot) = self.streams.get_mut(&id) {
            slot.recv_window -= 1;
            slot.recv_window == STREAM_WINDOW - STREAM_WINDOW_INCREMENT
        } else {
            false
        };
        if emit {
            self.send_relay(Some(id), AnyRelayMsg::Sendme(Sendme::new_empty()))?;
            if let Some(slot) = self.streams.get_mut(&id) {
                slot.recv_window = STREAM_WINDOW;
            }
        }
        Ok(())
    }
}

fn msg_body(r: tor_cell::chancell::msg::Relay) -> Option<tor_cell::chancell::BoxedCellBody> {
    Some(r.into_relay_body())
}
