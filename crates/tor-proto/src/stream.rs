//! The stream multiplexer (spec.md §4.5): a handle onto one application or
//! directory stream carried over a [`crate::circuit::Circuit`].
//!
//! A [`Stream`] is a thin client of its circuit's reactor task: opening one
//! sends `BEGIN`/`BEGIN_DIR`/`RESOLVE` and registers a dispatch channel;
//! [`Stream::read`]/[`Stream::write_all`] translate to `DATA` cells;
//! dropping it sends `END` best-effort. All flow-control bookkeeping
//! (spec.md §4.4 "Flow control") lives in two [`tokio::sync::Semaphore`]s
//! shared with the circuit reactor: one circuit-wide, one per stream. Each
//! outbound `DATA` cell must acquire (and permanently spend, via
//! [`tokio::sync::OwnedSemaphorePermit::forget`]) one permit from both before
//! it may be sent; a `SENDME` received by the reactor tops the relevant
//! semaphore back up. This is the write side of the same windows the
//! reactor's `note_circuit_data_received`/`note_stream_data_received`
//! maintain for the read side.

use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{mpsc, oneshot, Semaphore};

use tor_cell::relaycell::msg::{AnyRelayMsg, Data, End, EndReason, ResolvedVal};
use tor_cell::relaycell::{PAYLOAD_MAX_LEN, StreamId};

use crate::circuit::ReactorCommand;
use crate::err::{Error, Result};

/// An event the circuit reactor delivers to an open [`Stream`].
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A `CONNECTED` reply to `BEGIN`/`BEGIN_DIR`, with the resolved address
    /// and TTL if the exit supplied one.
    Connected(Option<(IpAddr, u32)>),
    /// A chunk of `DATA` (at most [`PAYLOAD_MAX_LEN`] bytes).
    Data(Vec<u8>),
    /// A `RESOLVED` reply to `RESOLVE`/`RESOLVE_PTR`.
    Resolved(Vec<(ResolvedVal, u32)>),
    /// An `END`, or the synthesized effect of the circuit closing.
    End(EndReason),
}

/// Which half of a [`Stream`] is still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HalfState {
    /// Neither side has sent `END`.
    Open,
    /// The remote end sent `END`; we may still write until we send our own
    /// (spec.md §4.5 "Half-close").
    RemoteEnded,
    /// We sent `END`; reads may still drain buffered data.
    LocalEnded,
    /// Both ends have ended, or the circuit closed under us.
    Closed,
}

/// A handle to one stream multiplexed over a circuit.
///
/// Implements [`tokio::io::AsyncRead`]/[`tokio::io::AsyncWrite`] so it can be
/// spliced directly onto a SOCKS client's TCP socket with
/// `tokio::io::copy_bidirectional`.
pub struct Stream {
    id: StreamId,
    to_reactor: mpsc::UnboundedSender<ReactorCommand>,
    from_reactor: mpsc::UnboundedReceiver<StreamEvent>,
    circuit_window: std::sync::Arc<Semaphore>,
    stream_window: std::sync::Arc<Semaphore>,
    state: HalfState,
    /// Bytes received but not yet consumed by `poll_read`.
    recv_buf: Vec<u8>,
    /// In-flight permit acquisition for `poll_write`, so a write that can't
    /// complete in one poll can be resumed on the next.
    pending_write: Option<PendingWrite>,
}

/// State for an in-progress `poll_write` call waiting on flow-control
/// permits.
struct PendingWrite {
    chunk: Vec<u8>,
    fut: Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>>,
}

impl Stream {
    /// Wrap a freshly opened stream. Called only by
    /// [`crate::circuit::Circuit::begin_stream`] and friends.
    pub(crate) fn new(
        id: StreamId,
        to_reactor: mpsc::UnboundedSender<ReactorCommand>,
        from_reactor: mpsc::UnboundedReceiver<StreamEvent>,
        circuit_window: std::sync::Arc<Semaphore>,
        stream_window: std::sync::Arc<Semaphore>,
    ) -> Self {
        Stream {
            id,
            to_reactor,
            from_reactor,
            circuit_window,
            stream_window,
            state: HalfState::Open,
            recv_buf: Vec::new(),
            pending_write: None,
        }
    }

    /// This stream's ID on its circuit.
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Wait for the `CONNECTED` reply to an application `BEGIN`
    /// (spec.md §4.5 "Wait for RELAY_CONNECTED").
    ///
    /// Returns [`Error::StreamEnded`] if the exit replied with `END` instead
    /// (map the reason to a SOCKS code at the call site, spec.md §4.5).
    pub async fn connected(&mut self) -> Result<Option<(IpAddr, u32)>> {
        match self.next_event().await? {
            StreamEvent::Connected(addr) => Ok(addr),
            StreamEvent::End(reason) => {
                self.state = HalfState::Closed;
                Err(Error::StreamEnded(reason))
            }
            other => {
                self.requeue_unexpected(other);
                Err(Error::Internal(tor_error::internal!(
                    "expected CONNECTED or END as the first event on a new stream"
                )))
            }
        }
    }

    /// Wait for the `RESOLVED` reply to a `RESOLVE`/`RESOLVE_PTR` stream.
    pub async fn resolved(&mut self) -> Result<Vec<(ResolvedVal, u32)>> {
        match self.next_event().await? {
            StreamEvent::Resolved(answers) => {
                self.state = HalfState::Closed;
                Ok(answers)
            }
            StreamEvent::End(reason) => {
                self.state = HalfState::Closed;
                Err(Error::StreamEnded(reason))
            }
            other => {
                self.requeue_unexpected(other);
                Err(Error::Internal(tor_error::internal!(
                    "expected RESOLVED or END on a resolve stream"
                )))
            }
        }
    }

    /// Read one chunk of application data (spec.md §4.5 "Ordering
    /// guarantee"); cells arrive, and are returned, in order.
    ///
    /// Returns `Ok(None)` once the stream has ended and every buffered byte
    /// has been delivered.
    pub async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            match self.state {
                HalfState::Closed if self.recv_buf.is_empty() => return Ok(None),
                _ => {}
            }
            match self.from_reactor.recv().await {
                Some(StreamEvent::Data(bytes)) => return Ok(Some(bytes)),
                Some(StreamEvent::End(_)) => {
                    // The remote side is done sending, but spec.md §4.5's
                    // half-close lets us keep writing until we send our own
                    // END: only collapse all the way to `Closed` if we
                    // already had.
                    self.state = match self.state {
                        HalfState::LocalEnded => HalfState::Closed,
                        _ => HalfState::RemoteEnded,
                    };
                    return Ok(None);
                }
                Some(_) => continue,
                None => {
                    self.state = HalfState::Closed;
                    return Ok(None);
                }
            }
        }
    }

    /// Write `data` as a sequence of `DATA` cells (spec.md §4.5 "Read/write":
    /// at most [`PAYLOAD_MAX_LEN`] bytes per cell), blocking on flow control
    /// when the circuit's or stream's send window is exhausted.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        for chunk in data.chunks(PAYLOAD_MAX_LEN) {
            self.send_data_cell(chunk).await?;
        }
        Ok(())
    }

    /// Close the write half by sending `END` (spec.md §4.5 "Half-close").
    pub async fn finish(&mut self) -> Result<()> {
        if matches!(self.state, HalfState::LocalEnded | HalfState::Closed) {
            return Ok(());
        }
        self.send_relay(AnyRelayMsg::End(End::new_misc())).await?;
        self.state = match self.state {
            HalfState::RemoteEnded => HalfState::Closed,
            _ => HalfState::LocalEnded,
        };
        Ok(())
    }

    async fn send_data_cell(&mut self, chunk: &[u8]) -> Result<()> {
        if matches!(self.state, HalfState::LocalEnded | HalfState::Closed) {
            return Err(Error::StreamClosed);
        }
        let _circuit_permit = self
            .circuit_window
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::CircuitClosed)?;
        let _stream_permit = self
            .stream_window
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::StreamClosed)?;
        // Spent until a SENDME explicitly tops the window back up
        // (spec.md §4.4 "Window accounting").
        _circuit_permit.forget();
        _stream_permit.forget();
        self.send_relay(AnyRelayMsg::Data(Data::new(chunk)?)).await
    }

    async fn send_relay(&self, msg: AnyRelayMsg) -> Result<()> {
        let (reply, reply_rx) = oneshot::channel();
        self.to_reactor
            .send(ReactorCommand::SendRelay {
                stream_id: Some(self.id),
                msg,
                reply,
            })
            .map_err(|_| Error::CircuitClosed)?;
        reply_rx.await.map_err(|_| Error::CircuitClosed)?
    }

    async fn next_event(&mut self) -> Result<StreamEvent> {
        self.from_reactor.recv().await.ok_or(Error::CircuitClosed)
    }

    /// An event arrived that the caller wasn't expecting yet (for example
    /// `DATA` racing ahead of `CONNECTED` is impossible, but a defensive
    /// caller still wants somewhere to put it rather than silently drop it).
    fn requeue_unexpected(&mut self, event: StreamEvent) {
        if let StreamEvent::Data(bytes) = event {
            self.recv_buf.extend_from_slice(&bytes);
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if !matches!(self.state, HalfState::LocalEnded | HalfState::Closed) {
            let _ = self.to_reactor.send(ReactorCommand::SendRelay {
                stream_id: Some(self.id),
                msg: AnyRelayMsg::End(End::new_misc()),
                reply: oneshot::channel().0,
            });
        }
        let _ = self
            .to_reactor
            .send(ReactorCommand::EndStream { stream_id: self.id });
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.recv_buf.is_empty() {
            let n = self.recv_buf.len().min(buf.remaining());
            buf.put_slice(&self.recv_buf[..n]);
            self.recv_buf.drain(..n);
            return Poll::Ready(Ok(()));
        }
        loop {
            match self.from_reactor.poll_recv(cx) {
                Poll::Ready(Some(StreamEvent::Data(bytes))) => {
                    let n = bytes.len().min(buf.remaining());
                    buf.put_slice(&bytes[..n]);
                    if n < bytes.len() {
                        self.recv_buf.extend_from_slice(&bytes[n..]);
                    }
                    return Poll::Ready(Ok(()));
                }
                Poll::Ready(Some(StreamEvent::End(_))) => {
                    self.state = match self.state {
                        HalfState::LocalEnded => HalfState::Closed,
                        _ => HalfState::RemoteEnded,
                    };
                    return Poll::Ready(Ok(())); // EOF: zero bytes filled.
                }
                Poll::Ready(None) => {
                    self.state = HalfState::Closed;
                    return Poll::Ready(Ok(())); // EOF: zero bytes filled.
                }
                Poll::Ready(Some(_)) => continue,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            if let Some(pending) = self.pending_write.as_mut() {
                match pending.fut.as_mut().poll(cx) {
                    Poll::Ready(Ok(())) => {
                        let written = self.pending_write.take().unwrap().chunk.len();
                        return Poll::Ready(Ok(written));
                    }
                    Poll::Ready(Err(e)) => {
                        self.pending_write = None;
                        return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, e)));
                    }
                    Poll::Pending => return Poll::Pending,
                }
            }
            let chunk: Vec<u8> = buf[..buf.len().min(PAYLOAD_MAX_LEN)].to_vec();
            if chunk.is_empty() {
                return Poll::Ready(Ok(0));
            }
            // Clone the handles the future needs up front so it's `'static`
            // and doesn't borrow `self` across the `.await` points.
            let circuit_window = self.circuit_window.clone();
            let stream_window = self.stream_window.clone();
            let to_reactor = self.to_reactor.clone();
            let id = self.id;
            let chunk_for_send = chunk.clone();
            let fut = Box::pin(async move {
                let _c = circuit_window
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::CircuitClosed)?;
                let _s = stream_window
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::StreamClosed)?;
                _c.forget();
                _s.forget();
                let (reply, reply_rx) = oneshot::channel();
                to_reactor
                    .send(ReactorCommand::SendRelay {
                        stream_id: Some(id),
                        msg: AnyRelayMsg::Data(Data::new(&chunk_for_send)?),
                        reply,
                    })
                    .map_err(|_| Error::CircuitClosed)?;
                reply_rx.await.map_err(|_| Error::CircuitClosed)?
            });
            self.pending_write = Some(PendingWrite { chunk, fut });
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Best-effort, fire-and-forget END: waiting for the reactor's
        // acknowledgement here would need another pending-future slot for a
        // half-close that every caller already triggers again via `Drop`.
        let this = self.get_mut();
        if !matches!(this.state, HalfState::LocalEnded | HalfState::Closed) {
            let (reply, _) = oneshot::channel();
            let _ = this.to_reactor.send(ReactorCommand::SendRelay {
                stream_id: Some(this.id),
                msg: AnyRelayMsg::End(End::new_misc()),
                reply,
            });
            this.state = match this.state {
                HalfState::RemoteEnded => HalfState::Closed,
                _ => HalfState::LocalEnded,
            };
        }
        Poll::Ready(Ok(()))
    }
}
