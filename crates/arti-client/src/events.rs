//! The control surface's event stream (ambient "what is this client doing
//! right now" feed, alongside the `tracing` logs every crate already
//! emits).
//!
//! A long-running embedder (the `arti` binary's future control port, a GUI
//! wrapping this crate) wants to observe state transitions without
//! polling: [`EventSender`]/[`EventReceiver`] wrap a bounded
//! [`tokio::sync::broadcast`] channel, the same primitive `tor-proto`'s
//! circuit reactor already uses for fan-out, carrying [`Event`] values. A
//! slow or absent subscriber never blocks the orchestrator: `broadcast`
//! drops the oldest unread event and reports `Lagged` to that subscriber
//! instead.

use tokio::sync::broadcast;

use tor_linkspec::RelayIds;

/// How many not-yet-delivered events a lagging subscriber may fall behind
/// by before old ones are dropped.
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// A state change this client wants to report to observers.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Event {
    /// A circuit was built, or torn down, or became too dirty to accept
    /// new streams (spec.md §4.4 "Dirtiness").
    CircuitStateChanged {
        /// The circuit's first-hop identity, as a stable label.
        first_hop: RelayIds,
        /// Human-readable description of the new state (`"open"`,
        /// `"closed"`, `"dirty"`).
        state: &'static str,
    },
    /// A stream changed state (opened, got CONNECTED, or ended).
    StreamStateChanged {
        /// Human-readable description of the new state.
        state: &'static str,
    },
    /// The active guard set changed (a guard was added, demoted, or
    /// promoted back).
    GuardChanged {
        /// The affected guard's identity.
        guard: RelayIds,
        /// Human-readable description of the change.
        change: &'static str,
    },
    /// A coarse bandwidth-usage sample, for a traffic-rate display.
    Bandwidth {
        /// Bytes read since the last sample.
        read: u64,
        /// Bytes written since the last sample.
        written: u64,
    },
}

/// The sending half of the event stream; held by [`crate::TorClient`] and
/// cloned freely (every clone still publishes to the same subscribers).
#[derive(Clone)]
pub struct EventSender(broadcast::Sender<Event>);

/// The receiving half; obtained via [`EventSender::subscribe`] or
/// [`crate::TorClient::subscribe_events`].
pub struct EventReceiver(broadcast::Receiver<Event>);

impl EventSender {
    /// Create a new event stream with its default channel capacity.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        EventSender(tx)
    }

    /// Publish an event to every current subscriber. Never blocks; if
    /// there are no subscribers, the event is simply dropped.
    pub fn publish(&self, event: Event) {
        // A send error here only means nobody is listening right now.
        let _ = self.0.send(event);
    }

    /// Obtain a new receiver, which sees every event published from this
    /// point on.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver(self.0.subscribe())
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new()
    }
}

impl EventReceiver {
    /// Wait for the next event.
    ///
    /// Returns `None` only if every [`EventSender`] (and its clones) has
    /// been dropped. If this receiver fell behind, the oldest
    /// undelivered events are silently skipped, the way a single slow
    /// subscriber's tardiness has to without stalling the rest of the
    /// client.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.0.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn subscriber_sees_published_events() {
        let sender = EventSender::new();
        let mut receiver = sender.subscribe();
        sender.publish(Event::Bandwidth {
            read: 10,
            written: 20,
        });
        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, Event::Bandwidth { read: 10, written: 20 }));
    }

    #[tokio::test]
    async fn receiver_sees_none_once_every_sender_is_dropped() {
        let sender = EventSender::new();
        let mut receiver = sender.subscribe();
        drop(sender);
        assert!(receiver.recv().await.is_none());
    }
}
