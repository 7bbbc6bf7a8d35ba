//! A snapshot of the Tor network directory, and the relay-selection
//! primitives built on top of it (spec.md §3 "Consensus & Relay Directory",
//! §4.6 "Path Selection").
//!
//! This crate models only what a client needs to pick a usable path: a
//! [`Consensus`] is a validity-windowed list of [`Relay`]s, each carrying
//! the flags, bandwidth weight, and exit policy that `tor-circmgr`'s path
//! selector consults. Fetching and parsing the real document formats
//! (consensus documents, microdescriptors, v3 onion descriptors) is an
//! external collaborator's job, represented here only as the
//! [`DirProvider`] trait that such a collaborator would implement.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod err;
pub mod policy;
pub mod weight;

/// A `Relay`/`Consensus` builder for other crates' tests (spec.md §8's
/// worked scenarios all start from a hand-built consensus rather than a
/// real directory fetch).
#[cfg(any(test, feature = "testing"))]
pub mod testutil;

use std::net::{IpAddr, SocketAddr};
use std::time::SystemTime;

use async_trait::async_trait;
use bitflags::bitflags;

use tor_linkspec::{ChanTarget, RelayIds};
use tor_llcrypto::pk::curve25519;

pub use err::{Error, Result};
pub use policy::ExitPolicy;
pub use weight::{relay_weight, weighted_choose, BandwidthWeights, WeightRole};

bitflags! {
    /// The subset of consensus relay flags this core cares about (spec.md
    /// §3's `Relay` type).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RelayFlags: u16 {
        /// The relay is suitable for use as a first hop.
        const GUARD = 1 << 0;
        /// The relay is suitable for use as a last hop.
        const EXIT = 1 << 1;
        /// The relay has been up long enough to be considered for
        /// long-lived circuits.
        const STABLE = 1 << 2;
        /// The relay is fast enough for general use.
        const FAST = 1 << 3;
        /// The authorities believe the relay to be currently running.
        const RUNNING = 1 << 4;
        /// The authorities believe the relay's descriptor to be correct.
        const VALID = 1 << 5;
        /// The relay serves as an onion-service directory (HSDir).
        const HSDIR = 1 << 6;
    }
}

/// A single relay as listed in a [`Consensus`].
#[derive(Clone, Debug, PartialEq)]
pub struct Relay {
    ids: RelayIds,
    nickname: String,
    addr: SocketAddr,
    dir_port: u16,
    flags: RelayFlags,
    bandwidth_weight: u32,
    policy: ExitPolicy,
    ntor_onion_key: curve25519::PublicKey,
}

impl Relay {
    /// Construct a relay record directly from its fields.
    ///
    /// Used by a `DirProvider` implementation once it has parsed a
    /// consensus entry and the router descriptor or microdescriptor it
    /// refers to; this crate has no parser of its own (spec.md §1, §6).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ids: RelayIds,
        nickname: String,
        addr: SocketAddr,
        dir_port: u16,
        flags: RelayFlags,
        bandwidth_weight: u32,
        policy: ExitPolicy,
        ntor_onion_key: curve25519::PublicKey,
    ) -> Self {
        Relay {
            ids,
            nickname,
            addr,
            dir_port,
            flags,
            bandwidth_weight,
            policy,
            ntor_onion_key,
        }
    }

    /// The relay's nickname, as published in the consensus. Not
    /// authenticated; for display only.
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// The relay's directory port, used to fetch descriptors directly from
    /// it (e.g. as an HSDir).
    pub fn dir_port(&self) -> u16 {
        self.dir_port
    }

    /// The relay's consensus flags.
    pub fn flags(&self) -> RelayFlags {
        self.flags
    }

    /// The relay's consensus bandwidth weight, an opaque relative figure
    /// (not a bytes/sec measurement) used only for weighted sampling.
    pub fn bandwidth_weight(&self) -> u32 {
        self.bandwidth_weight
    }

    /// The relay's exit policy. Relays without `RelayFlags::EXIT` have an
    /// all-reject policy.
    pub fn policy(&self) -> &ExitPolicy {
        &self.policy
    }

    /// The relay's ntor onion key, used as the responder's public key in
    /// the CREATE2/EXTEND2 handshake (spec.md §4.2).
    pub fn ntor_onion_key(&self) -> &curve25519::PublicKey {
        &self.ntor_onion_key
    }

    /// Return true if `self` and `other` are too closely related to both
    /// appear in the same path: sharing an identity, an IP address, or (per
    /// spec.md §4.6's family/subnet constraint) the same /16.
    pub fn is_too_similar_to(&self, other: &Relay) -> bool {
        if self.ids.shares_any_id_with(&other.ids) {
            return true;
        }
        match (self.addr.ip(), other.addr.ip()) {
            (IpAddr::V4(a), IpAddr::V4(b)) => {
                a.octets()[0..2] == b.octets()[0..2]
            }
            (a, b) => a == b,
        }
    }
}

impl ChanTarget for Relay {
    fn addr(&self) -> SocketAddr {
        self.addr
    }
    fn ids(&self) -> &RelayIds {
        &self.ids
    }
}

/// A snapshot of the network consensus: every relay known at the time it
/// was fetched, plus the validity window within which it may be used
/// (spec.md §3).
#[derive(Clone, Debug)]
pub struct Consensus {
    relays: Vec<Relay>,
    valid_after: SystemTime,
    fresh_until: SystemTime,
    valid_until: SystemTime,
}

impl Consensus {
    /// Build a consensus snapshot from its relay list and validity window.
    pub fn new(
        relays: Vec<Relay>,
        valid_after: SystemTime,
        fresh_until: SystemTime,
        valid_until: SystemTime,
    ) -> Self {
        Consensus {
            relays,
            valid_after,
            fresh_until,
            valid_until,
        }
    }

    /// All relays in this snapshot.
    pub fn relays(&self) -> &[Relay] {
        &self.relays
    }

    /// Find a relay by its identity set.
    pub fn by_identity(&self, ids: &RelayIds) -> Option<&Relay> {
        self.relays.iter().find(|r| r.ids == *ids)
    }

    /// All relays carrying every flag in `flags`.
    pub fn relays_with_flags(&self, flags: RelayFlags) -> impl Iterator<Item = &Relay> {
        self.relays.iter().filter(move |r| r.flags.contains(flags))
    }

    /// Whether this snapshot is still usable at `now`: not yet expired, and
    /// past its `valid-after` time. (spec.md §3's liveness rule; `fresh
    /// until` governs only whether a client should look for something
    /// newer, not whether the document may still be used.)
    pub fn is_live(&self, now: SystemTime) -> bool {
        now >= self.valid_after && now < self.valid_until
    }

    /// Whether a client should prefer to fetch a newer consensus before
    /// relying on this one for fresh circuit building.
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        now < self.fresh_until
    }
}

/// An external collaborator able to supply directory information: a
/// consensus snapshot, and onion-service descriptors by identity.
///
/// `tor-netdir` defines only this interface; fetching and parsing the
/// documents it returns is out of scope for this core (spec.md §1, §6).
#[async_trait]
pub trait DirProvider: Send + Sync {
    /// Fetch (or return a cached) current consensus snapshot.
    async fn get_consensus(&self) -> Result<Consensus>;

    /// Fetch the onion-service descriptor published at `hsdir` for the
    /// blinded identity `desc_id`, returning its raw body for the caller to
    /// parse and verify (`tor-hsclient` owns the v3 descriptor format).
    async fn fetch_descriptor(&self, hsdir: &Relay, desc_id: &[u8]) -> Result<Vec<u8>>;
}
