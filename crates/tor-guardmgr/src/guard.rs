//! The persisted guard set and its selection/demotion logic (spec.md §3
//! "Guard set", §4.4 "Failure semantics", §4.6 step 1).

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

use rand::Rng;
use tor_linkspec::{ChanTarget, OwnedChanTarget, RelayIds};
use tor_netdir::{weight, Consensus, RelayFlags};

use crate::config::GuardParams;
use crate::err::{Error, Result};

/// The state of one entry in the guard set (spec.md §3).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GuardState {
    /// The first-choice guard; every build prefers this one if usable.
    Primary,
    /// A guard that has completed at least one successful circuit, and is
    /// kept as a fallback if the primary is unusable.
    Confirmed,
    /// Demoted after sustained build failures; excluded from selection
    /// until its demotion period elapses.
    Filtered,
}

/// One relay in the persisted guard set.
#[derive(Clone, Debug)]
pub struct GuardEntry {
    ids: RelayIds,
    addr: SocketAddr,
    state: GuardState,
    last_tried: Option<SystemTime>,
    /// Timestamps of consecutive build failures not yet reset by a
    /// success, used to apply spec.md §4.4's "3 failures within 30s" rule.
    recent_failures: VecDeque<SystemTime>,
    /// If `Filtered`, the time at which it becomes eligible again.
    filtered_until: Option<SystemTime>,
}

impl GuardEntry {
    /// Construct a fresh, never-tried guard entry.
    fn new(ids: RelayIds, addr: SocketAddr, state: GuardState) -> Self {
        GuardEntry {
            ids,
            addr,
            state,
            last_tried: None,
            recent_failures: VecDeque::new(),
            filtered_until: None,
        }
    }

    /// This entry's current state.
    pub fn state(&self) -> GuardState {
        self.state
    }

    /// This entry's relay identities.
    pub fn ids(&self) -> &RelayIds {
        &self.ids
    }

    /// The last time a circuit build through this guard was attempted.
    pub fn last_tried(&self) -> Option<SystemTime> {
        self.last_tried
    }

    /// Whether this entry may currently be selected: not `Filtered`, or
    /// `Filtered` but past its demotion period.
    fn is_usable(&self, now: SystemTime) -> bool {
        match self.state {
            GuardState::Filtered => self.filtered_until.map_or(true, |t| now >= t),
            _ => true,
        }
    }
}

impl ChanTarget for GuardEntry {
    fn addr(&self) -> SocketAddr {
        self.addr
    }
    fn ids(&self) -> &RelayIds {
        &self.ids
    }
}

/// The ordered, persisted set of guards a client has chosen (spec.md §3).
///
/// Invariant: the first entry whose state is `Primary` is the one every
/// circuit build prefers, so long as it's usable; a guard is demoted to
/// `Filtered` only after sustained failure (spec.md §4.4).
#[derive(Clone, Debug, Default)]
pub struct GuardSet {
    entries: Vec<GuardEntry>,
}

impl GuardSet {
    /// An empty guard set (the state before any guard has ever been
    /// selected, or after loading a fresh install's state file).
    pub fn new() -> Self {
        GuardSet {
            entries: Vec::new(),
        }
    }

    /// All entries in the set, in preference order.
    pub fn entries(&self) -> &[GuardEntry] {
        &self.entries
    }

    /// Choose the guard to use for a new circuit build (spec.md §4.6 step
    /// 1): the first usable `Primary` entry if there is one; otherwise, if
    /// the set has fewer than `params.min_active_guards` usable entries,
    /// sample a fresh `Guard`-flagged relay from `consensus`, weighted by
    /// bandwidth, and insert it at position 0 as `Primary`.
    pub fn select<R: Rng + ?Sized>(
        &mut self,
        consensus: &Consensus,
        params: &GuardParams,
        rng: &mut R,
    ) -> Result<OwnedChanTarget> {
        let now = SystemTime::now();
        if let Some(primary) = self
            .entries
            .iter()
            .find(|e| e.state == GuardState::Primary && e.is_usable(now))
        {
            return Ok(OwnedChanTarget::from_chan_target(primary));
        }
        if let Some(confirmed) = self
            .entries
            .iter()
            .find(|e| e.state == GuardState::Confirmed && e.is_usable(now))
        {
            return Ok(OwnedChanTarget::from_chan_target(confirmed));
        }
        self.sample_new_guard(consensus, params, rng)
    }

    /// Draw a fresh Guard-flagged relay not already in the set, weighted
    /// by declared bandwidth (`Wgg`), and insert it as `Primary`.
    fn sample_new_guard<R: Rng + ?Sized>(
        &mut self,
        consensus: &Consensus,
        params: &GuardParams,
        rng: &mut R,
    ) -> Result<OwnedChanTarget> {
        let existing: Vec<&RelayIds> = self.entries.iter().map(GuardEntry::ids).collect();
        let candidates: Vec<&tor_netdir::Relay> = consensus
            .relays_with_flags(RelayFlags::GUARD | RelayFlags::RUNNING | RelayFlags::VALID)
            .filter(|r| !existing.contains(&r.ids()))
            .collect();
        let chosen = weight::weighted_choose(
            rng,
            &candidates,
            weight::WeightRole::Guard,
            &weight::BandwidthWeights::unity(),
        )
        .ok_or(Error::NoGuardsAvailable)?;
        let entry = GuardEntry::new(chosen.ids().clone(), chosen.addr(), GuardState::Primary);
        let target = OwnedChanTarget::from_chan_target(&entry);
        self.entries.insert(0, entry);
        self.enforce_capacity(params);
        Ok(target)
    }

    /// Trim the set down to `params.max_active_guards` entries, dropping
    /// the least-preferred (trailing) ones first.
    fn enforce_capacity(&mut self, params: &GuardParams) {
        if self.entries.len() > params.max_active_guards {
            self.entries.truncate(params.max_active_guards);
        }
    }

    /// Record that a circuit build through `ids` succeeded: clears its
    /// failure history, promotes it to at least `Confirmed`, and un-demotes
    /// it if it had been `Filtered`.
    pub fn report_success(&mut self, ids: &RelayIds) {
        let now = SystemTime::now();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.ids() == ids) {
            entry.last_tried = Some(now);
            entry.recent_failures.clear();
            entry.filtered_until = None;
            if entry.state == GuardState::Filtered {
                entry.state = GuardState::Confirmed;
            }
        }
    }

    /// Record that a circuit build through `ids` failed (spec.md §4.4:
    /// `AuthFailure`/`HandshakeTimeout` during build). After
    /// `params.consecutive_failures_before_demotion` failures within
    /// `params.demotion_window`, the guard is demoted to `Filtered` for
    /// `params.demotion_duration`.
    pub fn report_failure(&mut self, ids: &RelayIds, params: &GuardParams) {
        let now = SystemTime::now();
        let Some(entry) = self.entries.iter_mut().find(|e| e.ids() == ids) else {
            return;
        };
        entry.last_tried = Some(now);
        entry.recent_failures.push_back(now);
        while let Some(&oldest) = entry.recent_failures.front() {
            if now.duration_since(oldest).unwrap_or(Duration::ZERO) > params.demotion_window {
                entry.recent_failures.pop_front();
            } else {
                break;
            }
        }
        if entry.recent_failures.len() as u32 >= params.consecutive_failures_before_demotion {
            tracing::warn!(
                guard = ?entry.ids,
                "demoting guard to Filtered after repeated build failures"
            );
            entry.state = GuardState::Filtered;
            entry.filtered_until = Some(now + params.demotion_duration);
            entry.recent_failures.clear();
        }
    }

    /// Load a guard set from entries already parsed from the persisted
    /// state file (see [`crate::persist`]).
    pub(crate) fn from_entries(entries: Vec<GuardEntry>) -> Self {
        GuardSet { entries }
    }

    /// Reconstruct a persistable entry list, for [`crate::persist::save`].
    pub(crate) fn raw_entries(&self) -> &[GuardEntry] {
        &self.entries
    }

    /// Build an entry directly (used by [`crate::persist::load`] and by
    /// tests).
    pub(crate) fn entry_from_parts(
        ids: RelayIds,
        addr: SocketAddr,
        state: GuardState,
        last_tried: Option<SystemTime>,
    ) -> GuardEntry {
        let mut e = GuardEntry::new(ids, addr, state);
        e.last_tried = last_tried;
        e
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use tor_llcrypto::pk::{curve25519, ed25519};
    use tor_linkspec::RsaIdentity;
    use tor_netdir::{ExitPolicy, Relay};

    fn relay(byte: u8, flags: RelayFlags) -> Relay {
        let ids = RelayIds::new(
            RsaIdentity::from_bytes(&[byte; 20]).unwrap(),
            ed25519::Ed25519Identity::new([byte; 32]),
        );
        Relay::new(
            ids,
            format!("r{byte}"),
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, byte), 9001)),
            9030,
            flags,
            1000,
            ExitPolicy::reject_all(),
            curve25519::PublicKey::from([byte; 32]),
        )
    }

    fn consensus(relays: Vec<Relay>) -> Consensus {
        let now = SystemTime::now();
        Consensus::new(
            relays,
            now - Duration::from_secs(3600),
            now + Duration::from_secs(3600),
            now + Duration::from_secs(7200),
        )
    }

    #[test]
    fn empty_set_samples_a_guard() {
        let mut set = GuardSet::new();
        let cons = consensus(vec![relay(1, RelayFlags::GUARD | RelayFlags::RUNNING | RelayFlags::VALID)]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let params = GuardParams::default();
        let target = set.select(&cons, &params, &mut rng).unwrap();
        assert_eq!(set.entries().len(), 1);
        assert_eq!(set.entries()[0].state(), GuardState::Primary);
        assert_eq!(target.ids(), set.entries()[0].ids());
    }

    #[test]
    fn primary_preferred_on_next_build() {
        let mut set = GuardSet::new();
        let cons = consensus(vec![
            relay(1, RelayFlags::GUARD | RelayFlags::RUNNING | RelayFlags::VALID),
            relay(2, RelayFlags::GUARD | RelayFlags::RUNNING | RelayFlags::VALID),
        ]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let params = GuardParams::default();
        let first = set.select(&cons, &params, &mut rng).unwrap();
        let second = set.select(&cons, &params, &mut rng).unwrap();
        assert_eq!(first.ids(), second.ids(), "second build reuses the same primary guard");
    }

    #[test]
    fn demotion_after_three_failures() {
        let mut set = GuardSet::new();
        let cons = consensus(vec![relay(1, RelayFlags::GUARD | RelayFlags::RUNNING | RelayFlags::VALID)]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let params = GuardParams::default();
        let target = set.select(&cons, &params, &mut rng).unwrap();
        let ids = target.ids().clone();
        for _ in 0..3 {
            set.report_failure(&ids, &params);
        }
        assert_eq!(set.entries()[0].state(), GuardState::Filtered);
    }

    #[test]
    fn success_clears_failure_history() {
        let mut set = GuardSet::new();
        let cons = consensus(vec![relay(1, RelayFlags::GUARD | RelayFlags::RUNNING | RelayFlags::VALID)]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(4);
        let params = GuardParams::default();
        let target = set.select(&cons, &params, &mut rng).unwrap();
        let ids = target.ids().clone();
        set.report_failure(&ids, &params);
        set.report_failure(&ids, &params);
        set.report_success(&ids);
        set.report_failure(&ids, &params);
        set.report_failure(&ids, &params);
        assert_eq!(set.entries()[0].state(), GuardState::Primary);
    }
}
