//! Path selection (spec.md §4.6): turning a consensus and a target into a
//! guard/middle/exit triple (or, for onion-service circuits, three
//! middle-flavored hops), respecting the bandwidth-weighted sampling and
//! distinctness rules.

use std::net::Ipv4Addr;

use rand::Rng;

use tor_linkspec::{ChanTarget, LinkSpec, RelayIds};
use tor_netdir::weight::{weighted_choose, BandwidthWeights, WeightRole};
use tor_netdir::{Consensus, Relay, RelayFlags};
use tor_proto::circuit::PathHop;

use crate::err::{Error, Result};

/// How many full-path sampling attempts to make before giving up with
/// [`Error::NoPath`] (spec.md §4.6: "after 10 sampling attempts").
const MAX_PATH_ATTEMPTS: usize = 10;

/// What the exit hop of a path must satisfy.
#[derive(Clone, Debug)]
pub enum ExitConstraint {
    /// The exit's policy must accept this destination.
    Target {
        /// The destination address, if it's already a literal IP.
        addr: Option<Ipv4Addr>,
        /// The destination port.
        port: u16,
    },
    /// A `RESOLVE` with no address yet known: the exit must accept port 53
    /// or carry a general accept rule (spec.md §4.6).
    Resolve,
    /// No specific destination yet: used by the pool's prebuild task, which
    /// just needs a plausible general-purpose exit to have ready.
    Any,
}

impl ExitConstraint {
    /// Whether an exit with this policy may serve this constraint.
    pub fn accepts(&self, policy: &tor_netdir::policy::ExitPolicy) -> bool {
        match self {
            ExitConstraint::Target { addr, port } => policy.accepts(*addr, *port),
            ExitConstraint::Resolve => policy.accepts_resolve(),
            ExitConstraint::Any => policy.has_accept_rule(),
        }
    }
}

/// Build a 3-hop exit circuit path: `guard` (already selected by the guard
/// manager) as hop one, then a bandwidth-weighted exit satisfying
/// `exit_constraint`, then a bandwidth-weighted middle distinct from both.
pub fn select_exit_path<R: Rng + ?Sized>(
    consensus: &Consensus,
    guard: &RelayIds,
    exit_constraint: &ExitConstraint,
    weights: &BandwidthWeights,
    rng: &mut R,
) -> Result<Vec<PathHop>> {
    let guard_relay = consensus.by_identity(guard).ok_or(Error::NoPath)?;

    for _ in 0..MAX_PATH_ATTEMPTS {
        let exit_candidates: Vec<&Relay> = consensus
            .relays_with_flags(RelayFlags::EXIT | RelayFlags::RUNNING | RelayFlags::VALID)
            .filter(|r| !r.is_too_similar_to(guard_relay))
            .filter(|r| exit_constraint.accepts(r.policy()))
            .collect();
        let exit = match weighted_choose(rng, &exit_candidates, WeightRole::Exit, weights) {
            Some(r) => r,
            None => continue,
        };

        let middle_candidates: Vec<&Relay> = consensus
            .relays_with_flags(RelayFlags::RUNNING | RelayFlags::VALID)
            .filter(|r| !r.is_too_similar_to(guard_relay) && !r.is_too_similar_to(exit))
            .collect();
        let middle = match weighted_choose(rng, &middle_candidates, WeightRole::Middle, weights) {
            Some(r) => r,
            None => continue,
        };

        return Ok(vec![path_hop(guard_relay), path_hop(middle), path_hop(exit)]);
    }
    Err(Error::NoPath)
}

/// Build a 3-hop path for a v3 onion-service circuit: every hop is
/// middle-flavored, with no exit constraint (spec.md §4.6 step 4).
pub fn select_onion_path<R: Rng + ?Sized>(
    consensus: &Consensus,
    weights: &BandwidthWeights,
    rng: &mut R,
) -> Result<Vec<PathHop>> {
    let pool: Vec<&Relay> = consensus
        .relays_with_flags(RelayFlags::RUNNING | RelayFlags::VALID)
        .collect();

    for _ in 0..MAX_PATH_ATTEMPTS {
        let mut chosen: Vec<&Relay> = Vec::with_capacity(3);
        let ok = (0..3).all(|_| {
            let candidates: Vec<&Relay> = pool
                .iter()
                .copied()
                .filter(|r| chosen.iter().all(|c| !r.is_too_similar_to(c)))
                .collect();
            match weighted_choose(rng, &candidates, WeightRole::Middle, weights) {
                Some(r) => {
                    chosen.push(r);
                    true
                }
                None => false,
            }
        });
        if ok {
            return Ok(chosen.into_iter().map(path_hop).collect());
        }
    }
    Err(Error::NoPath)
}

/// Build a 3-hop path ending at a specific `target` relay: used for the two
/// onion-service legs that must land on a relay the client (or the service's
/// descriptor) names explicitly rather than sampling (spec.md §4.7's
/// rendezvous-point and introduction-point circuits).
pub fn select_path_to<R: Rng + ?Sized>(
    consensus: &Consensus,
    target: &Relay,
    weights: &BandwidthWeights,
    rng: &mut R,
) -> Result<Vec<PathHop>> {
    let pool: Vec<&Relay> = consensus
        .relays_with_flags(RelayFlags::RUNNING | RelayFlags::VALID)
        .filter(|r| !r.is_too_similar_to(target))
        .collect();

    for _ in 0..MAX_PATH_ATTEMPTS {
        let mut chosen: Vec<&Relay> = Vec::with_capacity(2);
        let ok = (0..2).all(|_| {
            let candidates: Vec<&Relay> = pool
                .iter()
                .copied()
                .filter(|r| chosen.iter().all(|c| !r.is_too_similar_to(c)))
                .collect();
            match weighted_choose(rng, &candidates, WeightRole::Middle, weights) {
                Some(r) => {
                    chosen.push(r);
                    true
                }
                None => false,
            }
        });
        if ok {
            chosen.push(target);
            return Ok(chosen.into_iter().map(path_hop).collect());
        }
    }
    Err(Error::NoPath)
}

/// Turn a selected relay into the hop description `tor_proto::circuit`
/// needs to dial and extend to it.
fn path_hop(relay: &Relay) -> PathHop {
    let ids = relay.ids().clone();
    let linkspecs = vec![
        LinkSpec::from(relay.addr()),
        LinkSpec::RsaId(*ids.rsa_identity()),
        LinkSpec::Ed25519Id(*ids.ed_identity()),
    ];
    PathHop {
        ids,
        linkspecs,
        ntor_key: relay.ntor_onion_key(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::OsRng;
    use std::time::SystemTime;
    use tor_netdir::policy::ExitPolicy;
    use tor_netdir::testutil::relay_builder;

    fn consensus_with(relays: Vec<Relay>) -> Consensus {
        let now = SystemTime::now();
        Consensus::new(
            relays,
            now - std::time::Duration::from_secs(60),
            now + std::time::Duration::from_secs(3600),
            now + std::time::Duration::from_secs(7200),
        )
    }

    #[test]
    fn exit_path_is_distinct_and_accepts_target() {
        let guard = relay_builder()
            .fingerprint(1)
            .flags(RelayFlags::GUARD | RelayFlags::RUNNING | RelayFlags::VALID)
            .build();
        let guard_ids = guard.ids().clone();
        let exit = relay_builder()
            .fingerprint(2)
            .flags(RelayFlags::EXIT | RelayFlags::RUNNING | RelayFlags::VALID)
            .policy(ExitPolicy::parse("accept *:80,reject *:*").expect("valid policy"))
            .build();
        let middle = relay_builder()
            .fingerprint(3)
            .flags(RelayFlags::RUNNING | RelayFlags::VALID)
            .build();
        let consensus = consensus_with(vec![guard, exit, middle]);

        let path = select_exit_path(
            &consensus,
            &guard_ids,
            &ExitConstraint::Target {
                addr: None,
                port: 80,
            },
            &BandwidthWeights::unity(),
            &mut OsRng,
        )
        .expect("a path should be found");

        assert_eq!(path.len(), 3);
        assert!(path[0].ids.shares_any_id_with(&guard_ids));
        assert!(!path[0].ids.shares_any_id_with(&path[1].ids));
        assert!(!path[1].ids.shares_any_id_with(&path[2].ids));
    }

    #[test]
    fn no_path_when_no_relay_accepts_the_target_port() {
        let guard = relay_builder()
            .fingerprint(1)
            .flags(RelayFlags::GUARD | RelayFlags::RUNNING | RelayFlags::VALID)
            .build();
        let guard_ids = guard.ids().clone();
        let consensus = consensus_with(vec![guard]);

        let err = select_exit_path(
            &consensus,
            &guard_ids,
            &ExitConstraint::Target {
                addr: None,
                port: 80,
            },
            &BandwidthWeights::unity(),
            &mut OsRng,
        )
        .unwrap_err();
        assert!(matches!(err, Error::NoPath));
    }
}
