//! Bandwidth-weighted relay sampling (spec.md §4.6 steps 1-3).
//!
//! Every position in a path weights a candidate relay by its declared
//! bandwidth times a role-dependent factor, so that (for example) a relay
//! that's both Guard- and Exit-flagged isn't drawn for the exit position as
//! often as a relay that can *only* serve as an exit, which would otherwise
//! starve the Guard/Exit-capable fraction of the network. The real Tor
//! directory protocol publishes ten such factors (`Wgg`, `Wgd`, `Wmg`,
//! `Wme`, `Wmd`, `Wmm`, `Weg`, `Wee`, `Wed`, `Wem`) in the consensus
//! `bandwidth-weights` line; spec.md §4.6 names only the four that matter
//! for a 3-hop client path (`Wgg`, `Wmg`, `Weg`, `Wee`). Since consensus
//! fetching is an external collaborator (spec.md §1), this core can't read
//! that line itself, so [`BandwidthWeights::unity`] supplies a neutral
//! default (every factor 1.0, except "this flag combination can never
//! serve this role", which is 0.0) and a real `DirProvider` is free to supply
//! measured values instead. Recorded as an Open-Question resolution in
//! DESIGN.md.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::{Relay, RelayFlags};

/// Which position in a path a relay is being weighted for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WeightRole {
    /// The first hop of a circuit.
    Guard,
    /// A hop other than the first or last.
    Middle,
    /// The last hop of a circuit (the one that exits to the internet).
    Exit,
}

/// The ten bandwidth-weight factors used to weight a relay for a role,
/// keyed by the combination of Guard/Exit flags it carries.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BandwidthWeights {
    /// Weight of a Guard-only relay in the guard position.
    pub wgg: f64,
    /// Weight of a Guard+Exit relay in the guard position.
    pub wgd: f64,
    /// Weight of a Guard-only relay in the middle position.
    pub wmg: f64,
    /// Weight of an Exit-only relay in the middle position.
    pub wme: f64,
    /// Weight of a Guard+Exit relay in the middle position.
    pub wmd: f64,
    /// Weight of a plain (neither-flagged) relay in the middle position.
    pub wmm: f64,
    /// Weight of a Guard-only relay in the exit position.
    pub weg: f64,
    /// Weight of an Exit-only relay in the exit position.
    pub wee: f64,
    /// Weight of a Guard+Exit relay in the exit position.
    pub wed: f64,
}

impl BandwidthWeights {
    /// The neutral default: every legal flag/role combination weighted
    /// equally by bandwidth alone.
    pub fn unity() -> Self {
        BandwidthWeights {
            wgg: 1.0,
            wgd: 1.0,
            wmg: 1.0,
            wme: 1.0,
            wmd: 1.0,
            wmm: 1.0,
            weg: 1.0,
            wee: 1.0,
            wed: 1.0,
        }
    }
}

impl Default for BandwidthWeights {
    fn default() -> Self {
        Self::unity()
    }
}

/// Return the weight to use for `relay` when selecting for `role`, or
/// `0.0` if `relay` is ineligible for `role` at all (e.g. a non-Exit relay
/// can never be chosen for the exit position).
pub fn relay_weight(relay: &Relay, role: WeightRole, w: &BandwidthWeights) -> f64 {
    let bw = relay.bandwidth_weight() as f64;
    let g = relay.flags().contains(RelayFlags::GUARD);
    let e = relay.flags().contains(RelayFlags::EXIT);
    let factor = match (role, g, e) {
        (WeightRole::Guard, true, false) => w.wgg,
        (WeightRole::Guard, true, true) => w.wgd,
        (WeightRole::Guard, false, _) => 0.0,
        (WeightRole::Middle, true, false) => w.wmg,
        (WeightRole::Middle, false, true) => w.wme,
        (WeightRole::Middle, true, true) => w.wmd,
        (WeightRole::Middle, false, false) => w.wmm,
        (WeightRole::Exit, true, false) => w.weg,
        (WeightRole::Exit, false, true) => w.wee,
        (WeightRole::Exit, true, true) => w.wed,
        (WeightRole::Exit, false, false) => 0.0,
    };
    bw * factor
}

/// Draw one relay from `candidates` at random, weighted by
/// [`relay_weight`] for `role`. Returns `None` if every candidate has
/// weight zero (e.g. an empty Guard-flagged pool).
pub fn weighted_choose<'a, R: Rng + ?Sized>(
    rng: &mut R,
    candidates: &[&'a Relay],
    role: WeightRole,
    w: &BandwidthWeights,
) -> Option<&'a Relay> {
    if candidates.is_empty() {
        return None;
    }
    let weights: Vec<f64> = candidates
        .iter()
        .map(|r| relay_weight(r, role, w).max(0.0))
        .collect();
    if weights.iter().all(|x| *x <= 0.0) {
        return None;
    }
    let dist = WeightedIndex::new(&weights).ok()?;
    Some(candidates[dist.sample(rng)])
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::relay_builder;

    #[test]
    fn non_exit_never_weighted_for_exit_role() {
        let r = relay_builder().flags(RelayFlags::GUARD).build();
        assert_eq!(relay_weight(&r, WeightRole::Exit, &BandwidthWeights::unity()), 0.0);
    }

    #[test]
    fn exit_weight_scales_with_bandwidth() {
        let w = BandwidthWeights::unity();
        let lo = relay_builder().flags(RelayFlags::EXIT).bandwidth(10).build();
        let hi = relay_builder().flags(RelayFlags::EXIT).bandwidth(1000).build();
        assert!(relay_weight(&hi, WeightRole::Exit, &w) > relay_weight(&lo, WeightRole::Exit, &w));
    }
}
