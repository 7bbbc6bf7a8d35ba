//! Guard-relay selection and persistence (spec.md §3 "Guard set", §4.6
//! step 1, §4.4 "Failure semantics").
//!
//! A Tor client doesn't pick a fresh first hop for every circuit: doing so
//! would let a hostile network observe enough distinct entry points to
//! eventually correlate a client with its traffic. Instead it commits to a
//! small, slowly-changing *guard set*, persisted across restarts, and
//! prefers the same guard build after build. [`GuardMgr`] is the
//! single-writer-many-readers facade the orchestrator (`tor-circmgr`) uses
//! to pick a guard and to report how a build through it went (spec.md §5
//! "Guard set is a single writer / many readers with a lock; writes are
//! persisted synchronously").

pub mod config;
pub mod err;
pub mod guard;
pub mod persist;

use std::path::PathBuf;
use std::sync::Mutex;

use rand::rngs::ThreadRng;
use tor_linkspec::OwnedChanTarget;
use tor_linkspec::RelayIds;
use tor_netdir::Consensus;

pub use config::GuardParams;
pub use err::{Error, Result};
pub use guard::{GuardEntry, GuardSet, GuardState};

/// Single-writer, many-reader guard-set manager.
///
/// Every mutating call takes `&self` (not `&mut self`): the guard set is
/// process-wide state, so `GuardMgr` is usually held behind an `Arc` and
/// shared between the orchestrator's builder tasks. The internal
/// [`Mutex`] serializes writers; it is never held across an `.await`
/// point by callers, since selection and reporting are both synchronous,
/// CPU-only operations.
pub struct GuardMgr {
    /// Where the guard set is persisted (spec.md §6 `state/guards`).
    state_path: PathBuf,
    /// The guard set itself, plus its tunable parameters.
    inner: Mutex<Inner>,
}

/// The mutable state behind the lock.
struct Inner {
    set: GuardSet,
    params: GuardParams,
}

impl GuardMgr {
    /// Construct a `GuardMgr`, loading any previously persisted guard set
    /// from `state_path`. A missing file starts from an empty set.
    pub fn new(state_path: PathBuf, params: GuardParams) -> Result<Self> {
        let set = persist::load(&state_path)?;
        Ok(GuardMgr {
            state_path,
            inner: Mutex::new(Inner { set, params }),
        })
    }

    /// Choose a guard for a new circuit build (spec.md §4.6 step 1).
    pub fn select_guard(&self, consensus: &Consensus) -> Result<OwnedChanTarget> {
        let mut rng = ThreadRng::default();
        let mut inner = self.inner.lock().expect("guard set lock poisoned");
        let params = inner.params.clone();
        inner.set.select(consensus, &params, &mut rng)
    }

    /// Report that a circuit build through `guard` succeeded, persisting
    /// the updated state synchronously (spec.md §5: "writes are persisted
    /// synchronously").
    pub fn report_success(&self, guard: &RelayIds) -> Result<()> {
        let mut inner = self.inner.lock().expect("guard set lock poisoned");
        inner.set.report_success(guard);
        persist::save(&inner.set, &self.state_path)
    }

    /// Report that a circuit build through `guard` failed (spec.md §4.4:
    /// `AuthFailure`/`HandshakeTimeout`), applying the demotion policy and
    /// persisting the result.
    pub fn report_failure(&self, guard: &RelayIds) -> Result<()> {
        let mut inner = self.inner.lock().expect("guard set lock poisoned");
        let params = inner.params.clone();
        inner.set.report_failure(guard, &params);
        persist::save(&inner.set, &self.state_path)
    }

    /// Return a snapshot of the current guard set, for diagnostics or the
    /// control-surface event stream.
    pub fn snapshot(&self) -> GuardSet {
        self.inner.lock().expect("guard set lock poisoned").set.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
    use std::time::{Duration, SystemTime};
    use tor_linkspec::RsaIdentity;
    use tor_llcrypto::pk::{curve25519, ed25519};
    use tor_netdir::{ExitPolicy, Relay, RelayFlags};

    fn relay(byte: u8) -> Relay {
        let ids = RelayIds::new(
            RsaIdentity::from_bytes(&[byte; 20]).unwrap(),
            ed25519::Ed25519Identity::new([byte; 32]),
        );
        Relay::new(
            ids,
            format!("r{byte}"),
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, byte), 9001)),
            9030,
            RelayFlags::GUARD | RelayFlags::RUNNING | RelayFlags::VALID,
            1000,
            ExitPolicy::reject_all(),
            curve25519::PublicKey::from([byte; 32]),
        )
    }

    fn consensus() -> Consensus {
        let now = SystemTime::now();
        Consensus::new(
            vec![relay(1)],
            now - Duration::from_secs(60),
            now + Duration::from_secs(3600),
            now + Duration::from_secs(7200),
        )
    }

    #[test]
    fn survives_restart_across_a_fresh_manager() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("guards");

        let mgr1 = GuardMgr::new(path.clone(), GuardParams::default()).unwrap();
        let picked = mgr1.select_guard(&consensus()).unwrap();
        mgr1.report_success(picked.ids()).unwrap();

        // spec.md §8 "Guard stability": a fresh manager over the same
        // state file picks the same primary guard first.
        let mgr2 = GuardMgr::new(path, GuardParams::default()).unwrap();
        let picked_again = mgr2.select_guard(&consensus()).unwrap();
        assert_eq!(picked.ids(), picked_again.ids());
    }
}
