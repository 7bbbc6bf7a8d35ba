//! The orchestrator's circuit-pool half (spec.md §4.9): a map
//! `IsolationKey -> CircuitPool`, a prebuild task keeping each pool topped
//! up, and first-fit assignment with synchronous build-on-miss.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::rngs::OsRng;

use tor_guardmgr::GuardMgr;
use tor_linkspec::{ChanTarget, RelayIds};
use tor_netdir::weight::BandwidthWeights;
use tor_netdir::{DirProvider, ExitPolicy, Relay};
use tor_proto::channel::Channel;
use tor_proto::circuit::Circuit;

use crate::config::{CircuitTiming, PoolConfig};
use crate::err::{Error, Result};
use crate::path::{self, ExitConstraint};
use crate::isolation::IsolationKey;

/// How long a single circuit build (guard dial plus every EXTEND2) may take
/// before [`tor_proto::Error::HandshakeTimeout`] gives up on it.
const BUILD_DEADLINE: Duration = Duration::from_secs(60);

/// How often the prebuild task re-checks every pool's occupancy.
const PREBUILD_INTERVAL: Duration = Duration::from_secs(10);

/// A circuit held in a pool, with the bit of path-selection state the
/// assignment step needs without re-deriving it from a consensus lookup.
struct PooledCircuit {
    circuit: Circuit,
    exit_policy: ExitPolicy,
}

/// One isolation key's circuits, plus its recent build-failure history.
#[derive(Default)]
struct Pool {
    circuits: Vec<PooledCircuit>,
    recent_failures: VecDeque<Instant>,
}

/// Builds and pools circuits on behalf of the SOCKS front-end (spec.md
/// §4.6, §4.9). Cheap to clone: every clone shares the same pools and
/// link-connection cache.
#[derive(Clone)]
pub struct CircMgr {
    inner: Arc<Inner>,
}

struct Inner {
    dir: Arc<dyn DirProvider + Send + Sync>,
    guards: Arc<GuardMgr>,
    timing: CircuitTiming,
    pool_config: PoolConfig,
    weights: BandwidthWeights,
    /// One [`Channel`] per first hop we've already dialed, so repeated
    /// circuit builds through the same guard reuse the same link
    /// connection (spec.md §4.4: a circuit build dials the first hop's
    /// link, then EXTENDs).
    channels: Mutex<HashMap<RelayIds, Channel>>,
    pools: Mutex<HashMap<IsolationKey, Pool>>,
}

impl CircMgr {
    /// Build a circuit manager over `dir` (the directory collaborator) and
    /// `guards` (the guard manager shared with the rest of the client).
    pub fn new(
        dir: Arc<dyn DirProvider + Send + Sync>,
        guards: Arc<GuardMgr>,
        timing: CircuitTiming,
        pool_config: PoolConfig,
        weights: BandwidthWeights,
    ) -> Self {
        CircMgr {
            inner: Arc::new(Inner {
                dir,
                guards,
                timing,
                pool_config,
                weights,
                channels: Mutex::new(HashMap::new()),
                pools: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Get a circuit usable for `exit_constraint` under `isolation`,
    /// reusing a pooled one if one fits, else building and pooling a new
    /// one synchronously (spec.md §4.9 "Assignment").
    pub async fn get_exit_circuit(
        &self,
        isolation: IsolationKey,
        exit_constraint: ExitConstraint,
    ) -> Result<Circuit> {
        if let Some(circuit) = self.find_fit(isolation, &exit_constraint) {
            return Ok(circuit);
        }
        self.check_failure_budget(isolation)?;
        match self.build_and_insert(isolation, &exit_constraint).await {
            Ok(circuit) => {
                self.clear_failures(isolation);
                Ok(circuit)
            }
            Err(e) => {
                if self.record_failure(isolation) {
                    Err(Error::NoCircuitAvailable)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Build a fresh, unpooled circuit for a v3 onion-service leg (HSDir
    /// fetch, introduction, or rendezvous): spec.md §4.7's circuits are
    /// single-purpose and torn down or repurposed explicitly by the onion
    /// client, never shared across isolation keys.
    pub async fn build_onion_circuit(&self) -> Result<Circuit> {
        let consensus = self.inner.dir.get_consensus().await?;
        let path = path::select_onion_path(&consensus, &self.inner.weights, &mut OsRng)?;
        let first_hop = consensus
            .by_identity(&path[0].ids)
            .ok_or(Error::NoPath)?;
        let channel = self.channel_for(first_hop).await?;
        Ok(Circuit::build(&channel, &path, BUILD_DEADLINE).await?)
    }

    /// Build a fresh, unpooled circuit ending at `target` (spec.md §4.7's
    /// introduction-point and rendezvous-point circuits, which must land on
    /// a specific relay rather than a sampled one).
    pub async fn build_circuit_to(&self, target: &Relay) -> Result<Circuit> {
        let consensus = self.inner.dir.get_consensus().await?;
        let path = path::select_path_to(&consensus, target, &self.inner.weights, &mut OsRng)?;
        let first_hop = consensus
            .by_identity(&path[0].ids)
            .ok_or(Error::NoPath)?;
        let channel = self.channel_for(first_hop).await?;
        Ok(Circuit::build(&channel, &path, BUILD_DEADLINE).await?)
    }

    /// Spawn the background task that keeps every already-used pool topped
    /// up to [`PoolConfig::min_circuits`] (spec.md §4.9 "prebuild task").
    pub fn spawn_prebuild_task(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                this.prebuild_pass().await;
                tokio::time::sleep(PREBUILD_INTERVAL).await;
            }
        });
    }

    async fn prebuild_pass(&self) {
        let keys: Vec<IsolationKey> = {
            let pools = self.inner.pools.lock().expect("circuit pool lock poisoned");
            pools.keys().copied().collect()
        };
        for key in keys {
            let deficit = {
                let pools = self.inner.pools.lock().expect("circuit pool lock poisoned");
                match pools.get(&key) {
                    Some(pool) => self
                        .inner
                        .pool_config
                        .min_circuits
                        .saturating_sub(pool.circuits.len()),
                    None => 0,
                }
            };
            for _ in 0..deficit {
                if let Err(e) = self.build_and_insert(key, &ExitConstraint::Any).await {
                    tracing::debug!(?key, error = %e, "prebuild attempt did not complete");
                    break;
                }
            }
        }
    }

    fn find_fit(&self, isolation: IsolationKey, exit_constraint: &ExitConstraint) -> Option<Circuit> {
        let pools = self.inner.pools.lock().expect("circuit pool lock poisoned");
        let pool = pools.get(&isolation)?;
        pool.circuits
            .iter()
            .find(|pc| {
                pc.circuit.age() < self.inner.timing.max_dirtiness
                    && exit_constraint.accepts(&pc.exit_policy)
            })
            .map(|pc| pc.circuit.clone())
    }

    async fn build_and_insert(
        &self,
        isolation: IsolationKey,
        exit_constraint: &ExitConstraint,
    ) -> Result<Circuit> {
        let consensus = self.inner.dir.get_consensus().await?;
        let guard = self.inner.guards.select_guard(&consensus)?;
        let path = path::select_exit_path(
            &consensus,
            guard.ids(),
            exit_constraint,
            &self.inner.weights,
            &mut OsRng,
        )?;
        let exit_policy = consensus
            .by_identity(&path[2].ids)
            .map(|r| r.policy().clone())
            .unwrap_or_else(ExitPolicy::reject_all);
        let first_hop = consensus
            .by_identity(&path[0].ids)
            .ok_or(Error::NoPath)?;

        let channel = self.channel_for(first_hop).await?;
        match Circuit::build(&channel, &path, BUILD_DEADLINE).await {
            Ok(circuit) => {
                let _ = self.inner.guards.report_success(guard.ids());
                self.insert(isolation, &circuit, exit_policy);
                Ok(circuit)
            }
            Err(e) => {
                let _ = self.inner.guards.report_failure(guard.ids());
                self.evict_channel(guard.ids());
                Err(e.into())
            }
        }
    }

    fn insert(&self, isolation: IsolationKey, circuit: &Circuit, exit_policy: ExitPolicy) {
        let mut pools = self.inner.pools.lock().expect("circuit pool lock poisoned");
        let pool = pools.entry(isolation).or_default();
        if pool.circuits.len() < self.inner.pool_config.max_circuits {
            pool.circuits.push(PooledCircuit {
                circuit: circuit.clone(),
                exit_policy,
            });
        }
    }

    /// Returns `Err` (with the budget already exhausted) if a fresh build
    /// attempt shouldn't even be tried right now.
    fn check_failure_budget(&self, isolation: IsolationKey) -> Result<()> {
        let mut pools = self.inner.pools.lock().expect("circuit pool lock poisoned");
        let pool = pools.entry(isolation).or_default();
        prune_failures(pool, self.inner.pool_config.failure_window);
        if pool.recent_failures.len() as u32 >= self.inner.pool_config.max_build_failures {
            return Err(Error::NoCircuitAvailable);
        }
        Ok(())
    }

    /// Record a build failure; returns `true` if this crossed the
    /// `max_build_failures`-within-`failure_window` threshold (spec.md
    /// §4.9).
    fn record_failure(&self, isolation: IsolationKey) -> bool {
        let mut pools = self.inner.pools.lock().expect("circuit pool lock poisoned");
        let pool = pools.entry(isolation).or_default();
        prune_failures(pool, self.inner.pool_config.failure_window);
        pool.recent_failures.push_back(Instant::now());
        pool.recent_failures.len() as u32 >= self.inner.pool_config.max_build_failures
    }

    fn clear_failures(&self, isolation: IsolationKey) {
        let mut pools = self.inner.pools.lock().expect("circuit pool lock poisoned");
        if let Some(pool) = pools.get_mut(&isolation) {
            pool.recent_failures.clear();
        }
    }

    async fn channel_for(&self, relay: &Relay) -> Result<Channel> {
        {
            let channels = self.inner.channels.lock().expect("channel cache lock poisoned");
            if let Some(channel) = channels.get(relay.ids()) {
                return Ok(channel.clone());
            }
        }
        let channel = Channel::dial(relay, BUILD_DEADLINE).await?;
        self.inner
            .channels
            .lock()
            .expect("channel cache lock poisoned")
            .insert(relay.ids().clone(), channel.clone());
        Ok(channel)
    }

    fn evict_channel(&self, ids: &RelayIds) {
        self.inner
            .channels
            .lock()
            .expect("channel cache lock poisoned")
            .remove(ids);
    }
}

fn prune_failures(pool: &mut Pool, window: Duration) {
    let cutoff = Instant::now() - window;
    while matches!(pool.recent_failures.front(), Some(t) if *t < cutoff) {
        pool.recent_failures.pop_front();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::PoolConfig;

    #[test]
    fn third_failure_within_window_trips_no_circuit_available() {
        let mut pool = Pool::default();
        let window = Duration::from_secs(30);
        let cfg = PoolConfig::default();
        assert_eq!(cfg.max_build_failures, 3);
        for _ in 0..2 {
            pool.recent_failures.push_back(Instant::now());
        }
        prune_failures(&mut pool, window);
        assert!((pool.recent_failures.len() as u32) < cfg.max_build_failures);
        pool.recent_failures.push_back(Instant::now());
        assert!((pool.recent_failures.len() as u32) >= cfg.max_build_failures);
    }
}
