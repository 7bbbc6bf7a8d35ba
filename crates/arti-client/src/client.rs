//! [`TorClient`]: the single handle a caller builds and holds, wiring the
//! directory, guard, circuit, and onion-service orchestrators into one
//! `connect`/`resolve` API (spec.md §4.7 step 1's address dispatch, §4.8's
//! front-end boundary).

use std::net::IpAddr;
use std::sync::Arc;

use safelog::Sensitive;
use tor_cell::relaycell::msg::ResolvedVal;
use tor_circmgr::{CircMgr, IsolationKey};
use tor_guardmgr::GuardMgr;
use tor_hsclient::{HsClient, HsClientConfig};
use tor_netdir::weight::BandwidthWeights;
use tor_netdir::DirProvider;
use tor_proto::stream::Stream;

use crate::addr::IntoTorAddr;
use crate::config::TorClientConfig;
use crate::err::Result;
use crate::events::{Event, EventReceiver, EventSender};

/// The high-level handle for making connections over Tor.
///
/// Cheap to clone: every clone shares the same circuit pool, guard state,
/// and event stream. A caller typically builds one `TorClient` for the
/// life of the process (the teacher's pattern for any handle that owns a
/// background task and persistent state) and clones it per connection or
/// per worker.
#[derive(Clone)]
pub struct TorClient {
    circmgr: CircMgr,
    hsclient: HsClient,
    events: EventSender,
}

impl TorClient {
    /// Build a client over `dir` (the directory collaborator), validating
    /// `config` first (spec.md §7).
    ///
    /// Loads any guard state already persisted under `config.state_dir`,
    /// and spawns the circuit pool's background prebuild task.
    pub fn new(dir: Arc<dyn DirProvider + Send + Sync>, config: TorClientConfig) -> Result<Self> {
        config.validate()?;

        let guards = Arc::new(GuardMgr::new(
            config.guard_state_path(),
            config.guard_params.clone(),
        )?);
        let circmgr = CircMgr::new(
            dir.clone(),
            guards,
            config.circuit_timing.clone(),
            config.pool,
            BandwidthWeights::unity(),
        );
        circmgr.spawn_prebuild_task();
        let hsclient = HsClient::new(dir, circmgr.clone(), HsClientConfig::default());

        Ok(TorClient {
            circmgr,
            hsclient,
            events: EventSender::new(),
        })
    }

    /// Subscribe to this client's event stream (ambient control surface;
    /// see [`crate::events`]).
    pub fn subscribe_events(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Open an application-data stream to `target`, isolated from other
    /// requests according to `isolation` (computed by the caller via
    /// [`crate::isolation::compute_isolation_key`]; spec.md §4.8's
    /// "dest-host"/`.onion` dispatch, §4.7 steps 1-9 for `.onion`
    /// addresses, §4.6 for everything else).
    pub async fn connect(
        &self,
        target: impl IntoTorAddr,
        isolation: IsolationKey,
    ) -> Result<Stream> {
        let addr = target.into_tor_addr()?;
        let port = addr.port();
        tracing::debug!(target = %Sensitive::new(addr.to_string()), "connecting");

        if let Some(onion) = addr.onion_address() {
            let stream = self.hsclient.connect(&onion, port).await?;
            self.events.publish(Event::StreamStateChanged {
                state: "connected (onion service)",
            });
            return Ok(stream);
        }

        let exit_constraint = tor_circmgr::ExitConstraint::Target {
            addr: addr.ip(),
            port,
        };
        let circuit = self.circmgr.get_exit_circuit(isolation, exit_constraint).await?;
        let mut stream = circuit.begin_stream(&addr.host_str(), port, 0_u32).await?;
        stream.connected().await?;
        self.events.publish(Event::StreamStateChanged {
            state: "connected",
        });
        Ok(stream)
    }

    /// Resolve `target`'s hostname to its addresses over Tor (spec.md §4.8
    /// SOCKS `RESOLVE`), without ever making an application connection.
    pub async fn resolve(
        &self,
        target: impl IntoTorAddr,
        isolation: IsolationKey,
    ) -> Result<Vec<IpAddr>> {
        let addr = target.into_tor_addr()?;
        let circuit = self
            .circmgr
            .get_exit_circuit(isolation, tor_circmgr::ExitConstraint::Resolve)
            .await?;
        let mut stream = circuit.resolve_stream(&addr.host_str()).await?;
        let answers = stream.resolved().await?;
        Ok(answers
            .into_iter()
            .filter_map(|(val, _ttl)| match val {
                ResolvedVal::Ip(ip) => Some(ip),
                _ => None,
            })
            .collect())
    }

    /// The underlying circuit manager, for callers that need pool-level
    /// control (the `arti` binary's SOCKS front-end uses this directly to
    /// avoid re-deriving an isolation key it's already computed).
    pub fn circmgr(&self) -> &CircMgr {
        &self.circmgr
    }
}
