//! The client's aggregate configuration (spec.md §7 "Config validated
//! eagerly, not lazily").
//!
//! [`TorClientConfig`] is the one object a caller builds (typically by
//! deserializing a TOML file) and hands to [`crate::TorClient::new`]; it
//! bundles every sub-crate's tunables plus this crate's own isolation
//! flags and state-directory location. [`TorClientConfig::validate`] is
//! called once, up front, so a typo'd config fails at startup rather than
//! partway through the first connection.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use tor_circmgr::{CircuitTiming, PoolConfig};
use tor_guardmgr::GuardParams;

use crate::err::{Error, Result};
use crate::isolation::IsolationConfig;

/// Aggregate configuration for a [`crate::TorClient`].
///
/// Deserializable with `serde` (the teacher's `arti` binary reads this
/// shape from a TOML file); every field has a [`Default`], so a caller
/// that only wants to override one tunable can use
/// `TorClientConfig { isolation: IsolationConfig { isolate_destinations: true, ..Default::default() }, ..Default::default() }`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TorClientConfig {
    /// Where persistent state (the guard set, at `state_dir/guards`) is
    /// kept across restarts.
    pub state_dir: PathBuf,
    /// Circuit-lifetime tuning.
    pub circuit_timing: CircuitTiming,
    /// Circuit-pool sizing.
    pub pool: PoolConfig,
    /// Guard-set sizing and demotion tuning.
    pub guard_params: GuardParams,
    /// Which SOCKS-request attributes partition the circuit pool.
    pub isolation: IsolationConfig,
}

impl TorClientConfig {
    /// Check this configuration for internal consistency (spec.md §7),
    /// before any circuit is built or any state file touched.
    ///
    /// Returns [`Error::ConfigInvalid`] naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.pool.min_circuits > self.pool.max_circuits {
            return Err(Error::ConfigInvalid(
                "pool.min_circuits must not exceed pool.max_circuits",
            ));
        }
        if self.pool.max_circuits == 0 {
            return Err(Error::ConfigInvalid("pool.max_circuits must be at least 1"));
        }
        if self.guard_params.min_active_guards > self.guard_params.max_active_guards {
            return Err(Error::ConfigInvalid(
                "guard_params.min_active_guards must not exceed guard_params.max_active_guards",
            ));
        }
        if self.guard_params.max_active_guards == 0 {
            return Err(Error::ConfigInvalid(
                "guard_params.max_active_guards must be at least 1",
            ));
        }
        if self.state_dir.as_os_str().is_empty() {
            return Err(Error::ConfigInvalid("state_dir must not be empty"));
        }
        Ok(())
    }

    /// Path to the persisted guard-set file under `state_dir` (spec.md §6
    /// `state/guards`).
    pub(crate) fn guard_state_path(&self) -> PathBuf {
        self.state_dir.join("guards")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_validates() {
        let mut config = TorClientConfig::default();
        config.state_dir = PathBuf::from("/tmp/arti-test-state");
        config.validate().unwrap();
    }

    #[test]
    fn rejects_min_over_max_circuits() {
        let mut config = TorClientConfig::default();
        config.state_dir = PathBuf::from("/tmp/arti-test-state");
        config.pool.min_circuits = 5;
        config.pool.max_circuits = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_state_dir() {
        let config = TorClientConfig::default();
        assert!(config.validate().is_err());
    }
}
