//! Tunables for path selection and circuit-pool management.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Circuit lifetime tuning (spec.md §4.4 "Dirtiness").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitTiming {
    /// Once a circuit is older than this, it accepts no new streams; it is
    /// closed once its last stream ends.
    #[serde(with = "humantime_serde")]
    pub max_dirtiness: Duration,
}

impl Default for CircuitTiming {
    fn default() -> Self {
        CircuitTiming {
            max_dirtiness: Duration::from_secs(10 * 60),
        }
    }
}

/// Circuit-pool sizing, per isolation key (spec.md §4.9).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// The prebuild task keeps each pool at or above this many `Open`
    /// circuits.
    pub min_circuits: usize,
    /// A pool is never grown past this many circuits.
    pub max_circuits: usize,
    /// How many consecutive build failures within `failure_window` before
    /// [`crate::Error::NoCircuitAvailable`] is returned to the caller.
    pub max_build_failures: u32,
    /// The window over which `max_build_failures` is counted.
    #[serde(with = "humantime_serde")]
    pub failure_window: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            min_circuits: 2,
            max_circuits: 10,
            max_build_failures: 3,
            failure_window: Duration::from_secs(30),
        }
    }
}
