//! Tunable parameters governing guard selection and demotion (spec.md §4.4
//! "Failure semantics", ambient-stack `Config`/`*Config` convention).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Parameters controlling the size of the active guard set and how
/// aggressively a failing guard is demoted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardParams {
    /// Minimum number of confirmed guards to keep in the active set.
    pub min_active_guards: usize,
    /// Maximum number of confirmed guards to keep in the active set.
    pub max_active_guards: usize,
    /// Consecutive build failures through one guard, within
    /// `demotion_window`, before it is demoted to `Filtered`.
    pub consecutive_failures_before_demotion: u32,
    /// The sliding window within which consecutive failures count toward
    /// demotion (spec.md §4.4: "3 consecutive failures ... within 30s").
    #[serde(with = "humantime_serde")]
    pub demotion_window: Duration,
    /// How long a demoted (`Filtered`) guard is excluded from selection
    /// before it is eligible to be tried again (spec.md §4.4: "for 1h").
    #[serde(with = "humantime_serde")]
    pub demotion_duration: Duration,
}

impl Default for GuardParams {
    fn default() -> Self {
        GuardParams {
            min_active_guards: 1,
            max_active_guards: 3,
            consecutive_failures_before_demotion: 3,
            demotion_window: Duration::from_secs(30),
            demotion_duration: Duration::from_secs(60 * 60),
        }
    }
}
