//! Path selection and circuit-pool orchestration (spec.md §4.6, §4.9).
//!
//! This crate turns "I need a circuit that can reach host:port under
//! isolation key K" into an actual, already-open [`tor_proto::circuit::Circuit`]:
//! sampling a guard/middle/exit triple that respects the distinctness and
//! bandwidth-weighting rules, dialing and building it over [`tor_proto`],
//! and pooling the result so later requests under the same isolation key
//! can reuse it instead of paying a fresh 3-hop build.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod err;
mod isolation;
mod mgr;
mod path;

pub use config::{CircuitTiming, PoolConfig};
pub use err::{Error, Result};
pub use isolation::IsolationKey;
pub use mgr::CircMgr;
pub use path::ExitConstraint;
