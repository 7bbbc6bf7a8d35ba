//! High-level client API for connecting through Tor.
//!
//! [`TorClient`] is the single handle a caller builds: point it at a
//! directory collaborator and a [`TorClientConfig`], and it wires up guard
//! selection ([`tor_guardmgr`]), circuit pooling ([`tor_circmgr`]), and the
//! v3 onion-service client ([`tor_hsclient`]) behind one
//! `connect`/`resolve` API, dispatching on whether the target is a
//! `.onion` address or an ordinary hostname (spec.md §4.7 step 1, §4.8).

mod addr;
mod client;
mod config;
mod err;
pub mod events;
pub mod isolation;

pub use addr::{DangerouslyIntoTorAddr, IntoTorAddr, TorAddr, TorAddrError};
pub use client::TorClient;
pub use config::TorClientConfig;
pub use err::{Error, Result};
pub use isolation::{compute_isolation_key, IsolationConfig, IsolationInput};
pub use tor_circmgr::IsolationKey;
pub use tor_proto::stream::Stream;
