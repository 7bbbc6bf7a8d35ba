//! Client side of the v3 onion-service (hidden-service) protocol.
//!
//! This crate turns a `.onion` address into an open application stream: it
//! locates and verifies the service's descriptor via the HSDir ring
//! ([`hsdir`]), then runs the introduction/rendezvous dance ([`client`])
//! using `tor-proto`'s `hs-ntor` handshake and `tor-circmgr`'s circuit
//! building.

mod client;
mod descriptor;
mod err;
mod hsdir;

pub use client::{HsClient, HsClientConfig};
pub use descriptor::{Descriptor, IntroductionPoint};
pub use err::{Error, Result};
