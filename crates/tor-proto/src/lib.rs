//! Core Tor link, circuit, and stream protocol implementation (spec.md
//! §4.3-§4.5): the TLS link connection and VERSIONS/NETINFO handshake, the
//! circuit build state machine and onion-layered relay-cell crypto, and the
//! per-circuit stream multiplexer with SENDME-based flow control.
//!
//! This crate knows nothing about *which* relays to dial or extend to (that
//! is `tor-netdir`/`tor-guardmgr`/`tor-circmgr`'s job) or how streams are
//! assigned to circuits (`tor-circmgr`/`arti-client`): it only knows how to
//! drive the wire protocol once given a path.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod circuit;
pub mod crypto;
pub mod err;
pub mod stream;

pub use err::{Error, Result};
