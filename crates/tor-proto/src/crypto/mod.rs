//! Per-circuit cryptography: the ntor handshake and onion-layered relay
//! cell encryption (spec.md §4.2, §4.4).

pub mod cell;
pub mod handshake;
