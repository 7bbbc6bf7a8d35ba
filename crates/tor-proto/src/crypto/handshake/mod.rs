//! Key-exchange handshakes used to extend or address a circuit.
//!
//! [`ntor`] is the plain circuit-extension handshake (CREATE2/EXTEND2);
//! [`hs_ntor`] is the v3 onion-service variant used between a client and an
//! introduction point (spec.md §4.7 steps 5 and 8).

pub mod hs_ntor;
pub mod ntor;

pub use ntor::{client_handshake, client_handshake2, NtorClientState, NtorKeys};
