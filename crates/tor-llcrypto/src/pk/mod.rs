//! Public-key cryptography wrappers: Curve25519 (ntor) and Ed25519
//! (relay/onion-service identities and signatures).

pub mod curve25519;
pub mod ed25519;
