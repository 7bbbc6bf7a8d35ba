//! The key the circuit pool is indexed by (spec.md §4.8 "Isolation key
//! derivation", §4.9 "Maintains: a map IsolationKey -> CircuitPool").
//!
//! This crate treats the key as an opaque 32-byte label: computing it from
//! a SOCKS request's destination/credentials/source port is `arti-client`'s
//! job (it owns the `IsolateDestinations`/`IsolateSOCKSAuth`/
//! `IsolateClientPort` configuration flags that decide what goes into the
//! hash).

use std::fmt;

/// Opaque key partitioning the circuit pool: streams sharing a key may
/// share circuits (subject to `MaxDirtiness`); streams with different keys
/// never do.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IsolationKey([u8; 32]);

impl IsolationKey {
    /// Wrap an already-computed 32-byte key.
    pub fn new(bytes: [u8; 32]) -> Self {
        IsolationKey(bytes)
    }

    /// The key every stream gets when every isolation flag is disabled:
    /// everything shares one pool.
    pub fn unisolated() -> Self {
        IsolationKey([0; 32])
    }
}

impl fmt::Debug for IsolationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IsolationKey({:02x}{:02x}{:02x}{:02x}..)", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}
