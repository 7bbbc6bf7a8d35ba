//! Cryptography for the v3 onion-service ("hidden service") protocol.
//!
//! This crate owns the pieces of the rendezvous protocol that are pure data
//! and pure math: the [`OnionAddress`](addr::OnionAddress) encoding, the
//! [`TimePeriod`](time::TimePeriod) epoch, blinded-key derivation, and the
//! `hs-ntor` handshake used between a client and an introduction point. It
//! has no notion of descriptors, circuits, or HSDirs — those live in
//! `tor-hsclient`.

pub mod addr;
mod err;
pub mod ops;
pub mod pk;
pub mod time;

pub use err::Error;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A value that identifies an onion service during a given time period
/// (`N_hs_subcred` in rend-spec-v3).
///
/// Derived from the service's identity key and its blinded key for the
/// current period; used as input to the HSDir descriptor-ID and to the
/// descriptor's inner-layer encryption.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Subcredential([u8; 32]);

impl Subcredential {
    /// Wrap raw bytes as a `Subcredential`.
    pub fn new(bytes: [u8; 32]) -> Self {
        Subcredential(bytes)
    }
    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Counts which revision of a descriptor is which, within a time period.
///
/// A descriptor with a higher-valued counter supersedes one with a lower
/// one; there may be gaps in the numbering.
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq)]
pub struct RevisionCounter(u64);

impl RevisionCounter {
    /// Wrap a raw counter value.
    pub fn new(v: u64) -> Self {
        RevisionCounter(v)
    }
    /// Return the raw counter value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// An opaque 20-byte value used at a rendezvous point to match a client's
/// `ESTABLISH_RENDEZVOUS` with the service's later `RENDEZVOUS1`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RendCookie([u8; 20]);

impl RendCookie {
    /// Wrap a raw 20-byte cookie.
    pub fn new(bytes: [u8; 20]) -> Self {
        RendCookie(bytes)
    }
    /// Generate a fresh random cookie.
    pub fn generate<R: rand_core::RngCore + rand_core::CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0_u8; 20];
        rng.fill_bytes(&mut bytes);
        RendCookie(bytes)
    }
    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}
