//! Low-level cryptography wrappers used throughout the Tor protocol core.
//!
//! This crate owns the raw primitives the link and circuit handshakes build on: Curve25519
//! scalar multiplication, Ed25519 verification, HKDF-SHA256 expansion,
//! AES-128-CTR, the "running" SHA-1 digest used by relay cells, SHA3-256 (for
//! v3 onion-service blinding), constant-time comparison, and secret zeroing.
//! It does not know about cells, circuits, or the ntor *protocol* — those
//! compositions live in `tor-proto`, the way the teacher keeps `tor-llcrypto`
//! a pure wrapper crate and puts the handshake state machine in `tor-proto`.
pub mod cipher;
pub mod d;
pub mod pk;
pub mod util;

pub use util::ct::ct_eq;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ct_eq_basic() {
        assert!(ct_eq(b"abc", b"abc"));
        assert!(!ct_eq(b"abc", b"abd"));
        assert!(!ct_eq(b"abc", b"ab"));
    }
}
