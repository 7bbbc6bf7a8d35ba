//! Message digests and key derivation functions.
//!
//! This covers the "running digest" used by relay cells, SHA3-256 (used for
//! the v3 onion-address checksum and for HSDir/descriptor-ID derivation),
//! and HKDF-SHA256 (the ntor key-derivation function).

use digest::Digest;
use hkdf::Hkdf;
use sha1::Sha1;
use sha2::Sha256;
use sha3::Sha3_256;

/// A running SHA-1 digest, as kept per-hop per-direction across every relay
/// cell seen in that direction (`Df`/`Db` in the link protocol).
///
/// Unlike a one-shot digest, this state is never finalized: each relay cell
/// is folded in with [`Sha1Running::update`], and [`Sha1Running::peek4`]
/// takes a snapshot of "what would `.finalize()` return right now" without
/// consuming the running state, so the same state can keep accumulating
/// cells afterwards.
#[derive(Clone)]
pub struct Sha1Running(Sha1);

impl Sha1Running {
    /// Start a running digest seeded with `seed` (the 20 bytes of `Df`/`Db`
    /// produced by the ntor key schedule).
    pub fn new(seed: &[u8]) -> Self {
        let mut inner = Sha1::new();
        inner.update(seed);
        Sha1Running(inner)
    }

    /// Fold `bytes` into the running digest. Called once per relay cell
    /// observed in this direction; this is the "digest monotonicity"
    /// invariant every relay cell must satisfy.
    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    /// Return the first 4 bytes of `SHA1(seed || cell_1 || cell_2 || ...)`
    /// as of right now, without disturbing the running state.
    ///
    /// This is used both to stamp the Digest field of an outbound cell, and
    /// to check the Digest field of an inbound one, during onion layering.
    pub fn peek4(&self) -> [u8; 4] {
        let snapshot = self.0.clone();
        let digest = snapshot.finalize();
        let mut out = [0_u8; 4];
        out.copy_from_slice(&digest[..4]);
        out
    }
}

/// Compute `SHA3-256(data)`.
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    let out = hasher.finalize();
    let mut result = [0_u8; 32];
    result.copy_from_slice(&out);
    result
}

/// HKDF-SHA256 expand-only, with an implicit empty salt (the ntor handshake
/// does not use an HKDF "extract" step over a separate salt; it feeds
/// `secret_input` directly to `HKDF-expand` keyed by a protocol-id string —
/// see the `prk` parameter here, which callers set to
/// `HKDF-extract(t_key, secret_input)` themselves per rend-spec/tor-spec).
///
/// Returns `n` bytes of expanded key material.
pub fn hkdf_sha256_expand(prk: &[u8], info: &[u8], n: usize) -> Vec<u8> {
    let hk = Hkdf::<Sha256>::from_prk(prk).expect("PRK length is always valid for HKDF-SHA256");
    let mut out = vec![0_u8; n];
    hk.expand(info, &mut out)
        .expect("requested output within HKDF-SHA256's 255*32-byte limit");
    out
}

/// `HKDF-extract(salt, ikm)` with SHA256, returning the pseudorandom key.
pub fn hkdf_sha256_extract(salt: &[u8], ikm: &[u8]) -> [u8; 32] {
    let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), ikm);
    prk.into()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn running_digest_advances() {
        let mut d = Sha1Running::new(b"seed-bytes-000000000");
        let d0 = d.peek4();
        d.update(b"first cell");
        let d1 = d.peek4();
        d.update(b"second cell");
        let d2 = d.peek4();
        assert_ne!(d0, d1);
        assert_ne!(d1, d2);
    }

    #[test]
    fn sha3_256_is_stable() {
        let out = sha3_256(b"");
        // Known-answer for SHA3-256 of the empty string.
        let expected =
            hex::decode("a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434")
                .unwrap();
        assert_eq!(&out[..], &expected[..]);
    }
}
