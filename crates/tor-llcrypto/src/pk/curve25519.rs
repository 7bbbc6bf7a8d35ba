//! Curve25519 public/secret keys and Diffie-Hellman, as used by the ntor
//! handshake.

use rand_core::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey as DalekPublic, StaticSecret};
use zeroize::Zeroize;

/// The length in bytes of an encoded Curve25519 public key.
pub const CURVE25519_PUBLIC_LEN: usize = 32;

/// A Curve25519 public key, as used for a relay's ntor onion key or a
/// client's per-circuit ephemeral key.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PublicKey(DalekPublic);

impl PublicKey {
    /// Interpret a 32-byte value as a Curve25519 public key.
    ///
    /// This never fails: every 32-byte string is a valid (possibly
    /// low-order) Curve25519 point representation.
    pub fn from(bytes: [u8; 32]) -> Self {
        PublicKey(DalekPublic::from(bytes))
    }
    /// Return the encoded form of this key.
    pub fn to_bytes(&self) -> [u8; 32] {
        *self.0.as_bytes()
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// An ephemeral Curve25519 secret key, zeroized on drop.
///
/// Every per-hop ntor exchange generates a fresh one of these; it is
/// consumed (and its bytes zeroized) by [`StaticSecret::diffie_hellman`]
/// once the handshake completes.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct EphemeralSecret(StaticSecret);

impl EphemeralSecret {
    /// Generate a new random ephemeral secret key.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0_u8; 32];
        rng.fill_bytes(&mut bytes);
        let secret = StaticSecret::from(bytes);
        bytes.zeroize();
        EphemeralSecret(secret)
    }
    /// Compute the public key matching this secret.
    pub fn public(&self) -> PublicKey {
        PublicKey(DalekPublic::from(&self.0))
    }
    /// Perform Diffie-Hellman with `their_public`, yielding 32 bytes of
    /// shared secret (the raw Curve25519 output, *not* a hash of it).
    pub fn diffie_hellman(&self, their_public: &PublicKey) -> [u8; 32] {
        *self.0.diffie_hellman(&their_public.0).as_bytes()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn dh_agrees() {
        let a = EphemeralSecret::random(&mut OsRng);
        let b = EphemeralSecret::random(&mut OsRng);
        let shared_a = a.diffie_hellman(&b.public());
        let shared_b = b.diffie_hellman(&a.public());
        assert_eq!(shared_a, shared_b);
    }
}
