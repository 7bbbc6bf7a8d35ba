//! Ed25519 signing and verification, and the `Ed25519Identity` type used to
//! name relays and onion services.

use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use std::fmt;

pub use ed25519_dalek::SignatureError;

/// The length in bytes of an encoded Ed25519 public key.
pub const ED25519_ID_LEN: usize = 32;

/// An Ed25519 public key, taken as an unvalidated 32-byte identity.
///
/// Relay identity-ed25519 keys, onion-service identity keys, and blinded
/// identity keys are all represented this way until the moment they need to
/// verify a signature, at which point they're expanded into a
/// [`VerifyingKey`].
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Ed25519Identity([u8; 32]);

impl Ed25519Identity {
    /// Wrap a 32-byte value as an `Ed25519Identity`.
    pub fn new(bytes: [u8; 32]) -> Self {
        Ed25519Identity(bytes)
    }
    /// Return the encoded bytes of this identity.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Ed25519Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Identity({})", hex_encode(&self.0))
    }
}

/// Hex-encode without pulling in a dependency for eight lines of code.
fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

impl TryFrom<Ed25519Identity> for VerifyingKey {
    type Error = SignatureError;
    fn try_from(id: Ed25519Identity) -> Result<Self, Self::Error> {
        VerifyingKey::from_bytes(&id.0)
    }
}
impl From<VerifyingKey> for Ed25519Identity {
    fn from(k: VerifyingKey) -> Self {
        Ed25519Identity(k.to_bytes())
    }
}

/// Verify that `signature` over `message` was produced by the key named by
/// `identity`.
///
/// Returns `false` both when the signature is invalid and when `identity`
/// does not decode to a valid curve point; callers never need to distinguish
/// the two.
pub fn ed25519_verify(identity: &Ed25519Identity, message: &[u8], signature: &[u8; 64]) -> bool {
    let key = match VerifyingKey::try_from(*identity) {
        Ok(k) => k,
        Err(_) => return false,
    };
    let sig = Signature::from_bytes(signature);
    key.verify(message, &sig).is_ok()
}

/// Apply a key-blinding factor to an Ed25519 public key, returning the
/// blinded point as a fresh identity.
///
/// `factor` is reduced modulo the curve's group order before being applied,
/// matching how a scalar derived from a hash is used in key-blinding
/// schemes (e.g. the v3 onion-service blinded identity key, rend-spec-v3
/// §A.2). Returns `None` if `identity` does not decode to a valid curve
/// point.
pub fn blind_pubkey(identity: &Ed25519Identity, factor: &[u8; 32]) -> Option<Ed25519Identity> {
    let point = CompressedEdwardsY(identity.0).decompress()?;
    let scalar = Scalar::from_bytes_mod_order(*factor);
    let blinded = point * scalar;
    Some(Ed25519Identity(blinded.compress().to_bytes()))
}

/// A keypair able to sign. Used only in tests and by scripted onion-service
/// peers in this crate's own test vectors; real relay/service secret keys
/// are out of the client core's scope.
pub struct Keypair(SigningKey);

impl Keypair {
    /// Deterministically derive a keypair from a 32-byte seed (test use).
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Keypair(SigningKey::from_bytes(&seed))
    }
    /// Return the public identity matching this keypair.
    pub fn public(&self) -> Ed25519Identity {
        Ed25519Identity::from(self.0.verifying_key())
    }
    /// Sign `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.0.sign(message).to_bytes()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let kp = Keypair::from_seed([7_u8; 32]);
        let sig = kp.sign(b"hello world");
        assert!(ed25519_verify(&kp.public(), b"hello world", &sig));
        assert!(!ed25519_verify(&kp.public(), b"hello worlD", &sig));
    }

    #[test]
    fn blinding_is_deterministic_and_changes_the_key() {
        let kp = Keypair::from_seed([3_u8; 32]);
        let factor = [9_u8; 32];
        let blinded1 = blind_pubkey(&kp.public(), &factor).unwrap();
        let blinded2 = blind_pubkey(&kp.public(), &factor).unwrap();
        assert_eq!(blinded1, blinded2);
        assert_ne!(blinded1.as_bytes(), kp.public().as_bytes());
        let other_factor = [10_u8; 32];
        let blinded3 = blind_pubkey(&kp.public(), &other_factor).unwrap();
        assert_ne!(blinded1, blinded3);
    }
}
