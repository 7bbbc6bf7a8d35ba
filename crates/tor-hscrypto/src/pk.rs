//! Key types used in the v3 onion-service protocol, and the blinded-key
//! derivation that ties them together (spec.md §3 "Descriptor", §4.7 step 2).

use tor_llcrypto::pk::{curve25519, ed25519};

use crate::time::TimePeriod;
use crate::Subcredential;

/// The label used as the first input to the blinding-factor hash, per
/// spec.md §4.7 step 2 and rend-spec-v3's key-blinding scheme.
const BLIND_STRING: &[u8] = b"Derive temporary signing key";

/// Compute the blinding factor for `period`, as a 32-byte value fed to
/// [`tor_llcrypto::pk::ed25519::blind_pubkey`].
///
/// This follows the literal formula in spec.md §4.7 step 2:
/// `SHA3-256("Derive temporary signing key" || pubkey || be64(time_period))`.
/// (rend-spec-v3's full derivation folds in additional domain-separation
/// material; this core's simplified form is documented as an explicit
/// open-question resolution in DESIGN.md.)
fn blinding_factor(pubkey: &ed25519::Ed25519Identity, period: TimePeriod) -> [u8; 32] {
    let mut input = Vec::with_capacity(BLIND_STRING.len() + 32 + 8);
    input.extend_from_slice(BLIND_STRING);
    input.extend_from_slice(pubkey.as_bytes());
    input.extend_from_slice(&period.interval_num().to_be_bytes());
    tor_llcrypto::d::sha3_256(&input)
}

/// Derive the subcredential for a service during `period`, from its
/// identity key and its blinded key for that period.
fn derive_subcredential(
    identity: &OnionIdKey,
    blinded: &BlindedOnionIdKey,
    period: TimePeriod,
) -> Subcredential {
    // N_hs_subcred = H("subcredential" | N_hs_cred), N_hs_cred = H("credential" | identity)
    let cred = tor_llcrypto::d::sha3_256(
        &[b"credential".as_slice(), identity.0.as_bytes()].concat(),
    );
    let mut input = Vec::with_capacity(13 + 32 + 32 + 8);
    input.extend_from_slice(b"subcredential");
    input.extend_from_slice(&cred);
    input.extend_from_slice(blinded.0.as_bytes());
    input.extend_from_slice(&period.interval_num().to_be_bytes());
    Subcredential::new(tor_llcrypto::d::sha3_256(&input))
}

/// The long-term identity of a v3 onion service: the ed25519 public key
/// encoded (with a checksum) into its `.onion` address.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OnionIdKey(ed25519::Ed25519Identity);

impl OnionIdKey {
    /// Wrap a raw ed25519 identity as an onion service's long-term key.
    pub fn new(id: ed25519::Ed25519Identity) -> Self {
        OnionIdKey(id)
    }
    /// Return the raw identity bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
    /// Derive this service's blinded key and subcredential for `period`
    /// (spec.md §4.7 step 2).
    pub fn compute_blinded_key(
        &self,
        period: TimePeriod,
    ) -> Option<(BlindedOnionIdKey, Subcredential)> {
        let factor = blinding_factor(&self.0, period);
        let blinded_id = ed25519::blind_pubkey(&self.0, &factor)?;
        let blinded = BlindedOnionIdKey(blinded_id);
        let subcred = derive_subcredential(self, &blinded, period);
        Some((blinded, subcred))
    }
}

/// A service's blinded identity key for one time period.
///
/// Used to compute the service's HSDir descriptor-ID for that period, and
/// to verify the signing-key certificate embedded in its descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlindedOnionIdKey(ed25519::Ed25519Identity);

impl BlindedOnionIdKey {
    /// Return the raw blinded identity bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
    /// Return the raw identity, for HSDir ring distance computation.
    pub fn identity(&self) -> &ed25519::Ed25519Identity {
        &self.0
    }

    /// Wrap a raw identity as an already-blinded key, for tests that sign a
    /// descriptor cert directly with a keypair rather than deriving a real
    /// blinding factor (which this crate, being client-only, has no way to
    /// invert into a usable secret key).
    #[cfg(any(test, feature = "testing"))]
    pub fn for_testing(id: ed25519::Ed25519Identity) -> Self {
        BlindedOnionIdKey(id)
    }
    /// Verify that `cert_signature` over `signing_key` was produced by this
    /// blinded key (spec.md §3 "a descriptor is accepted only if its
    /// signing-key cert verifies under the blinded pubkey").
    pub fn verify_signing_key_cert(
        &self,
        signing_key: &DescSigningKey,
        cert_signature: &[u8; 64],
    ) -> bool {
        ed25519::ed25519_verify(&self.0, signing_key.0.as_bytes(), cert_signature)
    }
}

/// A descriptor's signing key: cross-signed by the blinded identity key,
/// and in turn used to sign the descriptor body.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DescSigningKey(ed25519::Ed25519Identity);

impl DescSigningKey {
    /// Wrap a raw ed25519 identity as a descriptor signing key.
    pub fn new(id: ed25519::Ed25519Identity) -> Self {
        DescSigningKey(id)
    }
    /// Verify `signature` over `descriptor_body` under this key.
    pub fn verify(&self, descriptor_body: &[u8], signature: &[u8; 64]) -> bool {
        ed25519::ed25519_verify(&self.0, descriptor_body, signature)
    }
}

/// A key used to identify and authenticate an onion service at one
/// introduction point; the introduction point recognizes the key without
/// knowing which service it belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IntroPtAuthKey(ed25519::Ed25519Identity);

impl IntroPtAuthKey {
    /// Wrap a raw ed25519 identity as an introduction-point auth key.
    pub fn new(id: ed25519::Ed25519Identity) -> Self {
        IntroPtAuthKey(id)
    }
    /// Return the raw identity bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

/// A curve25519 key used in the `hs-ntor` handshake between a client and an
/// introduction point, on behalf of the service.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IntroPtEncKey(curve25519::PublicKey);

impl IntroPtEncKey {
    /// Wrap a raw curve25519 public key as an introduction-point encryption
    /// key.
    pub fn new(k: curve25519::PublicKey) -> Self {
        IntroPtEncKey(k)
    }
    /// Return the wrapped key.
    pub fn as_curve25519(&self) -> &curve25519::PublicKey {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tor_llcrypto::pk::ed25519::Keypair;

    #[test]
    fn blinded_key_is_deterministic() {
        let kp = Keypair::from_seed([5_u8; 32]);
        let id = OnionIdKey::new(kp.public());
        let period = TimePeriod::from_parts(19_400, 86_400);
        let (b1, s1) = id.compute_blinded_key(period).unwrap();
        let (b2, s2) = id.compute_blinded_key(period).unwrap();
        assert_eq!(b1, b2);
        assert_eq!(s1, s2);
        let other_period = TimePeriod::from_parts(19_401, 86_400);
        let (b3, _) = id.compute_blinded_key(other_period).unwrap();
        assert_ne!(b1, b3);
    }

    #[test]
    fn signing_key_cert_round_trip() {
        let blinded_kp = Keypair::from_seed([8_u8; 32]);
        let signing_kp = Keypair::from_seed([9_u8; 32]);
        let cert_sig = blinded_kp.sign(signing_kp.public().as_bytes());
        let blinded = BlindedOnionIdKey(blinded_kp.public());
        let signing = DescSigningKey::new(signing_kp.public());
        assert!(blinded.verify_signing_key_cert(&signing, &cert_sig));
    }
}
