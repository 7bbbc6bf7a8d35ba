//! The onion-service descriptor wire format and its verification (spec.md
//! §3 "Descriptor"): a signing-key certificate cross-signed by the blinded
//! identity, a signed body carrying the lifetime, revision counter, and
//! introduction points.
//!
//! Layout (all integers big-endian): `cert_signature(64) ||
//! signing_key(32) || signed_body || body_signature(64)`, where
//! `signed_body = lifetime_sec(4) || revision_counter(8) ||
//! n_intro_points(1) || intro_point*`, and each intro point is
//! `n_linkspecs(1) || linkspec* || auth_key(32) || enc_key(32)`.

use std::time::Duration;

use tor_bytes::Reader;
use tor_hscrypto::pk::{BlindedOnionIdKey, DescSigningKey, IntroPtAuthKey, IntroPtEncKey};
use tor_hscrypto::RevisionCounter;
use tor_linkspec::LinkSpec;
use tor_llcrypto::pk::curve25519;
use tor_llcrypto::pk::ed25519::Ed25519Identity;

use crate::err::{Error, Result};

/// Length of the two ed25519 signatures carried in every descriptor.
const SIG_LEN: usize = 64;

/// One introduction point listed in a descriptor.
#[derive(Clone, Debug)]
pub struct IntroductionPoint {
    /// Link specifiers naming how to extend a circuit to this relay.
    pub link_specs: Vec<LinkSpec>,
    /// The service's per-introduction-point auth key.
    pub auth_key: IntroPtAuthKey,
    /// The service's per-introduction-point hs-ntor encryption key.
    pub enc_key: IntroPtEncKey,
}

/// A parsed, already-verified v3 onion-service descriptor.
#[derive(Clone, Debug)]
pub struct Descriptor {
    /// How long this descriptor may be cached before it must be re-fetched
    /// (spec.md §3: at most 3 hours).
    pub lifetime: Duration,
    /// The revision counter; a higher value supersedes a lower one.
    pub revision: RevisionCounter,
    /// The signing key this descriptor's body is signed with.
    pub signing_key: DescSigningKey,
    /// The service's currently published introduction points.
    pub intro_points: Vec<IntroductionPoint>,
}

impl Descriptor {
    /// Parse `bytes` (as returned by [`tor_netdir::DirProvider::fetch_descriptor`])
    /// and verify it against `blinded`, the service's blinded identity key
    /// for the time period it was fetched under (spec.md §3's invariant:
    /// both the signing-key cert and the body signature must verify).
    pub fn parse_and_verify(blinded: &BlindedOnionIdKey, bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::from_slice(bytes);
        let cert_signature: [u8; SIG_LEN] = r.extract()?;
        let signing_key_bytes: [u8; 32] = r.extract()?;
        let signing_key = DescSigningKey::new(Ed25519Identity::new(signing_key_bytes));

        if !blinded.verify_signing_key_cert(&signing_key, &cert_signature) {
            return Err(Error::DescriptorInvalid("signing-key cert does not verify"));
        }

        let rest = r.take_rest();
        if rest.len() < SIG_LEN {
            return Err(Error::DescriptorInvalid("body shorter than its own signature"));
        }
        let (signed_body, body_signature_bytes) = rest.split_at(rest.len() - SIG_LEN);
        let mut body_signature = [0_u8; SIG_LEN];
        body_signature.copy_from_slice(body_signature_bytes);

        if !signing_key.verify(signed_body, &body_signature) {
            return Err(Error::DescriptorInvalid("body signature does not verify"));
        }

        let mut br = Reader::from_slice(signed_body);
        let lifetime_sec = br.take_u32()?;
        let revision = br.take_u64()?;
        let n_intro = br.take_u8()?;
        let mut intro_points = Vec::with_capacity(n_intro as usize);
        for _ in 0..n_intro {
            let n_ls = br.take_u8()?;
            let mut link_specs = Vec::with_capacity(n_ls as usize);
            for _ in 0..n_ls {
                link_specs.push(br.extract::<LinkSpec>()?);
            }
            let auth_key_bytes: [u8; 32] = br.extract()?;
            let enc_key_bytes: [u8; 32] = br.extract()?;
            intro_points.push(IntroductionPoint {
                link_specs,
                auth_key: IntroPtAuthKey::new(Ed25519Identity::new(auth_key_bytes)),
                enc_key: IntroPtEncKey::new(curve25519::PublicKey::from(enc_key_bytes)),
            });
        }
        br.should_be_exhausted()?;

        Ok(Descriptor {
            lifetime: Duration::from_secs(u64::from(lifetime_sec)),
            revision: RevisionCounter::new(revision),
            signing_key,
            intro_points,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tor_bytes::Writer;
    use tor_llcrypto::pk::ed25519::Keypair;

    /// Build a descriptor body the way a service would, for round-trip
    /// testing the client's parser.
    fn build_descriptor(
        blinded_kp: &Keypair,
        signing_kp: &Keypair,
        revision: u64,
        intro: &IntroductionPoint,
    ) -> Vec<u8> {
        let cert_signature = blinded_kp.sign(signing_kp.public().as_bytes());

        let mut signed_body = Vec::new();
        signed_body.write_u32(10_800);
        signed_body.write_u64(revision);
        signed_body.write_u8(1);
        signed_body.write_u8(intro.link_specs.len() as u8);
        for ls in &intro.link_specs {
            signed_body.write(ls).unwrap();
        }
        signed_body.write_all(intro.auth_key.as_bytes());
        signed_body.write_all(intro.enc_key.as_curve25519().to_bytes().as_slice());

        let body_signature = signing_kp.sign(&signed_body);

        let mut out = Vec::new();
        out.write_all(&cert_signature);
        out.write_all(signing_kp.public().as_bytes());
        out.write_all(&signed_body);
        out.write_all(&body_signature);
        out
    }

    #[test]
    fn round_trips_a_well_formed_descriptor() {
        let blinded_kp = Keypair::from_seed([7_u8; 32]);
        let signing_kp = Keypair::from_seed([8_u8; 32]);
        let blinded = BlindedOnionIdKey::for_testing(blinded_kp.public());
        let intro = IntroductionPoint {
            link_specs: vec![LinkSpec::Ed25519Id(Ed25519Identity::new([3_u8; 32]))],
            auth_key: IntroPtAuthKey::new(Ed25519Identity::new([4_u8; 32])),
            enc_key: IntroPtEncKey::new(curve25519::PublicKey::from([5_u8; 32])),
        };
        let bytes = build_descriptor(&blinded_kp, &signing_kp, 42, &intro);

        let desc = Descriptor::parse_and_verify(&blinded, &bytes).unwrap();
        assert_eq!(desc.revision.get(), 42);
        assert_eq!(desc.intro_points.len(), 1);
    }

    #[test]
    fn rejects_a_tampered_body() {
        let blinded_kp = Keypair::from_seed([1_u8; 32]);
        let signing_kp = Keypair::from_seed([2_u8; 32]);
        let blinded = BlindedOnionIdKey::for_testing(blinded_kp.public());
        let intro = IntroductionPoint {
            link_specs: vec![],
            auth_key: IntroPtAuthKey::new(Ed25519Identity::new([6_u8; 32])),
            enc_key: IntroPtEncKey::new(curve25519::PublicKey::from([7_u8; 32])),
        };
        let mut bytes = build_descriptor(&blinded_kp, &signing_kp, 1, &intro);
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;
        assert!(Descriptor::parse_and_verify(&blinded, &bytes).is_err());
    }
}
