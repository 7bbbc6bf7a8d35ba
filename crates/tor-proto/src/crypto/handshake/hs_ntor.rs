//! The hs-ntor handshake (spec.md §4.7 steps 5 and 8): the client side of
//! the v3 onion-service key exchange run against an introduction point on
//! a service's behalf.
//!
//! Shaped like [`super::ntor`] (an ephemeral DH accumulated into a
//! `SecretBuf`, then expanded via a keyed hash into a [`NtorKeys`] usable
//! with [`crate::crypto::cell::CircuitCrypto::add_hop`]), but with two
//! differences the onion-service protocol requires: an extra long-term
//! input (the service's subcredential for the current time period, so the
//! derived keys are bound to a specific service and epoch), and an earlier
//! "intro" derivation that wraps the rendezvous info carried inside
//! INTRODUCE1 before any reply has arrived. This core has no SHAKE-256
//! primitive, so both stages run on SHA3-256 via [`hs_mac`] and a
//! counter-mode expansion in place of rend-spec-v3's XOF; recorded as an
//! open-question resolution in DESIGN.md.

use rand_core::{CryptoRng, RngCore};
use tor_bytes::{Reader, SecretBuf, Writer};
use tor_hscrypto::ops::hs_mac;
use tor_hscrypto::pk::{IntroPtAuthKey, IntroPtEncKey};
use tor_hscrypto::Subcredential;
use tor_llcrypto::cipher::Aes128Ctr;
use tor_llcrypto::d::sha3_256;
use tor_llcrypto::pk::curve25519::{EphemeralSecret, PublicKey};
use tor_llcrypto::util::ct::ct_eq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::err::{Error, Result};

use super::NtorKeys;

/// `PROTOID` distinguishing this handshake from plain ntor and from any
/// other service's transcript.
const PROTOID: &[u8] = b"tor-hs-ntor-curve25519-sha3-256-1";
/// Literal appended to the server's AUTH input, as in plain ntor.
const SERVER_STR: &[u8] = b"Server";

fn t_hsenc() -> Vec<u8> {
    [PROTOID, b":hs_key_extract"].concat()
}
fn t_hsverify() -> Vec<u8> {
    [PROTOID, b":hs_verify"].concat()
}
fn t_hsmac() -> Vec<u8> {
    [PROTOID, b":hs_mac"].concat()
}
fn m_hsexpand() -> Vec<u8> {
    [PROTOID, b":hs_key_expand"].concat()
}

/// Counter-mode SHA3-256 expansion, standing in for rend-spec-v3's
/// SHAKE-256-based `KDF-SHA3-256` (see module docs).
fn sha3_expand(prk: &[u8; 32], info: &[u8], n: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(n);
    let mut counter: u8 = 1;
    let mut prev: Vec<u8> = Vec::new();
    while out.len() < n {
        let mut input = Vec::with_capacity(prev.len() + info.len() + 1);
        input.extend_from_slice(&prev);
        input.extend_from_slice(info);
        input.push(counter);
        let block = sha3_256(&input);
        out.extend_from_slice(&block);
        prev = block.to_vec();
        counter = counter.wrapping_add(1);
    }
    out.truncate(n);
    out
}

/// The client's half of an in-progress hs-ntor handshake: kept from the
/// INTRODUCE1 send until the matching RENDEZVOUS2 arrives.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct HsNtorClientState {
    #[zeroize(skip)]
    secret: EphemeralSecret,
    #[zeroize(skip)]
    x_public: PublicKey,
    auth_key: [u8; 32],
    #[zeroize(skip)]
    enc_key: PublicKey,
    subcred: [u8; 32],
}

/// Wrap `plaintext` (the rendezvous cookie, rendezvous-point link
/// specifiers, and rendezvous ntor key spec.md §4.7 step 5 sends to the
/// service) for INTRODUCE1, and begin the handshake that RENDEZVOUS2 will
/// complete.
///
/// Returns the in-progress state plus the `encrypted` field body for
/// [`tor_cell::relaycell::msg::Introduce1`]: `X(32) || ciphertext || MAC(32)`.
pub fn client_introduce<R: RngCore + CryptoRng>(
    rng: &mut R,
    auth_key: &IntroPtAuthKey,
    enc_key: &IntroPtEncKey,
    subcred: &Subcredential,
    plaintext: &[u8],
) -> (HsNtorClientState, Vec<u8>) {
    let secret = EphemeralSecret::random(rng);
    let x_public = secret.public();
    let b = *enc_key.as_curve25519();

    let xb = secret.diffie_hellman(&b);

    let mut secret_input = SecretBuf::new();
    secret_input.write_all(&xb);
    secret_input.write_all(auth_key.as_bytes());
    secret_input.write_all(b.as_ref());
    secret_input.write_all(x_public.as_ref());
    secret_input.write_all(subcred.as_bytes());
    secret_input.write_all(PROTOID);
    let secret_input = secret_input.into_vec();

    let intro_seed = hs_mac(&t_hsenc(), &secret_input);
    let expanded = sha3_expand(&intro_seed, &m_hsexpand(), 16 + 32);
    let mut enc_key_bytes = [0_u8; 16];
    enc_key_bytes.copy_from_slice(&expanded[0..16]);
    let mac_key = &expanded[16..48];

    let mut ciphertext = plaintext.to_vec();
    let mut cipher = Aes128Ctr::from_key(&enc_key_bytes);
    cipher.apply_keystream(&mut ciphertext);
    let mac = hs_mac(mac_key, &ciphertext);

    let mut encrypted = Vec::with_capacity(32 + ciphertext.len() + 32);
    encrypted.write_all(x_public.as_ref());
    encrypted.write_all(&ciphertext);
    encrypted.write_all(&mac);

    let state = HsNtorClientState {
        secret,
        x_public,
        auth_key: *auth_key.as_bytes(),
        enc_key: b,
        subcred: *subcred.as_bytes(),
    };
    (state, encrypted)
}

/// Complete the handshake given a RENDEZVOUS2 body (`Y(32) || AUTH(32)`),
/// verifying the service's AUTH tag before returning key material to
/// install as the circuit's final hop via
/// [`crate::circuit::Circuit::install_virtual_hop`].
pub fn client_complete(state: HsNtorClientState, server_payload: &[u8]) -> Result<NtorKeys> {
    let mut r = Reader::from_slice(server_payload);
    let y_bytes: [u8; 32] = r.extract()?;
    let auth_received: [u8; 32] = r.extract()?;
    r.should_be_exhausted()?;
    let y_public = PublicKey::from(y_bytes);

    let xy = state.secret.diffie_hellman(&y_public);
    let xb = state.secret.diffie_hellman(&state.enc_key);

    let mut secret_input = SecretBuf::new();
    secret_input.write_all(&xy);
    secret_input.write_all(&xb);
    secret_input.write_all(&state.auth_key);
    secret_input.write_all(state.enc_key.as_ref());
    secret_input.write_all(state.x_public.as_ref());
    secret_input.write_all(&y_bytes);
    secret_input.write_all(&state.subcred);
    secret_input.write_all(PROTOID);
    let secret_input = secret_input.into_vec();

    let key_seed = hs_mac(&t_hsverify(), &secret_input);
    let verify = hs_mac(&t_hsmac(), &secret_input);

    let mut auth_input = Vec::with_capacity(32 + 32 + 32 + 32 + 32 + PROTOID.len() + SERVER_STR.len());
    auth_input.write_all(&verify);
    auth_input.write_all(&state.auth_key);
    auth_input.write_all(state.enc_key.as_ref());
    auth_input.write_all(&y_bytes);
    auth_input.write_all(state.x_public.as_ref());
    auth_input.write_all(PROTOID);
    auth_input.write_all(SERVER_STR);
    let auth_expected = hs_mac(&key_seed, &auth_input);

    if !ct_eq(&auth_expected, &auth_received) {
        return Err(Error::AuthFailure);
    }

    let expanded = sha3_expand(&key_seed, &m_hsexpand(), 72);
    let mut df = [0_u8; 20];
    let mut db = [0_u8; 20];
    let mut kf = [0_u8; 16];
    let mut kb = [0_u8; 16];
    df.copy_from_slice(&expanded[0..20]);
    db.copy_from_slice(&expanded[20..40]);
    kf.copy_from_slice(&expanded[40..56]);
    kb.copy_from_slice(&expanded[56..72]);
    Ok(NtorKeys { df, db, kf, kb })
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::OsRng;
    use tor_llcrypto::pk::curve25519::EphemeralSecret as RelaySecret;
    use tor_llcrypto::pk::ed25519::Ed25519Identity;

    /// A minimal stand-in introduction-point-plus-service, for round-
    /// tripping the client code against something that knows the expected
    /// long-term keys.
    fn server_reply(
        auth_key: &IntroPtAuthKey,
        enc_secret: &RelaySecret,
        enc_public: &PublicKey,
        subcred: &Subcredential,
        x_public: &PublicKey,
    ) -> Vec<u8> {
        let y_secret = RelaySecret::random(&mut OsRng);
        let y_public = y_secret.public();

        let xy = y_secret.diffie_hellman(x_public);
        let xb = enc_secret.diffie_hellman(x_public);

        let mut secret_input = SecretBuf::new();
        secret_input.write_all(&xy);
        secret_input.write_all(&xb);
        secret_input.write_all(auth_key.as_bytes());
        secret_input.write_all(enc_public.as_ref());
        secret_input.write_all(x_public.as_ref());
        secret_input.write_all(&y_public.to_bytes());
        secret_input.write_all(subcred.as_bytes());
        secret_input.write_all(PROTOID);
        let secret_input = secret_input.into_vec();

        let key_seed = hs_mac(&t_hsverify(), &secret_input);
        let verify = hs_mac(&t_hsmac(), &secret_input);

        let mut auth_input = Vec::new();
        auth_input.write_all(&verify);
        auth_input.write_all(auth_key.as_bytes());
        auth_input.write_all(enc_public.as_ref());
        auth_input.write_all(&y_public.to_bytes());
        auth_input.write_all(x_public.as_ref());
        auth_input.write_all(PROTOID);
        auth_input.write_all(SERVER_STR);
        let auth = hs_mac(&key_seed, &auth_input);

        let mut reply = Vec::with_capacity(64);
        reply.write_all(&y_public.to_bytes());
        reply.write_all(&auth);
        reply
    }

    #[test]
    fn handshake_round_trips_and_agrees_on_keys() {
        let auth_key = IntroPtAuthKey::new(Ed25519Identity::new([3_u8; 32]));
        let enc_secret = RelaySecret::random(&mut OsRng);
        let enc_public = enc_secret.public();
        let enc_key = IntroPtEncKey::new(enc_public);
        let subcred = Subcredential::new([9_u8; 32]);

        let (state, encrypted) =
            client_introduce(&mut OsRng, &auth_key, &enc_key, &subcred, b"rendezvous info");
        assert_eq!(encrypted.len(), 32 + b"rendezvous info".len() + 32);

        let x_public = state.x_public;
        let server_payload =
            server_reply(&auth_key, &enc_secret, &enc_public, &subcred, &x_public);
        let keys = client_complete(state, &server_payload).unwrap();

        assert_ne!(keys.kf, keys.kb);
        assert_ne!(keys.df, keys.db);
    }

    #[test]
    fn tampered_auth_is_rejected() {
        let auth_key = IntroPtAuthKey::new(Ed25519Identity::new([4_u8; 32]));
        let enc_secret = RelaySecret::random(&mut OsRng);
        let enc_public = enc_secret.public();
        let enc_key = IntroPtEncKey::new(enc_public);
        let subcred = Subcredential::new([1_u8; 32]);

        let (state, _) = client_introduce(&mut OsRng, &auth_key, &enc_key, &subcred, b"info");
        let x_public = state.x_public;
        let mut server_payload =
            server_reply(&auth_key, &enc_secret, &enc_public, &subcred, &x_public);
        let last = server_payload.len() - 1;
        server_payload[last] ^= 0xff;
        assert!(client_complete(state, &server_payload).is_err());
    }
}
