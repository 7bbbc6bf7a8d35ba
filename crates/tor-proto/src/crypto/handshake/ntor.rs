//! The ntor handshake (spec.md §4.2): the client side of Tor's
//! curve25519+SHA256 circuit-extension key exchange.
//!
//! The sibling [`super::hs_ntor`] handshake shares this module's shape
//! (accumulate a `SecretBuf` of DH outputs and identities, then derive via
//! a keyed hash) but runs over SHA3-256 and an extra long-term key, for the
//! v3 onion-service introduction exchange.

use rand_core::{CryptoRng, RngCore};
use tor_bytes::{Reader, SecretBuf, Writer};
use tor_linkspec::RsaIdentity;
use tor_llcrypto::d::{hkdf_sha256_expand, hkdf_sha256_extract};
use tor_llcrypto::pk::curve25519::{EphemeralSecret, PublicKey};
use tor_llcrypto::util::ct::ct_eq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::err::{Error, Result};

/// `PROTOID` from tor-spec.txt's ntor handshake section.
const PROTOID: &[u8] = b"ntor-curve25519-sha256-1";
/// The literal string appended to the server's AUTH input.
const SERVER_STR: &[u8] = b"Server";

/// `t_mac = PROTOID | ":mac"`.
fn t_mac() -> Vec<u8> {
    [PROTOID, b":mac"].concat()
}
/// `t_key = PROTOID | ":key_extract"`.
fn t_key() -> Vec<u8> {
    [PROTOID, b":key_extract"].concat()
}
/// `t_verify = PROTOID | ":verify"`.
fn t_verify() -> Vec<u8> {
    [PROTOID, b":verify"].concat()
}
/// `m_expand = PROTOID | ":key_expand"`.
fn m_expand() -> Vec<u8> {
    [PROTOID, b":key_expand"].concat()
}

/// The client's half of an in-progress ntor handshake: the ephemeral secret
/// key, kept until the server's reply arrives.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct NtorClientState {
    /// Our ephemeral Curve25519 secret (`x` in tor-spec.txt's notation).
    #[zeroize(skip)]
    secret: EphemeralSecret,
    /// The relay's 20-byte legacy fingerprint, needed again to re-derive
    /// the shared secret once the reply arrives.
    node_id: [u8; 20],
    /// The relay's ntor onion key (`B` in tor-spec.txt's notation).
    #[zeroize(skip)]
    relay_ntor_key: PublicKey,
}

/// Key material produced by a completed ntor handshake: forward/backward
/// digest seeds and stream-cipher keys (spec.md §4.2's `KEY_SEED` expansion:
/// `Df(20) || Db(20) || Kf(16) || Kb(16)`).
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct NtorKeys {
    /// Forward (outbound) running-digest seed.
    pub df: [u8; 20],
    /// Backward (inbound) running-digest seed.
    pub db: [u8; 20],
    /// Forward stream-cipher key.
    pub kf: [u8; 16],
    /// Backward stream-cipher key.
    pub kb: [u8; 16],
}

/// Begin a client-side ntor handshake against a relay identified by
/// `node_id` with ntor onion key `relay_ntor_key`.
///
/// Returns the in-progress state to retain until the CREATED2 reply arrives,
/// and the 84-byte client handshake payload (`NODEID(20) || KEYID(32) ||
/// X(32)`) to send in a CREATE2 cell.
pub fn client_handshake<R: RngCore + CryptoRng>(
    rng: &mut R,
    node_id: &RsaIdentity,
    relay_ntor_key: &PublicKey,
) -> (NtorClientState, Vec<u8>) {
    let secret = EphemeralSecret::random(rng);
    let x_public = secret.public();

    let mut payload = Vec::with_capacity(20 + 32 + 32);
    payload.write_all(node_id.as_bytes());
    payload.write_all(relay_ntor_key.as_ref());
    payload.write_all(x_public.as_ref());

    let state = NtorClientState {
        secret,
        node_id: *node_id.as_bytes(),
        relay_ntor_key: *relay_ntor_key,
    };
    (state, payload)
}

/// Complete a client-side ntor handshake given the server's CREATED2 reply
/// body (`Y(32) || AUTH(32)`, 64 bytes).
///
/// Verifies the server's AUTH tag before returning key material; a
/// mismatch means either the relay doesn't hold the expected onion key or
/// the handshake was tampered with in transit (spec.md §4.4 `AuthFailure`).
pub fn client_handshake2(state: NtorClientState, server_payload: &[u8]) -> Result<NtorKeys> {
    let mut r = Reader::from_slice(server_payload);
    let y_bytes: [u8; 32] = r.extract()?;
    let auth_received: [u8; 32] = r.extract()?;
    r.should_be_exhausted()?;
    let y_public = PublicKey::from(y_bytes);

    let xy = state.secret.diffie_hellman(&y_public);
    let xb = state.secret.diffie_hellman(&state.relay_ntor_key);

    let mut secret_input = SecretBuf::new();
    secret_input.write_all(&xy);
    secret_input.write_all(&xb);
    secret_input.write_all(&state.node_id);
    secret_input.write_all(state.relay_ntor_key.as_ref());
    secret_input.write_all(state.secret.public().as_ref());
    secret_input.write_all(&y_bytes);
    secret_input.write_all(PROTOID);
    let secret_input = secret_input.into_vec();

    let key_seed = hkdf_sha256_extract(&t_key(), &secret_input);
    let verify = hkdf_sha256_extract(&t_verify(), &secret_input);

    let mut auth_input = Vec::with_capacity(32 + 20 + 32 + 32 + 32 + PROTOID.len() + SERVER_STR.len());
    auth_input.write_all(&verify);
    auth_input.write_all(&state.node_id);
    auth_input.write_all(state.relay_ntor_key.as_ref());
    auth_input.write_all(&y_bytes);
    auth_input.write_all(state.secret.public().as_ref());
    auth_input.write_all(PROTOID);
    auth_input.write_all(SERVER_STR);
    let auth_expected = hkdf_sha256_extract(&t_mac(), &auth_input);

    if !ct_eq(&auth_expected, &auth_received) {
        return Err(Error::AuthFailure);
    }

    let expanded = hkdf_sha256_expand(&key_seed, &m_expand(), 72);
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

    /// A minimal stand-in server, for round-tripping the client code against
    /// something that knows the relay's long-term secret.
    fn server_reply(
        node_id: &RsaIdentity,
        relay_secret: &RelaySecret,
        relay_public: &PublicKey,
        client_payload: &[u8],
    ) -> Vec<u8> {
        let mut r = Reader::from_slice(client_payload);
        let got_node_id: [u8; 20] = r.extract().unwrap();
        assert_eq!(&got_node_id, node_id.as_bytes());
        let got_keyid: [u8; 32] = r.extract().unwrap();
        assert_eq!(got_keyid, relay_public.to_bytes());
        let x_bytes: [u8; 32] = r.extract().unwrap();
        let x_public = PublicKey::from(x_bytes);

        let y_secret = RelaySecret::random(&mut OsRng);
        let y_public = y_secret.public();

        let xy = y_secret.diffie_hellman(&x_public);
        let xb = relay_secret.diffie_hellman(&x_public);

        let mut secret_input = SecretBuf::new();
        secret_input.write_all(&xy);
        secret_input.write_all(&xb);
        secret_input.write_all(node_id.as_bytes());
        secret_input.write_all(relay_public.as_ref());
        secret_input.write_all(x_public.as_ref());
        secret_input.write_all(&y_public.to_bytes());
        secret_input.write_all(PROTOID);
        let secret_input = secret_input.into_vec();

        let verify = hkdf_sha256_extract(&t_verify(), &secret_input);
        let mut auth_input = Vec::new();
        auth_input.write_all(&verify);
        auth_input.write_all(node_id.as_bytes());
        auth_input.write_all(relay_public.as_ref());
        auth_input.write_all(&y_public.to_bytes());
        auth_input.write_all(x_public.as_ref());
        auth_input.write_all(PROTOID);
        auth_input.write_all(SERVER_STR);
        let auth = hkdf_sha256_extract(&t_mac(), &auth_input);

        let mut reply = Vec::with_capacity(64);
        reply.write_all(&y_public.to_bytes());
        reply.write_all(&auth);
        reply
    }

    #[test]
    fn handshake_round_trips_and_agrees_on_keys() {
        let node_id = RsaIdentity::from_bytes(&[7_u8; 20]).unwrap();
        let relay_secret = RelaySecret::random(&mut OsRng);
        let relay_public = relay_secret.public();

        let (state, client_payload) =
            client_handshake(&mut OsRng, &node_id, &relay_public);
        let server_payload = server_reply(&node_id, &relay_secret, &relay_public, &client_payload);
        let keys = client_handshake2(state, &server_payload).unwrap();

        assert_ne!(keys.kf, keys.kb);
        assert_ne!(keys.df, keys.db);
    }

    #[test]
    fn tampered_auth_is_rejected() {
        let node_id = RsaIdentity::from_bytes(&[1_u8; 20]).unwrap();
        let relay_secret = RelaySecret::random(&mut OsRng);
        let relay_public = relay_secret.public();
        let (state, client_payload) =
            client_handshake(&mut OsRng, &node_id, &relay_public);
        let mut server_payload = server_reply(&node_id, &relay_secret, &relay_public, &client_payload);
        let last = server_payload.len() - 1;
        server_payload[last] ^= 0xff;
        assert!(client_handshake2(state, &server_payload).is_err());
    }
}
