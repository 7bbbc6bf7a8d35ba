//! Mid-level cryptographic operations shared across the onion-service
//! protocol.

use tor_llcrypto::d::sha3_256;

/// Length in bytes of the MAC returned by [`hs_mac`].
pub const HS_MAC_LEN: usize = 32;

/// Compute the lightweight MAC used throughout the onion-service protocol
/// (rend-spec-v3 §0.3 `MAC`): `H(htonll(len(key)) || key || message)` with
/// `H` instantiated as SHA3-256.
///
/// Used by the `hs-ntor` handshake (`tor-proto`) to bind the handshake
/// transcript to each derived key, and to authenticate INTRODUCE1 bodies.
pub fn hs_mac(key: &[u8], msg: &[u8]) -> [u8; HS_MAC_LEN] {
    let mut input = Vec::with_capacity(8 + key.len() + msg.len());
    input.extend_from_slice(&(key.len() as u64).to_be_bytes());
    input.extend_from_slice(key);
    input.extend_from_slice(msg);
    sha3_256(&input)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mac_from_definition() {
        assert_eq!(hs_mac(b"", b""), sha3_256(&[0_u8; 8]));
        assert_eq!(
            hs_mac(b"hello", b"world"),
            sha3_256(b"\0\0\0\0\0\0\0\x05helloworld")
        );
    }

    #[test]
    fn mac_testvec() {
        let msg = b"i am in a library somewhere using my computer";
        let key = b"i'm from the past talking to the future.";
        let out = hs_mac(key, msg);
        assert_eq!(
            hex::encode(out),
            "753fba6d87d49497238a512a3772dd291e55f7d1cd332c9fb5c967c7a10a13ca"
        );
    }
}
