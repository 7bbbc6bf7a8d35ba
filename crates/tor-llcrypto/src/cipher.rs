//! Stream ciphers used for per-hop relay-cell encryption.

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};

/// 128-bit AES-CTR keystream state, keyed once per hop and then advanced
/// cell-by-cell for the lifetime of the circuit.
///
/// Tor's relay-cell crypto never re-keys or re-initializes the IV: each hop
/// holds one of these per direction (`Kf` forward, `Kb` backward), seeded
/// from the ntor key schedule, and its internal counter
/// just keeps advancing as cells are encrypted or decrypted.
pub struct Aes128Ctr(ctr::Ctr128BE<Aes128>);

impl Aes128Ctr {
    /// Construct a new keystream from a 16-byte key, with an all-zero IV.
    ///
    /// The IV is always zero because each hop's cipher state is unique to
    /// that hop and never reused across circuits or restarted mid-circuit.
    pub fn from_key(key: &[u8; 16]) -> Self {
        let iv = [0_u8; 16];
        Aes128Ctr(ctr::Ctr128BE::<Aes128>::new(
            ctr::cipher::generic_array::GenericArray::from_slice(key),
            ctr::cipher::generic_array::GenericArray::from_slice(&iv),
        ))
    }

    /// XOR the keystream into `data` in place, advancing the counter by
    /// `data.len()` bytes.
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        self.0.apply_keystream(data);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_recovers_plaintext() {
        let key = [0x11_u8; 16];
        let mut enc = Aes128Ctr::from_key(&key);
        let mut dec = Aes128Ctr::from_key(&key);
        let plaintext = b"the quick brown fox jumps over the lazy dog!!!!".to_vec();
        let mut buf = plaintext.clone();
        enc.apply_keystream(&mut buf);
        assert_ne!(buf, plaintext);
        dec.apply_keystream(&mut buf);
        assert_eq!(buf, plaintext);
    }
}
