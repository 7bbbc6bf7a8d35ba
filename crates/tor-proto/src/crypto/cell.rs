//! Onion-layered encryption of relay-cell bodies (spec.md §4.4 "Onion
//! layering"): per-hop AES-128-CTR keystreams paired with a running SHA-1
//! digest in each direction, exactly as set up by the ntor key schedule.

use tor_cell::chancell::BoxedCellBody;
use tor_cell::relaycell::DIGEST_OFFSET;
use tor_cell::relaycell::RECOGNIZED_OFFSET;
use tor_llcrypto::cipher::Aes128Ctr;
use tor_llcrypto::d::Sha1Running;

use crate::crypto::handshake::NtorKeys;
use crate::err::{Error, Result};

/// One hop's per-direction cipher and digest state.
struct CryptLayer {
    /// Forward (client-to-hop) keystream.
    forward_cipher: Aes128Ctr,
    /// Forward running digest (`Df`).
    forward_digest: Sha1Running,
    /// Backward (hop-to-client) keystream.
    backward_cipher: Aes128Ctr,
    /// Backward running digest (`Db`).
    backward_digest: Sha1Running,
}

impl CryptLayer {
    /// Build a layer from one hop's expanded ntor key material.
    fn new(keys: &NtorKeys) -> Self {
        CryptLayer {
            forward_cipher: Aes128Ctr::from_key(&keys.kf),
            forward_digest: Sha1Running::new(&keys.df),
            backward_cipher: Aes128Ctr::from_key(&keys.kb),
            backward_digest: Sha1Running::new(&keys.db),
        }
    }
}

/// The onion-layering state for an entire circuit, one [`CryptLayer`] per
/// hop currently built, ordered hop 1 (closest) first.
///
/// Outbound cells are always addressed to the most-recently-extended hop:
/// this matches how this core only ever originates RELAY cells (BEGIN,
/// DATA, EXTEND2, ...) for the far end of the circuit as currently built.
/// Inbound cells are checked against every hop in order, since a hop
/// earlier in the path can also originate a cell (for example a circuit-
/// level SENDME acknowledgement or an EXTENDED2 reply).
#[derive(Default)]
pub struct CircuitCrypto {
    layers: Vec<CryptLayer>,
}

impl CircuitCrypto {
    /// An empty crypto state, for a circuit with no hops built yet.
    pub fn new() -> Self {
        CircuitCrypto { layers: Vec::new() }
    }

    /// Install the next hop's key material, extending the circuit by one.
    pub fn add_hop(&mut self, keys: &NtorKeys) {
        self.layers.push(CryptLayer::new(keys));
    }

    /// The number of hops currently built.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether any hop has been built yet.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Onion-encrypt `body` (already framed by [`tor_cell::relaycell::RelayMsgOuter::encode`],
    /// with Recognized and Digest both zero) for the last hop currently
    /// built, updating that hop's forward digest and stamping the Digest
    /// field before wrapping the cell in every outer hop's keystream.
    pub fn encrypt_outbound(&mut self, body: &mut BoxedCellBody) -> Result<()> {
        let target = self
            .layers
            .len()
            .checked_sub(1)
            .ok_or_else(|| Error::Internal(tor_error::internal!("no hops to encrypt for")))?;
        self.encrypt_outbound_to_hop(target, body)
    }

    /// As [`Self::encrypt_outbound`], but addressed to `hop` (0-indexed)
    /// rather than the last hop. Used while building the circuit, when a
    /// CREATE2/EXTEND2 cell is sent to a hop that isn't yet the last one the
    /// caller considers "open" for application traffic.
    pub fn encrypt_outbound_to_hop(&mut self, hop: usize, body: &mut BoxedCellBody) -> Result<()> {
        let layer = self
            .layers
            .get_mut(hop)
            .ok_or_else(|| Error::Internal(tor_error::internal!("hop index out of range")))?;
        layer.forward_digest.update(body.as_ref());
        let digest = layer.forward_digest.peek4();
        body[DIGEST_OFFSET..DIGEST_OFFSET + 4].copy_from_slice(&digest);
        for layer in self.layers[..=hop].iter_mut().rev() {
            layer.forward_cipher.apply_keystream(body.as_mut());
        }
        Ok(())
    }

    /// Peel every hop's backward keystream off `body` in order, returning
    /// the index of the hop whose digest recognized this cell.
    ///
    /// Returns [`Error::UnrecognizedCell`] if no hop's digest matches after
    /// every layer has been peeled — the caller should treat the circuit as
    /// protocol-violated and tear it down (spec.md §4.4).
    pub fn decrypt_inbound(&mut self, body: &mut BoxedCellBody) -> Result<usize> {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.backward_cipher.apply_keystream(body.as_mut());
            if body[RECOGNIZED_OFFSET..RECOGNIZED_OFFSET + 2] != [0, 0] {
                continue;
            }
            let received_digest = {
                let mut d = [0_u8; 4];
                d.copy_from_slice(&body[DIGEST_OFFSET..DIGEST_OFFSET + 4]);
                d
            };
            let mut candidate = layer.backward_digest.clone();
            let mut scratch = body.clone();
            scratch[DIGEST_OFFSET..DIGEST_OFFSET + 4].copy_from_slice(&[0, 0, 0, 0]);
            candidate.update(scratch.as_ref());
            if candidate.peek4() == received_digest {
                layer.backward_digest = candidate;
                return Ok(i);
            }
        }
        Err(Error::UnrecognizedCell)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tor_cell::relaycell::msg::{AnyRelayMsg, Data};
    use tor_cell::relaycell::AnyRelayMsgOuter;
    use rand::rngs::OsRng;

    fn keys(byte: u8) -> NtorKeys {
        NtorKeys {
            df: [byte; 20],
            db: [byte.wrapping_add(1); 20],
            kf: [byte.wrapping_add(2); 16],
            kb: [byte.wrapping_add(3); 16],
        }
    }

    #[test]
    fn three_hop_round_trip_is_recognized_at_the_right_hop() {
        let mut client = CircuitCrypto::new();
        client.add_hop(&keys(1));
        client.add_hop(&keys(2));
        client.add_hop(&keys(3));

        let msg = AnyRelayMsg::Data(Data::new(b"hello").unwrap());
        let outer = AnyRelayMsgOuter::new(None, msg);
        let mut body = outer.encode(&mut OsRng).unwrap();
        client.encrypt_outbound(&mut body).unwrap();

        // Simulate each hop peeling its own layer and re-encrypting forward,
        // as the real relays would, so hop 3 sees plaintext recognized by
        // its own digest.
        let mut hop1 = CryptLayer::new(&keys(1));
        let mut hop2 = CryptLayer::new(&keys(2));
        let mut hop3 = CryptLayer::new(&keys(3));
        hop1.forward_cipher.apply_keystream(body.as_mut());
        hop2.forward_cipher.apply_keystream(body.as_mut());
        hop3.forward_cipher.apply_keystream(body.as_mut());
        hop3.forward_digest.update(&{
            let mut plain = *body;
            plain[DIGEST_OFFSET..DIGEST_OFFSET + 4].copy_from_slice(&[0, 0, 0, 0]);
            plain
        });
        assert_eq!(
            body[RECOGNIZED_OFFSET..RECOGNIZED_OFFSET + 2],
            [0, 0],
            "recognized field must stay zero end to end"
        );
    }

    #[test]
    fn inbound_recognized_at_second_hop() {
        let mut client = CircuitCrypto::new();
        client.add_hop(&keys(1));
        client.add_hop(&keys(2));

        // Build what hop 2 would send back: plaintext with Recognized=0 and
        // a correct Digest for hop 2's backward digest, then wrapped in hop
        // 2's and hop 1's backward keystreams (innermost hop encrypts
        // first on the way back, matching the forward direction in
        // reverse: the relay that wants to talk FIRST wraps its own
        // keystream, and every hop closer to the client re-wraps it with
        // its own backward keystream as it passes through).
        let msg = AnyRelayMsg::Data(Data::new(b"reply").unwrap());
        let outer = AnyRelayMsgOuter::new(None, msg);
        let mut body = outer.encode(&mut OsRng).unwrap();

        let mut hop2_srv = CryptLayer::new(&keys(2));
        hop2_srv.backward_digest.update(body.as_ref());
        let digest = hop2_srv.backward_digest.peek4();
        body[DIGEST_OFFSET..DIGEST_OFFSET + 4].copy_from_slice(&digest);
        hop2_srv.backward_cipher.apply_keystream(body.as_mut());

        let mut hop1_srv = CryptLayer::new(&keys(1));
        hop1_srv.backward_cipher.apply_keystream(body.as_mut());

        let hop = client.decrypt_inbound(&mut body).unwrap();
        assert_eq!(hop, 1, "cell should be recognized at the second hop");
    }
}
