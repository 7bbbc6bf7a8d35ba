//! HSDir replica/ring math (spec.md §4.7 step 3): which three relays hold a
//! service's descriptor for a given time period.

use tor_hscrypto::pk::BlindedOnionIdKey;
use tor_hscrypto::time::TimePeriod;
use tor_llcrypto::d::sha3_256;
use tor_netdir::{Consensus, Relay, RelayFlags};

/// The label hashed into a replica's descriptor ID, per spec.md §4.7 step 3.
const STORE_AT_IDX: &[u8] = b"store-at-idx";

/// How many HSDirs to fetch from per replica.
const HSDIRS_PER_REPLICA: usize = 3;

/// Compute the descriptor ID for replica `r` of `blinded` during `period`:
/// `SHA3_256(blinded_pubkey || "store-at-idx" || be64(r) || be64(period_length) || be64(time_period))`.
pub fn replica_desc_id(blinded: &BlindedOnionIdKey, replica: u64, period: TimePeriod) -> [u8; 32] {
    let mut input = Vec::with_capacity(32 + STORE_AT_IDX.len() + 24);
    input.extend_from_slice(blinded.as_bytes());
    input.extend_from_slice(STORE_AT_IDX);
    input.extend_from_slice(&replica.to_be_bytes());
    input.extend_from_slice(&u64::from(period.length_in_sec()).to_be_bytes());
    input.extend_from_slice(&period.interval_num().to_be_bytes());
    sha3_256(&input)
}

/// XOR distance between two 32-byte points in the HSDir ring space, as a
/// big-endian integer for ordering purposes.
fn xor_distance(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0_u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// Select the three HSDirs nearest (by XOR distance on the 32-byte Ed25519
/// identity space) to `desc_id`, ascending, from the consensus's
/// HSDir-flagged relays (spec.md §4.7 step 3).
pub fn select_hsdirs<'c>(consensus: &'c Consensus, desc_id: &[u8; 32]) -> Vec<&'c Relay> {
    let mut candidates: Vec<&Relay> = consensus
        .relays_with_flags(RelayFlags::HSDIR | RelayFlags::RUNNING | RelayFlags::VALID)
        .collect();
    candidates.sort_by_key(|r| xor_distance(r.ids().ed_identity().as_bytes(), desc_id));
    candidates.truncate(HSDIRS_PER_REPLICA);
    candidates
}

#[cfg(test)]
mod test {
    use super::*;
    use tor_hscrypto::pk::OnionIdKey;
    use tor_llcrypto::pk::ed25519::Keypair;
    use tor_netdir::testutil::relay_builder;

    #[test]
    fn descriptor_id_is_deterministic() {
        let kp = Keypair::from_seed([2_u8; 32]);
        let id = OnionIdKey::new(kp.public());
        let period = TimePeriod::from_parts(19_400, 86_400);
        let (blinded, _) = id.compute_blinded_key(period).unwrap();
        let a = replica_desc_id(&blinded, 1, period);
        let b = replica_desc_id(&blinded, 1, period);
        assert_eq!(a, b);
        let c = replica_desc_id(&blinded, 2, period);
        assert_ne!(a, c);
    }

    #[test]
    fn selects_nearest_three_ascending() {
        let relays: Vec<_> = (1_u8..=5)
            .map(|fp| {
                relay_builder()
                    .fingerprint(fp)
                    .flags(RelayFlags::HSDIR | RelayFlags::RUNNING | RelayFlags::VALID)
                    .build()
            })
            .collect();
        let now = std::time::SystemTime::now();
        let consensus = Consensus::new(
            relays,
            now - std::time::Duration::from_secs(60),
            now + std::time::Duration::from_secs(3600),
            now + std::time::Duration::from_secs(7200),
        );
        let desc_id = [1_u8; 32];
        let chosen = select_hsdirs(&consensus, &desc_id);
        assert_eq!(chosen.len(), 3);
        let dists: Vec<_> = chosen
            .iter()
            .map(|r| xor_distance(r.ids().ed_identity().as_bytes(), &desc_id))
            .collect();
        assert!(dists.windows(2).all(|w| w[0] <= w[1]));
    }
}
