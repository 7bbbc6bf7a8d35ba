//! Relay identities and link specifiers.
//!
//! A [`RelayIds`] names a relay by its 20-byte legacy fingerprint and its
//! 32-byte Ed25519 identity key. A [`LinkSpec`] is the encoded form of (part
//! of) that identity plus an address, as carried inside an EXTEND2 cell so
//! that the relay being extended *to* can be told unambiguously which next
//! hop to connect to.

mod ids;
mod ls;
mod target;

pub use ids::{RelayIdType, RsaIdentity};
pub use ls::{LinkSpec, LinkSpecType};
pub use target::{ChanTarget, OwnedChanTarget};

use tor_llcrypto::pk::ed25519::Ed25519Identity;

/// The complete set of identities a circuit-extension peer must match.
///
/// Holding both identity types (rather than just one) is what lets the path
/// selector enforce "distinctness": two `RelayIds` are considered the same
/// relay if *either* component matches.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RelayIds {
    /// The relay's legacy 20-byte fingerprint.
    rsa_identity: RsaIdentity,
    /// The relay's Ed25519 identity key.
    ed_identity: Ed25519Identity,
}

impl RelayIds {
    /// Construct a `RelayIds` from its two components.
    pub fn new(rsa_identity: RsaIdentity, ed_identity: Ed25519Identity) -> Self {
        RelayIds {
            rsa_identity,
            ed_identity,
        }
    }
    /// Return the legacy fingerprint.
    pub fn rsa_identity(&self) -> &RsaIdentity {
        &self.rsa_identity
    }
    /// Return the Ed25519 identity.
    pub fn ed_identity(&self) -> &Ed25519Identity {
        &self.ed_identity
    }
    /// Return true if `self` and `other` share any identity component.
    ///
    /// Used by the path selector's "distinctness" constraint: a candidate
    /// relay that shares *either* id with one already in the
    /// path is rejected, even if the other id differs.
    pub fn shares_any_id_with(&self, other: &RelayIds) -> bool {
        self.rsa_identity == other.rsa_identity || self.ed_identity == other.ed_identity
    }
}

impl std::fmt::Display for RelayIds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.rsa_identity)
    }
}
