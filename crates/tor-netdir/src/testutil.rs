//! Test-only relay construction helper.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Mutex;

use async_trait::async_trait;
use tor_linkspec::{RelayIds, RsaIdentity};
use tor_llcrypto::pk::{curve25519, ed25519};

use crate::{Consensus, DirProvider, ExitPolicy, Relay, RelayFlags, Result};

/// Builder for a [`Relay`] with sensible defaults, so tests can vary only
/// the field they care about.
pub struct RelayBuilder {
    flags: RelayFlags,
    bandwidth: u32,
    policy: ExitPolicy,
    fingerprint: u8,
}

/// Start building a test relay.
pub fn relay_builder() -> RelayBuilder {
    RelayBuilder {
        flags: RelayFlags::empty(),
        bandwidth: 1000,
        policy: ExitPolicy::reject_all(),
        fingerprint: 1,
    }
}

impl RelayBuilder {
    /// Set the relay's consensus flags.
    pub fn flags(mut self, flags: RelayFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the relay's bandwidth weight.
    pub fn bandwidth(mut self, bandwidth: u32) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    /// Set a distinguishing byte for this relay's identity, so multiple
    /// relays built in one test are distinct.
    pub fn fingerprint(mut self, byte: u8) -> Self {
        self.fingerprint = byte;
        self
    }

    /// Set the relay's exit policy (defaults to reject-everything).
    pub fn policy(mut self, policy: ExitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build the relay.
    pub fn build(self) -> Relay {
        let rsa_identity = RsaIdentity::from_bytes(&[self.fingerprint; 20])
            .expect("20-byte array always parses");
        let ed_identity = ed25519::Ed25519Identity::new([self.fingerprint; 32]);
        let ids = RelayIds::new(rsa_identity, ed_identity);
        let addr = SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::new(127, 0, 0, self.fingerprint),
            9001,
        ));
        Relay::new(
            ids,
            format!("relay{}", self.fingerprint),
            addr,
            9030,
            self.flags,
            self.bandwidth,
            self.policy.clone(),
            curve25519::PublicKey::from([self.fingerprint; 32]),
        )
    }
}

/// A [`DirProvider`] backed by an in-memory consensus and a fixed table of
/// onion-service descriptor bodies, for tests that need the trait object
/// rather than a bare [`Consensus`] (e.g. `tor-hsclient`, `arti-client`).
pub struct StaticDirProvider {
    consensus: Consensus,
    descriptors: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl StaticDirProvider {
    /// Serve `consensus` and nothing else; `fetch_descriptor` always fails
    /// with [`crate::err::Error::DirProviderFailed`] until a descriptor is
    /// registered with [`Self::with_descriptor`].
    pub fn new(consensus: Consensus) -> Self {
        StaticDirProvider {
            consensus,
            descriptors: Mutex::new(HashMap::new()),
        }
    }

    /// Register the bytes `fetch_descriptor` should return for `desc_id`.
    pub fn with_descriptor(self, desc_id: Vec<u8>, body: Vec<u8>) -> Self {
        self.descriptors
            .lock()
            .expect("descriptor table lock poisoned")
            .insert(desc_id, body);
        self
    }
}

#[async_trait]
impl DirProvider for StaticDirProvider {
    async fn get_consensus(&self) -> Result<Consensus> {
        Ok(self.consensus.clone())
    }

    async fn fetch_descriptor(&self, _hsdir: &Relay, desc_id: &[u8]) -> Result<Vec<u8>> {
        self.descriptors
            .lock()
            .expect("descriptor table lock poisoned")
            .get(desc_id)
            .cloned()
            .ok_or_else(|| crate::err::Error::DirProviderFailed("no such descriptor".into()))
    }
}
