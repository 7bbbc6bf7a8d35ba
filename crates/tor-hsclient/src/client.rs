//! The v3 onion-service client orchestrator (spec.md §4.7's nine steps):
//! parse an address, fetch and verify its descriptor, then run the
//! rendezvous dance to a stream on the service.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rand::rngs::OsRng;
use tokio::time::timeout;

use tor_bytes::Writer;
use tor_cell::relaycell::msg::{
    AnyRelayMsg, EstablishRendezvous, Introduce1, IntroduceAckStatus,
};
use tor_circmgr::CircMgr;
use tor_hscrypto::addr::OnionAddress;
use tor_hscrypto::time::TimePeriod;
use tor_hscrypto::{RendCookie, Subcredential};
use tor_linkspec::{LinkSpec, RelayIds};
use tor_netdir::{Consensus, DirProvider, Relay};
use tor_proto::circuit::Circuit;
use tor_proto::crypto::handshake::hs_ntor;
use tor_proto::stream::Stream;

use crate::descriptor::{Descriptor, IntroductionPoint};
use crate::err::{Error, Result};
use crate::hsdir;

/// Timeouts and retry bounds for the rendezvous dance (spec.md §4.7
/// "Retry").
#[derive(Clone, Debug)]
pub struct HsClientConfig {
    /// How long to wait for a single HSDir's descriptor fetch.
    pub hsdir_fetch_timeout: Duration,
    /// How long to wait for INTRODUCE_ACK after sending INTRODUCE1.
    pub intro_timeout: Duration,
    /// How long to wait for RENDEZVOUS_ESTABLISHED or RENDEZVOUS2.
    pub rendezvous_timeout: Duration,
    /// How many full attempts (each with a fresh intro point and
    /// rendezvous circuit) to make before giving up.
    pub max_attempts: u32,
}

impl Default for HsClientConfig {
    fn default() -> Self {
        HsClientConfig {
            hsdir_fetch_timeout: Duration::from_secs(30),
            intro_timeout: Duration::from_secs(30),
            rendezvous_timeout: Duration::from_secs(60),
            max_attempts: 3,
        }
    }
}

/// Connects to v3 onion services: fetches and verifies descriptors through
/// a [`DirProvider`], then builds the rendezvous/introduction circuits
/// through a [`CircMgr`] (spec.md §4.7).
#[derive(Clone)]
pub struct HsClient {
    dir: Arc<dyn DirProvider + Send + Sync>,
    circmgr: CircMgr,
    config: HsClientConfig,
}

impl HsClient {
    /// Construct a client over the given directory collaborator and circuit
    /// manager.
    pub fn new(
        dir: Arc<dyn DirProvider + Send + Sync>,
        circmgr: CircMgr,
        config: HsClientConfig,
    ) -> Self {
        HsClient {
            dir,
            circmgr,
            config,
        }
    }

    /// Parse a `.onion` address (spec.md §4.7 step 1).
    pub fn parse_address(text: &str) -> Result<OnionAddress> {
        Ok(OnionAddress::parse(text)?)
    }

    /// Connect to `address` on `port`, returning an open application stream
    /// (spec.md §4.7 steps 2-9).
    pub async fn connect(&self, address: &OnionAddress, port: u16) -> Result<Stream> {
        let (descriptor, subcred) = self.fetch_descriptor(address).await?;
        if descriptor.intro_points.is_empty() {
            return Err(Error::NoIntroPoints);
        }

        let mut last_err = None;
        for attempt in 0..self.config.max_attempts {
            match self
                .attempt_once(&descriptor, &subcred, port, attempt as usize)
                .await
            {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "onion-service connection attempt failed");
                    if !is_retriable(&e) {
                        return Err(e);
                    }
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(Error::AttemptsExhausted(self.config.max_attempts)))
    }

    /// Compute the current time period's blinded key, then fetch and verify
    /// a descriptor from the nearest HSDirs of either replica (spec.md §4.7
    /// steps 2-4).
    async fn fetch_descriptor(&self, address: &OnionAddress) -> Result<(Descriptor, Subcredential)> {
        let consensus = self.dir.get_consensus().await?;
        let period = TimePeriod::from_time(SystemTime::now());
        let (blinded, subcred) = address
            .id_key()
            .compute_blinded_key(period)
            .ok_or(Error::DescriptorInvalid("identity key does not blind"))?;

        for replica in 1..=2_u64 {
            let desc_id = hsdir::replica_desc_id(&blinded, replica, period);
            for hsdir in hsdir::select_hsdirs(&consensus, &desc_id) {
                let fetched = timeout(
                    self.config.hsdir_fetch_timeout,
                    self.dir.fetch_descriptor(hsdir, &desc_id),
                )
                .await;
                let bytes = match fetched {
                    Ok(Ok(bytes)) => bytes,
                    _ => continue,
                };
                match Descriptor::parse_and_verify(&blinded, &bytes) {
                    Ok(desc) => return Ok((desc, subcred)),
                    Err(_) => continue,
                }
            }
        }
        Err(Error::DescriptorInvalid(
            "no HSDir returned a verifiable descriptor",
        ))
    }

    /// One full rendezvous attempt against a single introduction point
    /// (spec.md §4.7 steps 5-9).
    async fn attempt_once(
        &self,
        descriptor: &Descriptor,
        subcred: &Subcredential,
        port: u16,
        attempt: usize,
    ) -> Result<Stream> {
        let intro = &descriptor.intro_points[attempt % descriptor.intro_points.len()];

        let rend_circuit = self.circmgr.build_onion_circuit().await?;
        let cookie = RendCookie::generate(&mut OsRng);
        rend_circuit
            .send_control(AnyRelayMsg::EstablishRendezvous(EstablishRendezvous::new(
                *cookie.as_bytes(),
            )))
            .await?;
        match timeout(self.config.rendezvous_timeout, rend_circuit.await_control()).await {
            Ok(Ok(AnyRelayMsg::RendezvousEstablished(_))) => {}
            Ok(Ok(_)) => return Err(Error::RendezvousTimeout("unexpected reply to ESTABLISH_RENDEZVOUS")),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(Error::RendezvousTimeout("no RENDEZVOUS_ESTABLISHED")),
        }

        let consensus = self.dir.get_consensus().await?;
        let rp_relay = rend_circuit
            .hops()
            .last()
            .and_then(|hop| consensus.by_identity(&hop.ids))
            .ok_or(Error::RendezvousTimeout("rendezvous relay missing from consensus"))?;
        let rend_linkspecs = relay_linkspecs(rp_relay);

        let intro_relay = relay_for_intro_point(&consensus, intro)?;
        let intro_circuit = self.circmgr.build_circuit_to(intro_relay).await?;

        let mut plaintext = Vec::new();
        plaintext.write_all(cookie.as_bytes());
        plaintext.write_u8(rend_linkspecs.len() as u8);
        for ls in &rend_linkspecs {
            plaintext.write(ls)?;
        }

        let (hs_state, encrypted) = hs_ntor::client_introduce(
            &mut OsRng,
            &intro.auth_key,
            &intro.enc_key,
            subcred,
            &plaintext,
        );

        intro_circuit
            .send_control(AnyRelayMsg::Introduce1(Introduce1::new(
                intro.auth_key.as_bytes().to_vec(),
                encrypted,
            )))
            .await?;
        match timeout(self.config.intro_timeout, intro_circuit.await_control()).await {
            Ok(Ok(AnyRelayMsg::IntroduceAck(ack))) if ack.status() == IntroduceAckStatus::SUCCESS => {}
            Ok(Ok(_)) => return Err(Error::IntroFailed("introduction point did not acknowledge success")),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(Error::IntroFailed("no INTRODUCE_ACK")),
        }
        drop(intro_circuit);

        match timeout(self.config.rendezvous_timeout, rend_circuit.await_control()).await {
            Ok(Ok(AnyRelayMsg::Rendezvous2(r2))) => {
                let keys = hs_ntor::client_complete(hs_state, r2.message())?;
                rend_circuit.install_virtual_hop(keys).await?;
            }
            Ok(Ok(_)) => return Err(Error::RendezvousTimeout("unexpected reply while waiting for RENDEZVOUS2")),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(Error::RendezvousTimeout("no RENDEZVOUS2")),
        }

        Ok(rend_circuit.begin_stream(&address_host(descriptor), port, 0_u32).await?)
    }
}

/// spec.md §4.7 step 9 allows an empty host field on the final BEGIN, since
/// the service is already the circuit's final hop; this core always sends
/// one.
fn address_host(_descriptor: &Descriptor) -> String {
    String::new()
}

/// Link specifiers naming `relay`, the form the service needs to extend a
/// circuit back to the rendezvous point.
fn relay_linkspecs(relay: &Relay) -> Vec<LinkSpec> {
    use tor_linkspec::ChanTarget;
    vec![
        LinkSpec::from(relay.addr()),
        LinkSpec::RsaId(*relay.ids().rsa_identity()),
        LinkSpec::Ed25519Id(*relay.ids().ed_identity()),
    ]
}

/// Resolve an introduction point's link specifiers to the consensus relay
/// they name, so a circuit can be built to it.
fn relay_for_intro_point<'c>(
    consensus: &'c Consensus,
    intro: &IntroductionPoint,
) -> Result<&'c Relay> {
    let mut rsa = None;
    let mut ed = None;
    for ls in &intro.link_specs {
        match ls {
            LinkSpec::RsaId(id) => rsa = Some(*id),
            LinkSpec::Ed25519Id(id) => ed = Some(*id),
            _ => {}
        }
    }
    let ids = RelayIds::new(
        rsa.ok_or(Error::IntroFailed("introduction point has no RSA identity"))?,
        ed.ok_or(Error::IntroFailed("introduction point has no Ed25519 identity"))?,
    );
    consensus
        .by_identity(&ids)
        .ok_or(Error::IntroFailed("introduction point not found in consensus"))
}

/// Whether a failed attempt should be retried with a different intro point
/// (spec.md §7: "only ... IntroFailed, RendezvousTimeout, and transient
/// link dial failures are retried").
fn is_retriable(err: &Error) -> bool {
    matches!(
        err,
        Error::IntroFailed(_) | Error::RendezvousTimeout(_) | Error::Circ(_) | Error::Proto(_)
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn retriable_kinds_match_spec() {
        assert!(is_retriable(&Error::IntroFailed("x")));
        assert!(is_retriable(&Error::RendezvousTimeout("x")));
        assert!(!is_retriable(&Error::NoIntroPoints));
        assert!(!is_retriable(&Error::AttemptsExhausted(3)));
    }
}
