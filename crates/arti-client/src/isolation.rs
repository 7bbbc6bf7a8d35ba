//! Isolation-key derivation (spec.md §4.8): which SOCKS requests may share
//! a circuit.
//!
//! By default every stream from this client can land on the same pooled
//! circuit, but a SOCKS front-end usually serves several independent
//! applications, and letting them share exit circuits lets the exit (or a
//! hostile destination) correlate them. [`IsolationConfig`] turns on one or
//! more dimensions along which requests are kept apart; requests that
//! differ in any enabled dimension hash to distinct
//! [`tor_circmgr::IsolationKey`]s and so are kept on distinct circuit
//! pools.

use sha2::{Digest, Sha256};

use tor_circmgr::IsolationKey;
use tor_socksproto::SocksAuth;

/// Which request attributes separate one isolation group from another.
///
/// All flags default to `false`: with nothing enabled, every request
/// shares [`IsolationKey::unisolated`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IsolationConfig {
    /// Requests to different destination (host, port) pairs never share a
    /// circuit.
    pub isolate_destinations: bool,
    /// Requests authenticated with different SOCKS5 username/password
    /// credentials never share a circuit.
    pub isolate_socks_auth: bool,
    /// Requests arriving from different local SOCKS client TCP ports never
    /// share a circuit.
    pub isolate_client_port: bool,
}

/// The request attributes available to hash into an isolation key, if
/// [`IsolationConfig`] asks for them.
pub struct IsolationInput<'a> {
    /// The request's destination hostname (or `.onion`/IP string form).
    pub dest_host: &'a str,
    /// The request's destination port.
    pub dest_port: u16,
    /// The SOCKS credentials the request authenticated with.
    pub socks_auth: &'a SocksAuth,
    /// The local TCP port the SOCKS client connected from.
    pub client_port: u16,
}

/// Compute the isolation key for one request, per `config`.
///
/// With every flag `false` this always returns
/// [`IsolationKey::unisolated`], so a default-configured client never pays
/// for a hash it doesn't need and never needlessly partitions its circuit
/// pool.
pub fn compute_isolation_key(config: &IsolationConfig, input: &IsolationInput<'_>) -> IsolationKey {
    if !config.isolate_destinations && !config.isolate_socks_auth && !config.isolate_client_port {
        return IsolationKey::unisolated();
    }

    let mut hasher = Sha256::new();
    if config.isolate_destinations {
        hasher.update(input.dest_host.as_bytes());
        hasher.update(input.dest_port.to_be_bytes());
    }
    if config.isolate_socks_auth {
        match input.socks_auth {
            SocksAuth::NoAuth => hasher.update([0_u8]),
            SocksAuth::Username(user, pass) => {
                hasher.update([1_u8]);
                hasher.update(user);
                hasher.update([0_u8]);
                hasher.update(pass);
            }
        }
    }
    if config.isolate_client_port {
        hasher.update(input.client_port.to_be_bytes());
    }

    let digest = hasher.finalize();
    let mut bytes = [0_u8; 32];
    bytes.copy_from_slice(&digest);
    IsolationKey::new(bytes)
}

#[cfg(test)]
mod test {
    use super::*;

    fn input<'a>(host: &'a str, port: u16, client_port: u16, auth: &'a SocksAuth) -> IsolationInput<'a> {
        IsolationInput {
            dest_host: host,
            dest_port: port,
            socks_auth: auth,
            client_port,
        }
    }

    #[test]
    fn no_flags_is_always_unisolated() {
        let config = IsolationConfig::default();
        let auth = SocksAuth::NoAuth;
        let a = compute_isolation_key(&config, &input("a.example", 80, 1, &auth));
        let b = compute_isolation_key(&config, &input("b.example", 443, 2, &auth));
        assert_eq!(a, IsolationKey::unisolated());
        assert_eq!(a, b);
    }

    #[test]
    fn isolate_destinations_separates_distinct_hosts() {
        let config = IsolationConfig {
            isolate_destinations: true,
            ..Default::default()
        };
        let auth = SocksAuth::NoAuth;
        let a = compute_isolation_key(&config, &input("a.example", 80, 1, &auth));
        let b = compute_isolation_key(&config, &input("b.example", 80, 1, &auth));
        assert_ne!(a, b);
    }

    #[test]
    fn isolate_socks_auth_separates_distinct_credentials() {
        let config = IsolationConfig {
            isolate_socks_auth: true,
            ..Default::default()
        };
        let alice = SocksAuth::Username(b"alice".to_vec(), b"pw".to_vec());
        let bob = SocksAuth::Username(b"bob".to_vec(), b"pw".to_vec());
        let a = compute_isolation_key(&config, &input("x", 1, 1, &alice));
        let b = compute_isolation_key(&config, &input("x", 1, 1, &bob));
        assert_ne!(a, b);
    }

    #[test]
    fn isolate_client_port_separates_distinct_ports() {
        let config = IsolationConfig {
            isolate_client_port: true,
            ..Default::default()
        };
        let auth = SocksAuth::NoAuth;
        let a = compute_isolation_key(&config, &input("x", 1, 100, &auth));
        let b = compute_isolation_key(&config, &input("x", 1, 200, &auth));
        assert_ne!(a, b);
    }
}
