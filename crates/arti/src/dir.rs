//! Loads a locally cached directory snapshot into a [`DirProvider`]
//! (spec.md §6's "Directory (abstract)" collaborator).
//!
//! Fetching and parsing a live consensus document is explicitly out of
//! scope for this core (spec.md §1): the directory collaborator here is a
//! TOML snapshot an operator refreshes out of band, loaded once at
//! startup. `tor_netdir::testutil::StaticDirProvider` already holds
//! exactly this shape (a frozen [`Consensus`] plus nothing else), so this
//! module is only the file format and the conversion into it.

use std::net::SocketAddr;
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Deserialize;

use tor_linkspec::{RelayIds, RsaIdentity};
use tor_llcrypto::pk::{curve25519, ed25519};
use tor_netdir::testutil::StaticDirProvider;
use tor_netdir::{Consensus, ExitPolicy, Relay, RelayFlags};

use crate::err::{Error, Result};

/// How far in the past a freshly loaded snapshot's `valid-after` is set,
/// so it's immediately live.
const BACKDATE: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct SnapshotFile {
    #[serde(with = "humantime_serde")]
    valid_for: Duration,
    #[serde(default)]
    relay: Vec<RelaySnapshot>,
}

#[derive(Deserialize)]
struct RelaySnapshot {
    nickname: String,
    rsa_identity: String,
    ed_identity: String,
    address: SocketAddr,
    #[serde(default)]
    dir_port: u16,
    ntor_onion_key: String,
    #[serde(default = "default_bandwidth")]
    bandwidth_weight: u32,
    #[serde(default)]
    guard: bool,
    #[serde(default)]
    exit: bool,
    #[serde(default)]
    stable: bool,
    #[serde(default)]
    fast: bool,
    #[serde(default = "default_true")]
    running: bool,
    #[serde(default = "default_true")]
    valid: bool,
    #[serde(default)]
    hsdir: bool,
    #[serde(default)]
    exit_policy: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_bandwidth() -> u32 {
    1000
}

/// Load a [`StaticDirProvider`] from the snapshot file at `path`.
pub fn load_snapshot(path: &Path) -> Result<StaticDirProvider> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::Io {
        path: path.display().to_string(),
        source: std::sync::Arc::new(e),
    })?;
    let file: SnapshotFile = toml::from_str(&text).map_err(|e| Error::Toml {
        path: path.display().to_string(),
        source: std::sync::Arc::new(e),
    })?;

    let relays = file
        .relay
        .iter()
        .map(build_relay)
        .collect::<Result<Vec<_>>>()?;

    let valid_after = SystemTime::now() - BACKDATE;
    let fresh_until = SystemTime::now() + file.valid_for;
    let valid_until = fresh_until + file.valid_for;
    let consensus = Consensus::new(relays, valid_after, fresh_until, valid_until);
    Ok(StaticDirProvider::new(consensus))
}

/// Decode a fixed-length hex string, erroring with the relay's nickname in
/// the message if it's the wrong shape.
fn decode_hex(nickname: &str, field: &str, s: &str, expected_len: usize) -> Result<Vec<u8>> {
    if s.len() != expected_len * 2 {
        return Err(Error::DirSnapshot(format!(
            "{nickname}: {field} must be {expected_len} bytes of hex, got {} chars",
            s.len()
        )));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16))
        .collect::<std::result::Result<Vec<u8>, _>>()
        .map_err(|_| Error::DirSnapshot(format!("{nickname}: {field} is not valid hex")))
}

fn build_relay(r: &RelaySnapshot) -> Result<Relay> {
    let rsa_bytes = decode_hex(&r.nickname, "rsa_identity", &r.rsa_identity, 20)?;
    let rsa_identity = RsaIdentity::from_bytes(&rsa_bytes)
        .ok_or_else(|| Error::DirSnapshot(format!("{}: malformed rsa identity", r.nickname)))?;

    let ed_bytes = decode_hex(&r.nickname, "ed_identity", &r.ed_identity, 32)?;
    let mut ed_arr = [0_u8; 32];
    ed_arr.copy_from_slice(&ed_bytes);
    let ed_identity = ed25519::Ed25519Identity::new(ed_arr);

    let ids = RelayIds::new(rsa_identity, ed_identity);

    let key_bytes = decode_hex(&r.nickname, "ntor_onion_key", &r.ntor_onion_key, 32)?;
    let mut key_arr = [0_u8; 32];
    key_arr.copy_from_slice(&key_bytes);
    let ntor_onion_key = curve25519::PublicKey::from(key_arr);

    let mut flags = RelayFlags::empty();
    if r.guard {
        flags |= RelayFlags::GUARD;
    }
    if r.exit {
        flags |= RelayFlags::EXIT;
    }
    if r.stable {
        flags |= RelayFlags::STABLE;
    }
    if r.fast {
        flags |= RelayFlags::FAST;
    }
    if r.running {
        flags |= RelayFlags::RUNNING;
    }
    if r.valid {
        flags |= RelayFlags::VALID;
    }
    if r.hsdir {
        flags |= RelayFlags::HSDIR;
    }

    let policy = match &r.exit_policy {
        Some(text) => ExitPolicy::parse(text).ok_or_else(|| {
            Error::DirSnapshot(format!("{}: malformed exit_policy", r.nickname))
        })?,
        None if r.exit => ExitPolicy::parse("accept *:*").expect("static policy parses"),
        None => ExitPolicy::reject_all(),
    };

    Ok(Relay::new(
        ids,
        r.nickname.clone(),
        r.address,
        r.dir_port,
        flags,
        r.bandwidth_weight,
        policy,
        ntor_onion_key,
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use tor_netdir::DirProvider;

    fn write_snapshot(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("dir-snapshot.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn loads_a_single_exit_relay() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_snapshot(
            &dir,
            r#"
            valid_for = "3h"

            [[relay]]
            nickname = "exit1"
            rsa_identity = "1111111111111111111111111111111111111111"
            ed_identity = "2222222222222222222222222222222222222222222222222222222222222222"
            address = "198.51.100.7:9001"
            ntor_onion_key = "3333333333333333333333333333333333333333333333333333333333333333"
            exit = true
            running = true
            valid = true
            exit_policy = "accept *:443,reject *:*"
            "#,
        );
        let provider = load_snapshot(&path).unwrap();
        let consensus = provider.get_consensus().await.unwrap();
        assert_eq!(consensus.relays().len(), 1);
        assert!(consensus.relays()[0].flags().contains(RelayFlags::EXIT));
    }

    #[test]
    fn rejects_malformed_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_snapshot(
            &dir,
            r#"
            valid_for = "3h"

            [[relay]]
            nickname = "bad"
            rsa_identity = "not-hex"
            ed_identity = "2222222222222222222222222222222222222222222222222222222222222222"
            address = "198.51.100.7:9001"
            ntor_onion_key = "3333333333333333333333333333333333333333333333333333333333333333"
            "#,
        );
        assert!(load_snapshot(&path).is_err());
    }
}
