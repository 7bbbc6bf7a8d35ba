//! On-disk persistence for the guard set (spec.md §6 "Persisted state"):
//! `state/guards`, one `FINGERPRINT STATE LAST_TRIED_UNIX` line per entry.
//!
//! This supersedes the teacher's own JSON-via-serde approach for this one
//! file's *encoding*: spec.md §6 pins the exact textual line format, so
//! this crate writes that format directly rather than going through a
//! generic serializer. The *mechanism* underneath is unchanged from the
//! teacher: [`fs_mistrust::Mistrust::verifier`] checks (and if needed
//! creates) the state directory with safe permissions before anything is
//! written into it, the write itself goes through the resulting
//! [`fs_mistrust::CheckedDir`]'s [`write_and_replace`][CheckedDir::write_and_replace]
//! (a temp-file-then-rename, same as the teacher's `tor-persist::fs`), and
//! an [`fslock::LockFile`] held next to the state file serializes
//! concurrent writers. Recorded as an Open-Question resolution in
//! DESIGN.md.

use std::net::SocketAddr;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fs_mistrust::{CheckedDir, Mistrust};

use tor_linkspec::{ChanTarget, RelayIds, RsaIdentity};
use tor_llcrypto::pk::ed25519::Ed25519Identity;

use crate::err::{Error, Result};
use crate::guard::{GuardEntry, GuardSet, GuardState};

/// Render a guard's state as the word used in the persisted file.
fn state_word(state: GuardState) -> &'static str {
    match state {
        GuardState::Primary => "primary",
        GuardState::Confirmed => "confirmed",
        GuardState::Filtered => "filtered",
    }
}

/// Parse the state word back into a [`GuardState`].
fn parse_state(word: &str) -> Result<GuardState> {
    match word {
        "primary" => Ok(GuardState::Primary),
        "confirmed" => Ok(GuardState::Confirmed),
        "filtered" => Ok(GuardState::Filtered),
        other => Err(Error::StateCorrupted(format!("unknown guard state {other:?}"))),
    }
}

/// The identity and address of a guard, encoded as a single token for the
/// persisted-state `FINGERPRINT` field: the 20-byte RSA fingerprint, a
/// literal `@`, the address, a literal `@`, and the 32-byte Ed25519
/// identity, all in hex. Only the fingerprint itself is spec-mandated;
/// the address and Ed25519 identity are additional fields this core needs
/// to rebuild a dialable [`tor_linkspec::OwnedChanTarget`] without a
/// consensus lookup, folded into the same token to keep the file to one
/// line per guard.
fn encode_fingerprint(ids: &RelayIds, addr: SocketAddr) -> String {
    format!(
        "{}@{}@{}",
        ids.rsa_identity(),
        addr,
        hex::encode(ids.ed_identity().as_bytes())
    )
}

/// Inverse of [`encode_fingerprint`].
fn decode_fingerprint(token: &str) -> Result<(RelayIds, SocketAddr)> {
    let mut parts = token.split('@');
    let (Some(rsa_hex), Some(addr_str), Some(ed_hex)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::StateCorrupted(format!(
            "malformed fingerprint token {token:?}"
        )));
    };
    let rsa_bytes = hex::decode(rsa_hex)
        .map_err(|_| Error::StateCorrupted(format!("bad rsa hex in {token:?}")))?;
    let rsa_identity = RsaIdentity::from_bytes(&rsa_bytes)
        .ok_or_else(|| Error::StateCorrupted(format!("bad rsa length in {token:?}")))?;
    let addr: SocketAddr = addr_str
        .parse()
        .map_err(|_| Error::StateCorrupted(format!("bad address in {token:?}")))?;
    let ed_bytes = hex::decode(ed_hex)
        .map_err(|_| Error::StateCorrupted(format!("bad ed25519 hex in {token:?}")))?;
    if ed_bytes.len() != 32 {
        return Err(Error::StateCorrupted(format!("bad ed25519 length in {token:?}")));
    }
    let mut ed_buf = [0_u8; 32];
    ed_buf.copy_from_slice(&ed_bytes);
    let ids = RelayIds::new(rsa_identity, Ed25519Identity::new(ed_buf));
    Ok((ids, addr))
}

/// Check (creating if needed) the directory containing `path`, returning a
/// handle good for reading and writing the single state file at `path`'s
/// file name within it, plus that relative file name.
///
/// Mirrors the teacher's `FsStateMgr::from_path_and_mistrust`: the
/// directory, not the individual file, is what `fs_mistrust` verifies.
fn checked_dir(path: &Path, mistrust: &Mistrust) -> Result<(CheckedDir, std::path::PathBuf)> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let fname = path
        .file_name()
        .map(std::path::PathBuf::from)
        .ok_or_else(|| Error::StateCorrupted(format!("{}: not a file path", path.display())))?;
    let checked = mistrust
        .verifier()
        .check_content()
        .make_secure_dir(dir.unwrap_or_else(|| Path::new(".")))?;
    Ok((checked, fname))
}

/// Open (creating if needed) the lock file guarding concurrent writers to
/// the guard-state directory, the way the teacher's `FsStateMgrInner`
/// holds one `fslock::LockFile` alongside its `CheckedDir`.
fn lock(dir: &CheckedDir, state_fname: &Path) -> Result<fslock::LockFile> {
    let lock_name = format!("{}.lock", state_fname.display());
    let lock_path = dir.join(&lock_name)?;
    fslock::LockFile::open(&lock_path).map_err(|e| Error::StateLock(std::sync::Arc::new(e)))
}

/// Load a [`GuardSet`] from `path`, per spec.md §6's line format. A
/// missing file is treated as an empty guard set (first run).
pub fn load(path: &Path) -> Result<GuardSet> {
    load_with_mistrust(path, &Mistrust::new())
}

/// As [`load`], but checking the state directory against `mistrust`
/// instead of the default policy (used by tests to bypass permission
/// checks on throwaway directories).
fn load_with_mistrust(path: &Path, mistrust: &Mistrust) -> Result<GuardSet> {
    let (dir, fname) = checked_dir(path, mistrust)?;
    let text = match dir.read_to_string(&fname) {
        Ok(t) => t,
        Err(fs_mistrust::Error::NotFound(_)) => return Ok(GuardSet::new()),
        Err(e) => return Err(e.into()),
    };
    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(fp), Some(state_word), Some(ts)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(Error::StateCorrupted(line.to_string()));
        };
        let (ids, addr) = decode_fingerprint(fp)?;
        let state = parse_state(state_word)?;
        let unix: u64 = ts
            .parse()
            .map_err(|_| Error::StateCorrupted(line.to_string()))?;
        let last_tried = if unix == 0 {
            None
        } else {
            Some(UNIX_EPOCH + Duration::from_secs(unix))
        };
        entries.push(GuardSet::entry_from_parts(ids, addr, state, last_tried));
    }
    Ok(GuardSet::from_entries(entries))
}

/// Save `set` to `path`, per spec.md §6, through the checked directory's
/// atomic write-and-replace, under the exclusive guard-state lock.
pub fn save(set: &GuardSet, path: &Path) -> Result<()> {
    save_with_mistrust(set, path, &Mistrust::new())
}

/// As [`save`], but checking the state directory against `mistrust`
/// instead of the default policy (used by tests to bypass permission
/// checks on throwaway directories).
fn save_with_mistrust(set: &GuardSet, path: &Path, mistrust: &Mistrust) -> Result<()> {
    let (dir, fname) = checked_dir(path, mistrust)?;
    let mut guard = lock(&dir, &fname)?;
    guard
        .lock()
        .map_err(|e| Error::StateLock(std::sync::Arc::new(e)))?;

    let mut body = String::new();
    for entry in set.raw_entries() {
        let unix = entry
            .last_tried()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        body.push_str(&encode_fingerprint(entry.ids(), entry.addr()));
        body.push(' ');
        body.push_str(state_word(entry.state()));
        body.push(' ');
        body.push_str(&unix.to_string());
        body.push('\n');
    }
    dir.write_and_replace(&fname, body)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::GuardParams;
    use rand::SeedableRng;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use tor_netdir::{Consensus, ExitPolicy, Relay, RelayFlags};

    fn relay(byte: u8) -> Relay {
        let ids = RelayIds::new(
            RsaIdentity::from_bytes(&[byte; 20]).unwrap(),
            Ed25519Identity::new([byte; 32]),
        );
        Relay::new(
            ids,
            format!("r{byte}"),
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, byte), 9001)),
            9030,
            RelayFlags::GUARD | RelayFlags::RUNNING | RelayFlags::VALID,
            1000,
            ExitPolicy::reject_all(),
            tor_llcrypto::pk::curve25519::PublicKey::from([byte; 32]),
        )
    }

    #[test]
    fn round_trip_through_file() {
        // A tempdir's exact permissions aren't guaranteed to satisfy the
        // default mistrust policy on every test runner, so this test uses
        // the same escape hatch as the teacher's `FsStateMgr::from_path`.
        let mistrust = Mistrust::new_dangerously_trust_everyone();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("guards");
        let mut set = GuardSet::new();
        let now = SystemTime::now();
        let cons = Consensus::new(
            vec![relay(9)],
            now - Duration::from_secs(60),
            now + Duration::from_secs(3600),
            now + Duration::from_secs(7200),
        );
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        set.select(&cons, &GuardParams::default(), &mut rng).unwrap();
        save_with_mistrust(&set, &path, &mistrust).unwrap();

        let loaded = load_with_mistrust(&path, &mistrust).unwrap();
        assert_eq!(loaded.entries().len(), 1);
        assert_eq!(loaded.entries()[0].ids(), set.entries()[0].ids());
        assert_eq!(loaded.entries()[0].state(), set.entries()[0].state());
    }

    #[test]
    fn missing_file_is_empty_set() {
        let mistrust = Mistrust::new_dangerously_trust_everyone();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist");
        let set = load_with_mistrust(&path, &mistrust).unwrap();
        assert!(set.entries().is_empty());
    }
}
