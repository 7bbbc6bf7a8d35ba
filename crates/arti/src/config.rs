//! This binary's own configuration: the SOCKS front-end and directory
//! snapshot settings layered on top of [`arti_client::TorClientConfig`]
//! (spec.md §6 "CLI & environment" collaborator).
//!
//! Parsing flags and config files is explicitly named as an external
//! collaborator's job (spec.md §1); this is that collaborator, kept
//! deliberately thin: one TOML file, one `serde` derive, eager validation
//! at startup rather than lazily at first use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use arti_client::TorClientConfig;

use crate::err::{Error, Result};

/// The SOCKS5 port Tor Browser and most `torrc`-based setups expect a local
/// Tor instance to listen on.
const DEFAULT_SOCKS_PORT: u16 = 9150;

/// Settings for the local SOCKS5 listener (spec.md §4.8, §6 "SOCKS5
/// (local)").
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// TCP port the SOCKS5 listener binds, on `127.0.0.1`.
    pub socks_port: u16,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            socks_port: DEFAULT_SOCKS_PORT,
        }
    }
}

/// This binary's full configuration: everything [`TorClientConfig`] needs,
/// plus the SOCKS front-end's own settings and the path to a locally cached
/// directory snapshot.
///
/// Fetching and parsing a live consensus is out of scope for this core
/// (spec.md §1, §6); an operator refreshes `dir_snapshot_path`'s file out
/// of band (e.g. by copying one down from a real directory cache) and this
/// binary only ever loads it at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The SOCKS front-end's own settings.
    pub proxy: ProxyConfig,
    /// Where the directory-snapshot TOML file lives.
    pub dir_snapshot_path: PathBuf,
    /// Settings handed straight to [`arti_client::TorClient::new`].
    pub client: TorClientConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            proxy: ProxyConfig::default(),
            dir_snapshot_path: PathBuf::from("dir-snapshot.toml"),
            client: TorClientConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Io {
            path: path.display().to_string(),
            source: std::sync::Arc::new(e),
        })?;
        let config: Config = toml::from_str(&text).map_err(|e| Error::Toml {
            path: path.display().to_string(),
            source: std::sync::Arc::new(e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check this binary's own settings, beyond what
    /// [`TorClientConfig::validate`] already covers.
    fn validate(&self) -> Result<()> {
        if self.proxy.socks_port == 0 {
            return Err(Error::ConfigInvalid(
                "proxy.socks_port must not be 0".into(),
            ));
        }
        if self.dir_snapshot_path.as_os_str().is_empty() {
            return Err(Error::ConfigInvalid(
                "dir_snapshot_path must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_has_expected_socks_port() {
        assert_eq!(Config::default().proxy.socks_port, DEFAULT_SOCKS_PORT);
    }

    #[test]
    fn loads_minimal_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arti.toml");
        std::fs::write(
            &path,
            r#"
            dir_snapshot_path = "dir.toml"

            [client]
            state_dir = "state"

            [proxy]
            socks_port = 9050
            "#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.proxy.socks_port, 9050);
        assert_eq!(config.client.state_dir, PathBuf::from("state"));
    }

    #[test]
    fn rejects_zero_socks_port() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arti.toml");
        std::fs::write(
            &path,
            r#"
            dir_snapshot_path = "dir.toml"

            [client]
            state_dir = "state"

            [proxy]
            socks_port = 0
            "#,
        )
        .unwrap();
        assert!(Config::load(&path).is_err());
    }
}
