//! A minimal command-line client for connecting to the Tor network: reads
//! a TOML config file, loads an operator-refreshed directory snapshot, and
//! runs a local SOCKS5 listener on top of [`arti_client`] (spec.md §4.8,
//! §6).

mod config;
mod dir;
mod err;
mod socks;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use arti_client::TorClient;

use config::Config;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "arti", about = "A minimal command-line Tor client")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "arti.toml")]
    config: PathBuf,
}

fn main() {
    main_main().unwrap_or_else(tor_error::report_and_exit);
}

fn main_main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building the async runtime")?;
    runtime.block_on(run(config))
}

/// Build the directory provider and `TorClient`, then run the SOCKS
/// listener until the process is killed.
async fn run(config: Config) -> anyhow::Result<()> {
    let dir_provider = dir::load_snapshot(&config.dir_snapshot_path).with_context(|| {
        format!(
            "loading directory snapshot from {}",
            config.dir_snapshot_path.display()
        )
    })?;

    let client = TorClient::new(Arc::new(dir_provider), config.client.clone())
        .context("building the Tor client")?;
    let client = Arc::new(client);
    let isolation = Arc::new(config.client.isolation.clone());

    tracing::info!(socks_port = config.proxy.socks_port, "starting");
    socks::run(client, isolation, config.proxy.socks_port).await
}

/// Install a `tracing-subscriber` formatter honoring `RUST_LOG`, defaulting
/// to `info` when it's unset.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
