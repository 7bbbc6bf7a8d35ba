//! The local SOCKS5 front-end (spec.md §4.8, §6 "SOCKS5 (local)").
//!
//! One `tokio::net::TcpListener` accept loop, one task per connection:
//! drive [`tor_socksproto::SocksProxyHandshake`] over whatever bytes the
//! socket hands back, then dispatch the finished request to
//! [`arti_client::TorClient::connect`] or
//! [`arti_client::TorClient::resolve`], isolating it from other requests
//! per [`arti_client::IsolationConfig`].

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{copy_bidirectional, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use arti_client::{
    compute_isolation_key, DangerouslyIntoTorAddr, IntoTorAddr, IsolationConfig, IsolationInput,
    TorAddr, TorClient,
};
use tor_error::{ErrorKind, HasKind};
use tor_socksproto::{NextStep, SocksAddr, SocksCmd, SocksProxyHandshake, SocksRequest, SocksStatus};

/// Turn a parsed SOCKS destination into a [`TorAddr`].
///
/// A literal IP arriving over the wire here didn't come from a local
/// resolver — the client already had it before it ever spoke to us — so
/// using [`DangerouslyIntoTorAddr`] is the correct call, not a leak.
fn socks_addr_to_tor_addr(addr: &SocksAddr, port: u16) -> Result<TorAddr, arti_client::TorAddrError> {
    match addr {
        SocksAddr::Hostname(host) => (host.as_str(), port).into_tor_addr(),
        SocksAddr::Ip(ip) => (*ip, port).into_tor_addr_dangerously(),
        _ => Err(arti_client::TorAddrError::InvalidHostname(addr.to_string())),
    }
}

/// Run the SOCKS5 listener forever, accepting connections on
/// `127.0.0.1:port` and spawning a task per client.
pub async fn run(client: Arc<TorClient>, isolation: Arc<IsolationConfig>, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "SOCKS5 listener ready");

    loop {
        let (stream, peer) = listener.accept().await?;
        let client = client.clone();
        let isolation = isolation.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(client, isolation, stream, peer).await {
                debug!(%peer, error = %e, "SOCKS connection ended with an error");
            }
        });
    }
}

/// Drive one client connection's handshake to completion, then service the
/// request it made.
async fn handle_connection(
    client: Arc<TorClient>,
    isolation: Arc<IsolationConfig>,
    mut stream: TcpStream,
    peer: SocketAddr,
) -> anyhow::Result<()> {
    let mut handshake = SocksProxyHandshake::new();
    let mut buf = Vec::new();
    let request = loop {
        let mut chunk = [0_u8; 1024];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);

        match handshake.handshake(&buf) {
            Ok(NextStep::Incomplete) => continue,
            Ok(NextStep::Reply { consumed, reply }) => {
                buf.drain(..consumed);
                stream.write_all(&reply).await?;
            }
            Ok(NextStep::Finished { consumed, request }) => {
                buf.drain(..consumed);
                break request;
            }
            Err(e) => {
                let _ = stream.write_all(&SocksProxyHandshake::no_acceptable_method_reply()).await;
                return Err(e.into());
            }
        }
    };

    service_request(client, &isolation, stream, peer, request).await
}

/// Act on a fully-parsed SOCKS request: `CONNECT` splices the client
/// socket to a Tor stream; `RESOLVE`/`RESOLVE_PTR` answer and close.
async fn service_request(
    client: Arc<TorClient>,
    isolation: &IsolationConfig,
    mut stream: TcpStream,
    peer: SocketAddr,
    request: SocksRequest,
) -> anyhow::Result<()> {
    let key = compute_isolation_key(
        isolation,
        &IsolationInput {
            dest_host: &request.addr().to_string(),
            dest_port: request.port(),
            socks_auth: request.auth(),
            client_port: peer.port(),
        },
    );

    let target = match socks_addr_to_tor_addr(request.addr(), request.port()) {
        Ok(target) => target,
        Err(e) => {
            debug!(%peer, error = %e, "unusable destination address");
            let reply = request.reply(SocksStatus::ADDRTYPE_NOT_SUPPORTED, None)?;
            stream.write_all(&reply).await?;
            return Ok(());
        }
    };

    match request.command() {
        SocksCmd::CONNECT => match client.connect(target, key).await {
            Ok(mut tor_stream) => {
                let reply = request.reply(SocksStatus::SUCCEEDED, None)?;
                stream.write_all(&reply).await?;
                copy_bidirectional(&mut stream, &mut tor_stream).await?;
                Ok(())
            }
            Err(e) => {
                warn!(%peer, error = %e, "CONNECT failed");
                let status = status_for_error(&e);
                let reply = request.reply(status, None)?;
                stream.write_all(&reply).await?;
                Ok(())
            }
        },
        SocksCmd::RESOLVE => {
            match client.resolve(target, key).await {
                Ok(answers) => {
                    let reply_addr = answers.into_iter().next().map(SocksAddr::Ip);
                    let reply = request.reply(SocksStatus::SUCCEEDED, reply_addr.as_ref())?;
                    stream.write_all(&reply).await?;
                }
                Err(e) => {
                    warn!(%peer, error = %e, "RESOLVE failed");
                    let status = status_for_error(&e);
                    let reply = request.reply(status, None)?;
                    stream.write_all(&reply).await?;
                }
            }
            Ok(())
        }
        _ => {
            // RESOLVE_PTR, BIND, UDP_ASSOCIATE, and anything else a client
            // might send: none of these are implemented (spec.md §6 lists
            // only CONNECT/RESOLVE as in scope).
            let reply = request.reply(SocksStatus::COMMAND_NOT_SUPPORTED, None)?;
            stream.write_all(&reply).await?;
            Ok(())
        }
    }
}

/// Map a connect/resolve failure onto the closest SOCKS5 reply code
/// (spec.md §4.8's reply-code table).
fn status_for_error(e: &arti_client::Error) -> SocksStatus {
    match e.kind() {
        ErrorKind::RemoteConnectionRefused => SocksStatus::CONNECTION_REFUSED,
        ErrorKind::ExitTimeout | ErrorKind::TorNetworkTimeout | ErrorKind::RemoteNetworkTimeout => {
            SocksStatus::TTL_EXPIRED
        }
        ErrorKind::ExitPolicyRejected | ErrorKind::ForbiddenStreamTarget => SocksStatus::NOT_ALLOWED,
        ErrorKind::RemoteNetworkFailed => SocksStatus::NETWORK_UNREACHABLE,
        ErrorKind::RemoteHostNotFound | ErrorKind::RemoteHostResolutionFailed => {
            SocksStatus::HOST_UNREACHABLE
        }
        ErrorKind::InvalidStreamTarget
        | ErrorKind::OnionServiceAddressInvalid
        | ErrorKind::InvalidConfig => SocksStatus::ADDRTYPE_NOT_SUPPORTED,
        _ => SocksStatus::GENERAL_FAILURE,
    }
}
