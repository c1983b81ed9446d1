use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::UdpSocket;
use tokio::task;
use tracing::Instrument;

use tftpd::{Cli, FsHandler, Session, SessionConfig, TftpPacket, UdpTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tftpd=info".into()),
        )
        .init();

    let args = Cli::parse();
    let socket = UdpSocket::bind(args.listen_addr())
        .await
        .with_context(|| format!("failed to bind {}", args.listen_addr()))?;
    let root = args
        .directory
        .canonicalize()
        .with_context(|| format!("invalid directory {}", args.directory.display()))?;
    let handler = Arc::new(FsHandler::new(root));
    let config = args.session_config();

    tracing::info!(
        addr = %socket.local_addr()?,
        root = %handler.root().display(),
        blksize = config.block_size,
        timeout = ?config.timeout,
        attempts = config.max_attempts,
        "TFTP server listening"
    );

    // Sized like a transfer socket so no request datagram gets truncated.
    let mut buf = vec![0u8; tftpd::MAX_DATAGRAM_SIZE];
    loop {
        let (num, addr) = socket.recv_from(&mut buf).await?;

        match TftpPacket::deserialize(&buf[..num]) {
            Ok(pkt @ (TftpPacket::RRQ { .. } | TftpPacket::WRQ { .. })) => {
                let handler = Arc::clone(&handler);
                let config = config.clone();
                task::spawn(
                    run_session(addr, pkt, handler, config)
                        .instrument(tracing::info_span!("session", peer = %addr)),
                );
            }
            Ok(pkt) => tracing::debug!(%addr, ?pkt, "ignoring packet on listen port"),
            Err(err) => tracing::debug!(%addr, %err, "undecodable datagram"),
        }
    }
}

async fn run_session(
    peer: SocketAddr,
    request: TftpPacket,
    handler: Arc<FsHandler>,
    config: SessionConfig,
) {
    let transport = match UdpTransport::connect(peer).await {
        Ok(transport) => transport,
        Err(err) => {
            tracing::error!(%err, "failed to open transfer socket");
            return;
        }
    };

    // Outcome is already logged by the session.
    let _ = Session::new(transport, handler, peer, &config)
        .serve(request)
        .await;
}
