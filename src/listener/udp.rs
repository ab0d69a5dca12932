use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tracing::{info, trace};

use super::ingest::Ingest;

const MAX_DATAGRAM: usize = 65_536;

/// Reads datagrams with one shared decoder. Frames never span datagrams, so
/// the decoder is reset at every datagram boundary.
pub async fn serve_udp(socket: UdpSocket, ingest: Ingest) -> Result<()> {
    if let Ok(addr) = socket.local_addr() {
        info!(%addr, "UDP listener started");
    }

    let mut decoder = ingest.decoder();
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (n, peer) = socket.recv_from(&mut buf).await.context("UDP receive failed")?;
        decoder.reset();
        let published = ingest.process(&mut decoder, &buf[..n]).await?;
        trace!(%peer, bytes = n, published, "datagram processed");
    }
}
