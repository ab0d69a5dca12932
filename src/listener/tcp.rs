use anyhow::{bail, Result};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use super::ingest::Ingest;
use super::registry::ConnectionRegistry;

const READ_BUFFER_SIZE: usize = 1024;

/// Counts consecutive accept failures and trips once `max_failures` is reached.
/// Any successful accept resets the count.
#[derive(Debug)]
pub struct AcceptBreaker {
    failures: u32,
    max_failures: u32,
}

impl AcceptBreaker {
    pub fn new(max_failures: u32) -> Self {
        Self {
            failures: 0,
            max_failures: max_failures.max(1),
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// `Ok(Some(_))` on success, `Ok(None)` for a tolerated failure, `Err`
    /// when the breaker trips.
    pub fn record<T>(&mut self, result: io::Result<T>) -> Result<Option<T>> {
        match result {
            Ok(accepted) => {
                self.failures = 0;
                Ok(Some(accepted))
            }
            Err(e) => {
                self.failures += 1;
                warn!(error = %e, failures = self.failures, "failed to accept TCP connection");
                if self.failures >= self.max_failures {
                    error!(failures = self.failures, "too many consecutive accept failures, aborting listener");
                    bail!("TCP accept failed {} times in a row: {}", self.failures, e);
                }
                Ok(None)
            }
        }
    }
}

/// Accept loop. Runs until `max_accept_failures` consecutive accepts fail,
/// then returns an error so the process can exit and be restarted.
pub async fn serve_tcp(
    listener: TcpListener,
    ingest: Ingest,
    registry: Arc<ConnectionRegistry>,
    max_accept_failures: u32,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "TCP listener started");
    }

    let mut breaker = AcceptBreaker::new(max_accept_failures);
    loop {
        if let Some((stream, peer)) = breaker.record(listener.accept().await)? {
            tokio::spawn(handle_connection(stream, peer, ingest.clone(), registry.clone()));
        }
    }
}

/// One worker per connection. Errors end this connection only.
async fn handle_connection(stream: TcpStream, peer: SocketAddr, ingest: Ingest, registry: Arc<ConnectionRegistry>) {
    let (mut reader, writer) = stream.into_split();
    let (key, closed) = registry.register(peer, Box::new(writer));
    info!(connection = %key, active = registry.len(), "car connected");

    let mut decoder = ingest.decoder();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            _ = closed.notified() => {
                debug!(connection = %key, "connection evicted by downlink writer");
                break;
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    if let Err(e) = ingest.process(&mut decoder, &buf[..n]).await {
                        warn!(connection = %key, error = %e, "dropping connection");
                        break;
                    }
                }
                Err(e) => {
                    warn!(connection = %key, error = %e, "read failed");
                    break;
                }
            },
        }
    }

    registry.remove(&key);
    info!(connection = %key, active = registry.len(), "car disconnected");
}
