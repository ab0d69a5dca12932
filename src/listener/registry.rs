use dashmap::DashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;
use tracing::{info, warn};

pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Remote address plus a nonce, so a reconnect from the same port never
/// collides with a stale entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub addr: SocketAddr,
    pub nonce: u64,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.addr, self.nonce)
    }
}

struct ConnectionHandle {
    writer: Arc<Mutex<BoxedWriter>>,
    closed: Arc<Notify>,
}

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Live TCP connections, shared by connection workers, the downlink
/// broadcaster and the connection-count reporter.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionKey, ConnectionHandle>,
    next_nonce: AtomicU64,
    active: AtomicUsize,
    write_timeout: Duration,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::with_write_timeout(DEFAULT_WRITE_TIMEOUT)
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A peer that does not accept a packet within `write_timeout` is evicted.
    pub fn with_write_timeout(write_timeout: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            next_nonce: AtomicU64::new(0),
            active: AtomicUsize::new(0),
            write_timeout,
        }
    }

    /// Track a connection's write half. The returned `Notify` fires when the
    /// registry evicts the connection, telling the reader to stop.
    pub fn register(&self, addr: SocketAddr, writer: BoxedWriter) -> (ConnectionKey, Arc<Notify>) {
        let key = ConnectionKey {
            addr,
            nonce: self.next_nonce.fetch_add(1, Ordering::Relaxed),
        };
        let closed = Arc::new(Notify::new());
        self.connections.insert(
            key,
            ConnectionHandle {
                writer: Arc::new(Mutex::new(writer)),
                closed: closed.clone(),
            },
        );
        self.active.fetch_add(1, Ordering::Relaxed);
        (key, closed)
    }

    pub fn remove(&self, key: &ConnectionKey) -> bool {
        match self.connections.remove(key) {
            Some((_, handle)) => {
                self.active.fetch_sub(1, Ordering::Relaxed);
                handle.closed.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &ConnectionKey) -> bool {
        self.connections.contains_key(key)
    }

    /// Write `packet` to every registered connection. Connections whose write
    /// fails or stalls past the write timeout are evicted. Returns the number
    /// of successful writes.
    pub async fn broadcast(&self, packet: &[u8]) -> usize {
        // Snapshot first: no map guard may be held across an await.
        let targets: Vec<(ConnectionKey, Arc<Mutex<BoxedWriter>>)> = self
            .connections
            .iter()
            .map(|entry| (*entry.key(), entry.value().writer.clone()))
            .collect();

        let mut delivered = 0;
        for (key, writer) in targets {
            let mut writer = writer.lock().await;
            let result = timeout(self.write_timeout, async {
                writer.write_all(packet).await?;
                writer.flush().await
            })
            .await;
            let failure = match result {
                Ok(Ok(())) => {
                    delivered += 1;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("write stalled for {:?}", self.write_timeout),
            };

            warn!(connection = %key, error = %failure, "downlink write failed, closing connection");
            // a stalled peer may also stall the shutdown
            let _ = timeout(self.write_timeout, writer.shutdown()).await;
            if self.remove(&key) {
                info!(connection = %key, "connection evicted");
            }
        }
        delivered
    }
}
