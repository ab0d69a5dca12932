use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::registry::ConnectionRegistry;
use crate::protocol::DownlinkSink;

/// Downlink queue drained by a single writer task that broadcasts each
/// packet to every live TCP connection.
#[derive(Clone)]
pub struct DownlinkBroadcaster {
    tx: mpsc::Sender<Vec<u8>>,
}

impl DownlinkBroadcaster {
    pub fn start(registry: Arc<ConnectionRegistry>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(packet) = rx.recv().await {
                let delivered = registry.broadcast(&packet).await;
                if delivered == 0 {
                    warn!(bytes = packet.len(), "downlink packet not delivered, no live connections");
                } else {
                    debug!(bytes = packet.len(), delivered, "downlink packet sent");
                }
            }
        });
        (Self { tx }, handle)
    }
}

#[async_trait]
impl DownlinkSink for DownlinkBroadcaster {
    async fn write(&self, packet: Vec<u8>) -> Result<()> {
        self.tx
            .send(packet)
            .await
            .map_err(|_| anyhow!("downlink writer has stopped"))
    }
}
