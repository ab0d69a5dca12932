use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::DatapointStore;
use crate::core::Datapoint;
use crate::hub::{DatapointHub, Subscription};

/// Buffers every hub datapoint and writes it to a store in batches.
pub struct Recorder {
    subscription: Subscription,
    store: Arc<dyn DatapointStore>,
    flush_interval: Duration,
    buffer: Vec<Datapoint>,
}

impl Recorder {
    pub fn new(hub: &DatapointHub, store: Arc<dyn DatapointStore>, flush_interval: Duration) -> Result<Self> {
        Ok(Self {
            subscription: hub.subscribe_all()?,
            store,
            flush_interval,
            buffer: Vec::new(),
        })
    }

    /// Runs until the hub closes, then flushes what is left.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                point = self.subscription.recv() => match point {
                    Some(point) => self.buffer.push(point),
                    None => break,
                },
                _ = ticker.tick() => self.flush().await,
            }
        }
        self.flush().await;
        debug!("recorder stopped");
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        match self.store.insert_batch(&self.buffer).await {
            Ok(()) => {
                debug!(points = self.buffer.len(), "flushed datapoints");
                self.buffer.clear();
            }
            // kept for the next tick
            Err(e) => warn!(error = %e, points = self.buffer.len(), "failed to store datapoints"),
        }
    }
}
