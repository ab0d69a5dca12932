use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;

use crate::config::MetricTable;
use crate::hub::DatapointHub;
use crate::protocol::{FrameDecoder, FrameLayout};

/// Bytes → frames → datapoints → hub. Shared by the TCP and UDP paths.
#[derive(Clone)]
pub struct Ingest {
    table: Arc<MetricTable>,
    hub: DatapointHub,
    layout: FrameLayout,
}

impl Ingest {
    pub fn new(table: Arc<MetricTable>, hub: DatapointHub, layout: FrameLayout) -> Self {
        Self { table, hub, layout }
    }

    pub fn decoder(&self) -> FrameDecoder {
        FrameDecoder::new(self.layout.clone())
    }

    /// Feed bytes through `decoder` and publish every decoded point.
    /// Returns the number of points published; fails only when the hub is closed.
    pub async fn process(&self, decoder: &mut FrameDecoder, bytes: &[u8]) -> Result<usize> {
        let mut published = 0;
        for frame in decoder.feed(bytes) {
            for point in self.table.decode(&frame, Utc::now()) {
                self.hub.publish(point).await?;
                published += 1;
            }
        }
        Ok(published)
    }
}
