use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::registry::ConnectionRegistry;
use crate::core::Datapoint;
use crate::hub::DatapointHub;

pub const ACTIVE_CONNECTIONS_METRIC: &str = "Active_TCP_Connections";

/// Publish the live connection count every `interval` until the hub closes.
pub async fn report_connections(registry: Arc<ConnectionRegistry>, hub: DatapointHub, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let point = Datapoint::now(ACTIVE_CONNECTIONS_METRIC, registry.len() as f64);
        if hub.publish(point).await.is_err() {
            debug!("hub closed, connection reporter stopping");
            return;
        }
    }
}
