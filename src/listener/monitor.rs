use anyhow::Result;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::info;

use super::reporter::ACTIVE_CONNECTIONS_METRIC;
use crate::core::{Datapoint, CONNECTION_STATUS_METRIC};
use crate::hub::{DatapointHub, Subscription};

/// Watches hub traffic and publishes `Connection_Status`: 1 on the first car
/// datapoint after a silence, 0 once nothing has arrived for `timeout`.
pub struct ConnectionMonitor {
    hub: DatapointHub,
    subscription: Subscription,
    timeout: Duration,
}

impl ConnectionMonitor {
    /// Subscribes immediately so no traffic is missed before `run` is polled.
    pub fn new(hub: DatapointHub, timeout: Duration) -> Result<Self> {
        let subscription = hub.subscribe_all()?;
        Ok(Self {
            hub,
            subscription,
            timeout,
        })
    }

    fn is_car_data(point: &Datapoint) -> bool {
        point.metric != CONNECTION_STATUS_METRIC && point.metric != ACTIVE_CONNECTIONS_METRIC
    }

    /// Runs until the hub closes.
    pub async fn run(mut self) -> Result<()> {
        let mut connected = false;
        let silence = sleep(self.timeout);
        tokio::pin!(silence);

        loop {
            tokio::select! {
                point = self.subscription.recv() => {
                    let Some(point) = point else { return Ok(()) };
                    if !Self::is_car_data(&point) {
                        continue;
                    }
                    silence.as_mut().reset(Instant::now() + self.timeout);
                    if !connected {
                        connected = true;
                        info!("car connection established");
                        self.hub.publish(Datapoint::now(CONNECTION_STATUS_METRIC, 1.0)).await?;
                    }
                }
                _ = &mut silence, if connected => {
                    connected = false;
                    info!(timeout = ?self.timeout, "car connection lost");
                    self.hub.publish(Datapoint::now(CONNECTION_STATUS_METRIC, 0.0)).await?;
                }
            }
        }
    }
}
