use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::subscription::{MetricFilter, SubscriberId, Subscriber, Subscription};
use crate::config::HubConfig;
use crate::core::Datapoint;

type SubscriberMap = Arc<Mutex<HashMap<SubscriberId, Subscriber>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubStats {
    pub published: u64,
    pub subscribers: usize,
    pub dropped: u64,
}

struct HubInner {
    publish_tx: Mutex<Option<mpsc::Sender<Datapoint>>>,
    subscribers: SubscriberMap,
    fanout: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
    published: Arc<AtomicU64>,
    subscriber_capacity: usize,
}

/// Cloneable handle to one hub instance.
#[derive(Clone)]
pub struct DatapointHub {
    inner: Arc<HubInner>,
}

impl DatapointHub {
    /// Create the hub and spawn its fan-out task. Must run inside a tokio runtime.
    pub fn start(config: &HubConfig) -> Self {
        let (publish_tx, publish_rx) = mpsc::channel(config.publish_capacity.max(1));
        let subscribers: SubscriberMap = Arc::new(Mutex::new(HashMap::new()));
        let published = Arc::new(AtomicU64::new(0));

        let fanout = tokio::spawn(fan_out(publish_rx, subscribers.clone(), published.clone()));

        Self {
            inner: Arc::new(HubInner {
                publish_tx: Mutex::new(Some(publish_tx)),
                subscribers,
                fanout: tokio::sync::Mutex::new(Some(fanout)),
                next_id: AtomicU64::new(1),
                published,
                subscriber_capacity: config.subscriber_capacity.max(1),
            }),
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<Datapoint>> {
        self.inner
            .publish_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| anyhow!("datapoint hub is closed"))
    }

    /// Queue a point for delivery, waiting while the publish queue is full.
    pub async fn publish(&self, point: Datapoint) -> Result<()> {
        self.sender()?
            .send(point)
            .await
            .map_err(|_| anyhow!("datapoint hub is closed"))
    }

    /// Queue a point without waiting; fails if the publish queue is full.
    pub fn try_publish(&self, point: Datapoint) -> Result<()> {
        self.sender()?.try_send(point).map_err(|e| match e {
            TrySendError::Full(p) => anyhow!("publish queue full, dropped {}", p.metric),
            TrySendError::Closed(_) => anyhow!("datapoint hub is closed"),
        })
    }

    /// Subscribe with the default mailbox size. An empty filter receives everything.
    pub fn subscribe(&self, filter: MetricFilter) -> Result<Subscription> {
        self.subscribe_with_capacity(filter, self.inner.subscriber_capacity)
    }

    pub fn subscribe_all(&self) -> Result<Subscription> {
        self.subscribe(MetricFilter::all())
    }

    pub fn subscribe_with_capacity(&self, filter: MetricFilter, capacity: usize) -> Result<Subscription> {
        if self.is_closed() {
            return Err(anyhow!("datapoint hub is closed"));
        }
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));

        debug!(subscriber = %id, ?filter, "subscribing");
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Subscriber {
                    filter,
                    tx,
                    dropped: dropped.clone(),
                },
            );
        Ok(Subscription::new(id, rx, dropped))
    }

    /// Stop deliveries to `id`. Its receiver sees the end of stream after
    /// draining what was already queued.
    pub fn unsubscribe(&self, id: SubscriberId) -> Result<()> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("subscriber {} not found", id))
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .publish_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub fn stats(&self) -> HubStats {
        let subscribers = self.inner.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        HubStats {
            published: self.inner.published.load(Ordering::Relaxed),
            subscribers: subscribers.len(),
            dropped: subscribers
                .values()
                .map(|s| s.dropped.load(Ordering::Relaxed))
                .sum(),
        }
    }

    /// Stop accepting points, deliver what is queued, then end every subscription.
    pub async fn close(&self) {
        let tx = self
            .inner
            .publish_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(tx);

        let handle = self.inner.fanout.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "hub fan-out task ended abnormally");
            }
        }
    }
}

async fn fan_out(
    mut publish_rx: mpsc::Receiver<Datapoint>,
    subscribers: SubscriberMap,
    published: Arc<AtomicU64>,
) {
    while let Some(point) = publish_rx.recv().await {
        published.fetch_add(1, Ordering::Relaxed);

        let mut subs = subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut gone = Vec::new();
        for (id, sub) in subs.iter() {
            if !sub.filter.matches(&point.metric) {
                continue;
            }
            match sub.tx.try_send(point.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    let dropped = sub.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if dropped.is_power_of_two() {
                        warn!(subscriber = %id, dropped, metric = %point.metric, "subscriber mailbox full, dropping");
                    }
                }
                Err(TrySendError::Closed(_)) => gone.push(*id),
            }
        }
        for id in gone {
            debug!(subscriber = %id, "receiver dropped, removing subscriber");
            subs.remove(&id);
        }
    }

    subscribers.lock().unwrap_or_else(PoisonError::into_inner).clear();
    debug!("hub fan-out stopped");
}
