use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::core::Datapoint;

/// Opaque handle identifying one subscriber of a hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Metrics a subscriber wants; empty means everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricFilter(HashSet<String>);

impl MetricFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<I, S>(metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(metrics.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, metric: &str) -> bool {
        self.0.is_empty() || self.0.contains(metric)
    }

    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Hub-side state of a subscriber.
pub(crate) struct Subscriber {
    pub(crate) filter: MetricFilter,
    pub(crate) tx: mpsc::Sender<Datapoint>,
    pub(crate) dropped: Arc<AtomicU64>,
}

/// Receiving end of a hub subscription.
///
/// Points arrive in publish order. When the mailbox is full new points for
/// this subscriber are dropped and counted; other subscribers are unaffected.
/// `recv` returns `None` once the subscriber is removed or the hub closes.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Datapoint>,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, rx: mpsc::Receiver<Datapoint>, dropped: Arc<AtomicU64>) -> Self {
        Self { id, rx, dropped }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Datapoint> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Datapoint> {
        self.rx.try_recv().ok()
    }

    /// Points discarded because this mailbox was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("dropped", &self.dropped())
            .finish()
    }
}
