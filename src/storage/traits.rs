use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::Datapoint;

/// Durable datapoint storage behind the recorder and any query API.
#[async_trait]
pub trait DatapointStore: Send + Sync {
    async fn insert_batch(&self, points: &[Datapoint]) -> Result<()>;

    /// Points of `metric` with `start <= time <= end`, oldest first
    async fn query(&self, metric: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Datapoint>>;

    /// Every metric with at least one stored point, sorted
    async fn list_metrics(&self) -> Result<Vec<String>>;

    async fn latest(&self, metric: &str) -> Result<Option<Datapoint>>;
}
