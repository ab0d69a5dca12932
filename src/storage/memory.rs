use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;

use super::traits::DatapointStore;
use crate::core::Datapoint;

/// In-memory store: one time-ordered series per metric, each capped at
/// `max_points_per_metric` by evicting the oldest points.
pub struct MemoryStore {
    series: DashMap<String, VecDeque<Datapoint>>,
    max_points_per_metric: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_retention(100_000)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(max_points_per_metric: usize) -> Self {
        Self {
            series: DashMap::new(),
            max_points_per_metric: max_points_per_metric.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.series.iter().map(|s| s.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DatapointStore for MemoryStore {
    async fn insert_batch(&self, points: &[Datapoint]) -> Result<()> {
        for point in points {
            let mut series = self.series.entry(point.metric.clone()).or_default();
            // out-of-order arrivals are placed by recorded time
            let at = series.partition_point(|p| p.time <= point.time);
            series.insert(at, point.clone());
            while series.len() > self.max_points_per_metric {
                series.pop_front();
            }
        }
        Ok(())
    }

    async fn query(&self, metric: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Datapoint>> {
        Ok(self
            .series
            .get(metric)
            .map(|series| {
                let from = series.partition_point(|p| p.time < start);
                let to = series.partition_point(|p| p.time <= end);
                series.range(from..to.max(from)).cloned().collect()
            })
            .unwrap_or_default())
    }

    async fn list_metrics(&self) -> Result<Vec<String>> {
        let mut metrics: Vec<String> = self
            .series
            .iter()
            .filter(|s| !s.value().is_empty())
            .map(|s| s.key().clone())
            .collect();
        metrics.sort();
        Ok(metrics)
    }

    async fn latest(&self, metric: &str) -> Result<Option<Datapoint>> {
        Ok(self.series.get(metric).and_then(|s| s.back().cloned()))
    }
}
