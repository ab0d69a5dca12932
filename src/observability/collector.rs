use std::collections::BTreeMap;
use std::sync::Arc;

use super::ComputableMetrics;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub name: String,
    pub points_received: u64,
    pub outputs_published: u64,
    pub errors_count: u64,
    pub dropped_inputs: u64,
    pub avg_latency_us: u64,
}

/// Registry of per-computable metrics, keyed by computable name.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: BTreeMap<String, Arc<ComputableMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, metrics: Arc<ComputableMetrics>) {
        self.metrics.insert(metrics.name().to_string(), metrics);
    }

    pub fn snapshot(&self) -> Vec<MetricsSnapshot> {
        self.metrics
            .values()
            .map(|m| MetricsSnapshot {
                name: m.name().to_string(),
                points_received: m.points_received(),
                outputs_published: m.outputs_published(),
                errors_count: m.errors_count(),
                dropped_inputs: m.dropped_inputs(),
                avg_latency_us: m.avg_latency_us(),
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ComputableMetrics>> {
        self.metrics.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
