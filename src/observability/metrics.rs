use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters for one computable worker
pub struct ComputableMetrics {
    name: String,
    points_received: AtomicU64,
    outputs_published: AtomicU64,
    errors_count: AtomicU64,
    dropped_inputs: AtomicU64,
    total_latency_us: AtomicU64,
    latency_samples: AtomicU64,
}

impl ComputableMetrics {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points_received: AtomicU64::new(0),
            outputs_published: AtomicU64::new(0),
            errors_count: AtomicU64::new(0),
            dropped_inputs: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            latency_samples: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points_received(&self) -> u64 {
        self.points_received.load(Ordering::Relaxed)
    }

    pub fn outputs_published(&self) -> u64 {
        self.outputs_published.load(Ordering::Relaxed)
    }

    pub fn errors_count(&self) -> u64 {
        self.errors_count.load(Ordering::Relaxed)
    }

    pub fn dropped_inputs(&self) -> u64 {
        self.dropped_inputs.load(Ordering::Relaxed)
    }

    pub fn record_received(&self) {
        self.points_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_output(&self) {
        self.outputs_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Input discarded because the worker queue was full
    pub fn record_dropped(&self) -> u64 {
        self.dropped_inputs.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn start_processing(&self) -> Instant {
        Instant::now()
    }

    pub fn finish_processing(&self, start: Instant) {
        let latency_us = start.elapsed().as_micros() as u64;
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency_us(&self) -> u64 {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0;
        }
        self.total_latency_us.load(Ordering::Relaxed) / samples
    }
}
