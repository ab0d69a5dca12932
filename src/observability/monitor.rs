use super::MetricsCollector;

pub struct EngineMonitor {
    collector: MetricsCollector,
}

impl EngineMonitor {
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }

    pub fn generate_report(&self) -> String {
        let snapshot = self.collector.snapshot();

        if snapshot.is_empty() {
            return "No computables registered".to_string();
        }

        let mut report = String::from("=== Computation Metrics ===\n");

        for m in &snapshot {
            report.push_str(&format!(
                "\n[{}]\n  In: {} points ({} dropped)\n  Out: {} points\n  Errors: {}\n  Avg Latency: {}μs\n",
                m.name,
                m.points_received,
                m.dropped_inputs,
                m.outputs_published,
                if m.errors_count > 0 {
                    format!("{} error{}", m.errors_count, if m.errors_count == 1 { "" } else { "s" })
                } else {
                    "0 errors".to_string()
                },
                m.avg_latency_us
            ));
        }

        report
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }
}
