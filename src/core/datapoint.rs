use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metric published by the connection monitor: 1 when the car is sending, 0 after a silence.
pub const CONNECTION_STATUS_METRIC: &str = "Connection_Status";

/// Basic data unit passed between ingestion, the hub and computations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    /// Stream identifier, unique per physical quantity (e.g. "BMS_Current")
    pub metric: String,

    pub value: f64,

    /// Side-channel information (event tags, source, ...)
    #[serde(default)]
    pub tags: HashMap<String, String>,

    /// Time the measurement was taken (or derived)
    pub time: DateTime<Utc>,
}

impl Datapoint {
    pub fn new(metric: impl Into<String>, value: f64, time: DateTime<Utc>) -> Self {
        Self {
            metric: metric.into(),
            value,
            tags: HashMap::new(),
            time,
        }
    }

    /// Datapoint stamped with the current wall-clock time
    pub fn now(metric: impl Into<String>, value: f64) -> Self {
        Self::new(metric, value, Utc::now())
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// True for a `Connection_Status = 0` point.
    pub fn is_disconnect(&self) -> bool {
        self.metric == CONNECTION_STATUS_METRIC && self.value == 0.0
    }
}

/// Metric names are whitespace-free stream identifiers.
pub fn is_valid_metric_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_detection() {
        assert!(Datapoint::now(CONNECTION_STATUS_METRIC, 0.0).is_disconnect());
        assert!(!Datapoint::now(CONNECTION_STATUS_METRIC, 1.0).is_disconnect());
        assert!(!Datapoint::now("BMS_Current", 0.0).is_disconnect());
    }

    #[test]
    fn test_metric_name_validation() {
        assert!(is_valid_metric_name("Pack_Resistance"));
        assert!(!is_valid_metric_name("Pack Resistance"));
        assert!(!is_valid_metric_name("Tab\tName"));
        assert!(!is_valid_metric_name(""));
    }
}
