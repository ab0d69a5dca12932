use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::core::{is_valid_metric_name, Datapoint};
use crate::protocol::{decode_value, Datatype, Frame};

/// Rule for extracting one named value from a frame payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricConfig {
    pub can_id: u16,
    pub datatype: String,
    pub name: String,
    /// Byte offset, or bit offset for `bit`
    pub offset: usize,
    #[serde(default)]
    pub check_bounds: bool,
    #[serde(default)]
    pub min_value: f64,
    #[serde(default)]
    pub max_value: f64,
    #[serde(default)]
    pub description: String,
}

impl MetricConfig {
    fn in_bounds(&self, value: f64) -> bool {
        !self.check_bounds || (self.min_value..=self.max_value).contains(&value)
    }
}

#[derive(Debug, Clone)]
struct MetricRule {
    config: MetricConfig,
    datatype: Option<Datatype>,
}

/// Read-only table built once at startup, indexed by CAN id.
#[derive(Debug, Clone, Default)]
pub struct MetricTable {
    rules: HashMap<u16, Vec<MetricRule>>,
}

impl MetricTable {
    pub fn from_configs(configs: Vec<MetricConfig>) -> Result<Self> {
        let mut rules: HashMap<u16, Vec<MetricRule>> = HashMap::new();
        for config in configs {
            if !is_valid_metric_name(&config.name) {
                bail!(
                    "metric name {:?} (CAN id 0x{:x}) must be non-empty and contain no whitespace",
                    config.name,
                    config.can_id
                );
            }
            let datatype = match config.datatype.parse::<Datatype>() {
                Ok(datatype) => Some(datatype),
                Err(e) => {
                    warn!(metric = %config.name, error = %e, "metric will never be decoded");
                    None
                }
            };
            rules
                .entry(config.can_id)
                .or_default()
                .push(MetricRule { config, datatype });
        }
        Ok(Self { rules })
    }

    /// Load and merge every `*.json` array in `dir` (files read in name order).
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)
            .with_context(|| format!("Failed to read metric config directory {:?}", dir))?
        {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut configs = Vec::new();
        for path in paths {
            let json = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read metric configs from {:?}", path))?;
            let mut list: Vec<MetricConfig> = serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse metric configs in {:?}", path))?;
            configs.append(&mut list);
        }
        Self::from_configs(configs)
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn configs_for(&self, can_id: u16) -> impl Iterator<Item = &MetricConfig> {
        self.rules
            .get(&can_id)
            .into_iter()
            .flatten()
            .map(|rule| &rule.config)
    }

    /// Convert a frame into zero or more datapoints stamped with `time`.
    ///
    /// Unknown CAN ids yield nothing. A rule whose datatype is unknown, whose
    /// offset is out of range, or whose value is non-finite or out of bounds
    /// is skipped without affecting the other rules of the frame.
    pub fn decode(&self, frame: &Frame, time: DateTime<Utc>) -> Vec<Datapoint> {
        let Some(rules) = self.rules.get(&frame.can_id) else {
            return Vec::new();
        };

        let mut points = Vec::with_capacity(rules.len());
        for rule in rules {
            let Some(datatype) = rule.datatype else {
                debug!(metric = %rule.config.name, datatype = %rule.config.datatype, "skipping unknown datatype");
                continue;
            };
            match decode_value(datatype, &frame.payload, rule.config.offset) {
                Ok(value) if rule.config.in_bounds(value) => {
                    points.push(Datapoint::new(rule.config.name.clone(), value, time));
                }
                Ok(value) => {
                    debug!(metric = %rule.config.name, value, "dropping out-of-bounds value");
                }
                Err(e) => {
                    debug!(
                        metric = %rule.config.name,
                        can_id = frame.can_id,
                        error = %e,
                        "dropping undecodable value"
                    );
                }
            }
        }
        points
    }
}
