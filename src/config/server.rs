use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::protocol::FrameLayout;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub tcp_addr: String,

    pub udp_addr: String,

    /// Directory of `*.json` metric config arrays
    pub metric_config_dir: PathBuf,

    /// Directory holding the persisted route and upload progress
    pub track_dir: PathBuf,

    /// Magic prefix for both uplink frames and downlink packets
    pub preamble: String,

    /// Uplink payload size following the CAN id
    pub payload_len: usize,

    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,

    pub hub: HubConfig,
    pub engine: EngineConfig,
    pub uploader: UploaderConfig,
    pub listener: ListenerConfig,
    pub storage: StorageConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_addr: "0.0.0.0:6001".to_string(),
            udp_addr: "0.0.0.0:6001".to_string(),
            metric_config_dir: PathBuf::from("can_configs"),
            track_dir: PathBuf::from("track"),
            preamble: "GT".to_string(),
            payload_len: 8,
            log_level: "info".to_string(),
            hub: HubConfig::default(),
            engine: EngineConfig::default(),
            uploader: UploaderConfig::default(),
            listener: ListenerConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Self = serde_json::from_str(&json).with_context(|| format!("Invalid config file {:?}", path))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file {:?}", path))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.preamble.is_empty() {
            bail!("preamble must not be empty");
        }
        if self.payload_len == 0 {
            bail!("payload_len must be at least 1");
        }
        if self.listener.report_interval_secs == 0 {
            bail!("listener.report_interval_secs must be at least 1");
        }
        if self.uploader.retry_timeout_ms == 0 {
            bail!("uploader.retry_timeout_ms must be at least 1");
        }
        if self.storage.flush_interval_ms == 0 {
            bail!("storage.flush_interval_ms must be at least 1");
        }
        if self.storage.max_points_per_metric == 0 {
            bail!("storage.max_points_per_metric must be at least 1");
        }
        Ok(())
    }

    pub fn frame_layout(&self) -> FrameLayout {
        FrameLayout {
            preamble: self.preamble.as_bytes().to_vec(),
            payload_len: self.payload_len,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub publish_capacity: usize,
    pub subscriber_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            publish_capacity: 10_000,
            subscriber_capacity: 1_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub worker_capacity: usize,
    /// Hub mailbox size for the engine's router subscription
    pub router_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_capacity: 100,
            router_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    pub retry_timeout_ms: u64,
}

impl UploaderConfig {
    pub fn retry_timeout(&self) -> Duration {
        Duration::from_millis(self.retry_timeout_ms)
    }
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self { retry_timeout_ms: 3_000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Consecutive accept failures that abort the TCP listener
    pub max_accept_failures: u32,
    /// Period of the active-connection-count metric
    pub report_interval_secs: u64,
    /// Silence after which the car is reported disconnected
    pub connection_timeout_secs: u64,
    pub downlink_queue: usize,
    /// A connection that does not take a downlink packet within this is evicted
    pub write_timeout_ms: u64,
}

impl ListenerConfig {
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_accept_failures: 5,
            report_interval_secs: 5,
            connection_timeout_secs: 10,
            downlink_queue: 100,
            write_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Oldest points beyond this are evicted, per metric
    pub max_points_per_metric: usize,
    pub flush_interval_ms: u64,
}

impl StorageConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_points_per_metric: 100_000,
            flush_interval_ms: 1_000,
        }
    }
}
