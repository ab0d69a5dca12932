pub mod metric_table;
pub mod server;

pub use metric_table::{MetricConfig, MetricTable};
pub use server::{EngineConfig, HubConfig, ListenerConfig, ServerConfig, StorageConfig, UploaderConfig};
