pub mod broadcaster;
pub mod ingest;
pub mod monitor;
pub mod registry;
pub mod reporter;
pub mod tcp;
pub mod udp;

pub use broadcaster::DownlinkBroadcaster;
pub use ingest::Ingest;
pub use monitor::ConnectionMonitor;
pub use registry::{ConnectionKey, ConnectionRegistry};
pub use reporter::{report_connections, ACTIVE_CONNECTIONS_METRIC};
pub use tcp::{serve_tcp, AcceptBreaker};
pub use udp::serve_udp;
