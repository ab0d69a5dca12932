pub mod router;
pub mod subscription;

pub use router::{DatapointHub, HubStats};
pub use subscription::{MetricFilter, SubscriberId, Subscription};
