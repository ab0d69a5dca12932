pub mod computable;
pub mod datapoint;
pub mod route;

pub use computable::Computable;
pub use datapoint::{is_valid_metric_name, Datapoint, CONNECTION_STATUS_METRIC};
pub use route::{critical_points, Route, Waypoint};
