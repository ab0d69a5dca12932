use serde::{Deserialize, Serialize};

/// A point along an uploaded route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Distance along the route
    pub distance: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Suggested speed at this point
    pub speed: f64,
    /// Only critical points are transmitted to the car
    #[serde(default)]
    pub critical: bool,
}

pub type Route = Vec<Waypoint>;

/// The subset of a route that is sent downlink, in route order.
pub fn critical_points(route: &[Waypoint]) -> Vec<Waypoint> {
    route.iter().filter(|p| p.critical).cloned().collect()
}
