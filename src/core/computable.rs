use super::Datapoint;

/// A stateful unit deriving one output metric from a fixed set of input metrics.
///
/// The engine feeds every point whose metric is in `required_metrics()` to
/// `update`. When `update` returns true the engine immediately calls `compute`,
/// which consumes (fully or partially resets) the accumulated state and returns
/// the derived point that gets republished into the hub.
pub trait Computable: Send {
    /// Human-readable identifier used in logs and metrics
    fn name(&self) -> &str;

    /// Input metrics this unit subscribes to. Fixed for the unit's lifetime.
    fn required_metrics(&self) -> Vec<String>;

    /// Metric produced by `compute`. Used to validate the derivation graph.
    fn output_metric(&self) -> String;

    /// Feed one point; returns true exactly when one output cycle is ready.
    fn update(&mut self, point: &Datapoint) -> bool;

    /// Produce the derived point and reset the consumed state.
    fn compute(&mut self) -> Datapoint;
}
