/// What a computable worker does when `update`/`compute` panics or yields a
/// non-finite value.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorPolicy {
    /// Stop the worker; other computables keep running
    Propagate,

    /// Drop the failed cycle and keep consuming input
    SkipPoint,

    /// Publish this value in place of the failed output
    UseDefault(f64),
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self::SkipPoint
    }
}
