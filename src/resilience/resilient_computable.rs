use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use super::ErrorPolicy;
use crate::core::{Computable, Datapoint};
use crate::observability::ComputableMetrics;

#[derive(Debug, Error, PartialEq)]
pub enum ComputeError {
    #[error("computable {name} panicked: {message}")]
    Panicked { name: String, message: String },

    #[error("computable {name} produced non-finite {metric} = {value}")]
    NonFinite { name: String, metric: String, value: f64 },
}

/// Wraps a computable so a panic or a NaN/Inf output is contained, counted
/// and handled per `ErrorPolicy` instead of killing the worker task.
pub struct ResilientComputable {
    inner: Box<dyn Computable>,
    metrics: Arc<ComputableMetrics>,
    error_policy: ErrorPolicy,
}

impl ResilientComputable {
    pub fn new(inner: Box<dyn Computable>, metrics: Arc<ComputableMetrics>, error_policy: ErrorPolicy) -> Self {
        Self {
            inner,
            metrics,
            error_policy,
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn metrics(&self) -> &Arc<ComputableMetrics> {
        &self.metrics
    }

    /// Feed one point. `Ok(Some(_))` is an output to publish; `Err` is
    /// returned only under `ErrorPolicy::Propagate`.
    pub fn process(&mut self, point: &Datapoint) -> Result<Option<Datapoint>, ComputeError> {
        self.metrics.record_received();
        let start = self.metrics.start_processing();

        let inner = &mut self.inner;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            if inner.update(point) {
                Some(inner.compute())
            } else {
                None
            }
        }));

        let result = match outcome {
            Ok(None) => return Ok(None),
            Ok(Some(output)) if output.value.is_finite() => Ok(output),
            Ok(Some(output)) => Err(ComputeError::NonFinite {
                name: self.inner.name().to_string(),
                metric: output.metric,
                value: output.value,
            }),
            Err(payload) => Err(ComputeError::Panicked {
                name: self.inner.name().to_string(),
                message: panic_message(payload),
            }),
        };

        match result {
            Ok(output) => {
                self.metrics.finish_processing(start);
                self.metrics.record_output();
                Ok(Some(output))
            }
            Err(e) => {
                self.metrics.record_error();
                match &self.error_policy {
                    ErrorPolicy::Propagate => Err(e),
                    ErrorPolicy::SkipPoint => {
                        warn!(error = %e, "skipping computation cycle");
                        Ok(None)
                    }
                    ErrorPolicy::UseDefault(value) => {
                        warn!(error = %e, default = value, "substituting default output");
                        self.metrics.record_output();
                        Ok(Some(Datapoint::new(self.inner.output_metric(), *value, point.time)))
                    }
                }
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// Emits its input unchanged; panics on negative input.
    struct Echo;

    impl Computable for Echo {
        fn name(&self) -> &str {
            "Echo"
        }
        fn required_metrics(&self) -> Vec<String> {
            vec!["In".to_string()]
        }
        fn output_metric(&self) -> String {
            "Out".to_string()
        }
        fn update(&mut self, point: &Datapoint) -> bool {
            assert!(point.value >= 0.0, "negative input");
            true
        }
        fn compute(&mut self) -> Datapoint {
            Datapoint::now("Out", f64::NAN)
        }
    }

    fn wrap(policy: ErrorPolicy) -> ResilientComputable {
        ResilientComputable::new(Box::new(Echo), Arc::new(ComputableMetrics::new("Echo")), policy)
    }

    #[test]
    fn test_panic_is_contained() {
        let mut node = wrap(ErrorPolicy::Propagate);
        let err = node.process(&Datapoint::new("In", -1.0, Utc::now())).unwrap_err();
        assert!(matches!(err, ComputeError::Panicked { ref message, .. } if message == "negative input"));
        assert_eq!(node.metrics().errors_count(), 1);
    }

    #[test]
    fn test_non_finite_output_skipped() {
        let mut node = wrap(ErrorPolicy::SkipPoint);
        assert_eq!(node.process(&Datapoint::new("In", 1.0, Utc::now())).unwrap(), None);
        assert_eq!(node.metrics().errors_count(), 1);
        assert_eq!(node.metrics().outputs_published(), 0);
    }

    #[test]
    fn test_use_default_substitutes_value() {
        let mut node = wrap(ErrorPolicy::UseDefault(0.0));
        let time = Utc::now();
        let out = node.process(&Datapoint::new("In", 1.0, time)).unwrap().unwrap();
        assert_eq!(out.metric, "Out");
        assert_eq!(out.value, 0.0);
        assert_eq!(out.time, time);
    }
}
