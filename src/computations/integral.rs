use crate::core::{Computable, Datapoint, CONNECTION_STATUS_METRIC};

/// Running integral of one metric over time.
///
/// Each new sample closes the interval since the previous one, adding
/// `previous.value * dt` and emitting the running total stamped with the
/// interval start. A disconnect resets the total to zero.
pub struct CumulativeIntegral {
    input: String,
    output: String,
    total: f64,
    previous: Option<Datapoint>,
    interval_start: Option<Datapoint>,
}

impl CumulativeIntegral {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            total: 0.0,
            previous: None,
            interval_start: None,
        }
    }

    /// `<source>_Charge_Consumed` from `<source>_Current`
    pub fn charge_consumed(source: &str) -> Self {
        Self::new(format!("{source}_Current"), format!("{source}_Charge_Consumed"))
    }

    /// Distance travelled from RPM-derived velocity
    pub fn distance() -> Self {
        Self::new("RPM_Derived_Velocity", "RPM_Derived_Distance")
    }
}

impl Computable for CumulativeIntegral {
    fn name(&self) -> &str {
        &self.output
    }

    fn required_metrics(&self) -> Vec<String> {
        vec![self.input.clone(), CONNECTION_STATUS_METRIC.to_string()]
    }

    fn output_metric(&self) -> String {
        self.output.clone()
    }

    fn update(&mut self, point: &Datapoint) -> bool {
        if point.is_disconnect() {
            self.total = 0.0;
            self.previous = None;
            return false;
        }
        if point.metric != self.input {
            return false;
        }

        let ready = match self.previous.take() {
            Some(previous) => {
                let dt = (point.time - previous.time).num_microseconds().unwrap_or(0) as f64 / 1e6;
                self.total += previous.value * dt;
                self.interval_start = Some(previous);
                true
            }
            None => false,
        };
        self.previous = Some(point.clone());
        ready
    }

    fn compute(&mut self) -> Datapoint {
        let time = self
            .interval_start
            .take()
            .map(|p| p.time)
            .unwrap_or_else(chrono::Utc::now);
        Datapoint::new(self.output.clone(), self.total, time)
    }
}
