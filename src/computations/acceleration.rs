use chrono::{DateTime, Utc};

use crate::core::{Computable, Datapoint, CONNECTION_STATUS_METRIC};

const WINDOW: usize = 3;

/// Central difference over the last three velocity samples:
/// `a(n) = (v(n+1) - v(n-1)) / (t(n+1) - t(n-1))`, stamped at `t(n)`.
///
/// Fires on every sample once the window is full. A disconnect empties it.
pub struct Acceleration {
    input: String,
    output: String,
    samples: [(f64, Option<DateTime<Utc>>); WINDOW],
    next: usize,
    len: usize,
}

impl Acceleration {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            samples: [(0.0, None); WINDOW],
            next: 0,
            len: 0,
        }
    }

    /// Acceleration of the car from RPM-derived velocity
    pub fn rpm_derived() -> Self {
        Self::new("RPM_Derived_Velocity", "RPM_Derived_Acceleration")
    }

    fn slot(&self, age: usize) -> (f64, Option<DateTime<Utc>>) {
        // age 0 is the oldest sample in the window
        self.samples[(self.next + age) % WINDOW]
    }
}

impl Computable for Acceleration {
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
            self.len = 0;
            self.next = 0;
            return false;
        }
        if point.metric != self.input {
            return false;
        }
        self.samples[self.next] = (point.value, Some(point.time));
        self.next = (self.next + 1) % WINDOW;
        self.len = (self.len + 1).min(WINDOW);
        self.len == WINDOW
    }

    fn compute(&mut self) -> Datapoint {
        let (before, before_time) = self.slot(0);
        let (_, now_time) = self.slot(1);
        let (after, after_time) = self.slot(2);

        let value = match (before_time, after_time) {
            (Some(t0), Some(t2)) => {
                let dt = (t2 - t0).num_microseconds().unwrap_or(0) as f64 / 1e6;
                (after - before) / dt
            }
            _ => f64::NAN,
        };
        Datapoint::new(self.output.clone(), value, now_time.unwrap_or_else(Utc::now))
    }
}
