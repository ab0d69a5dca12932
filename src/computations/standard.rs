use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::core::{Computable, Datapoint};

/// Latest value per required field.
#[derive(Debug, Default)]
pub struct Values(HashMap<String, f64>);

impl Values {
    pub fn get(&self, metric: &str) -> f64 {
        self.0.get(metric).copied().unwrap_or_default()
    }
}

type Formula = Box<dyn Fn(&Values) -> f64 + Send>;

/// Accumulator that fires once it holds one value for every field.
///
/// A repeated field overwrites the stored value, so the output always uses the
/// most recent reading regardless of arrival order. The output is stamped with
/// the newest input time.
pub struct StandardComputation {
    name: String,
    output: String,
    fields: Vec<String>,
    values: Values,
    timestamp: Option<DateTime<Utc>>,
    formula: Formula,
}

impl StandardComputation {
    pub fn new<F>(output: impl Into<String>, fields: &[&str], formula: F) -> Self
    where
        F: Fn(&Values) -> f64 + Send + 'static,
    {
        let output = output.into();
        Self {
            name: output.clone(),
            output,
            fields: fields.iter().map(|f| f.to_string()).collect(),
            values: Values::default(),
            timestamp: None,
            formula: Box::new(formula),
        }
    }
}

impl Computable for StandardComputation {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_metrics(&self) -> Vec<String> {
        self.fields.clone()
    }

    fn output_metric(&self) -> String {
        self.output.clone()
    }

    fn update(&mut self, point: &Datapoint) -> bool {
        if !self.fields.contains(&point.metric) {
            return false;
        }
        self.values.0.insert(point.metric.clone(), point.value);
        if self.timestamp.map_or(true, |t| point.time > t) {
            self.timestamp = Some(point.time);
        }
        self.values.0.len() >= self.fields.len()
    }

    fn compute(&mut self) -> Datapoint {
        let value = (self.formula)(&self.values);
        let time = self.timestamp.take().unwrap_or_else(Utc::now);
        self.values.0.clear();
        Datapoint::new(self.output.clone(), value, time)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    fn sum() -> StandardComputation {
        StandardComputation::new("Sum", &["A", "B"], |v| v.get("A") + v.get("B"))
    }

    #[test]
    fn test_not_ready_until_all_fields() {
        let mut c = sum();
        let mut clock = Clock::new();
        assert!(!c.update(&clock.point("A", 1.0)));
        assert!(!c.update(&clock.point("A", 2.0)));
        assert!(c.update(&clock.point("B", 3.0)));
        let out = c.compute();
        assert_eq!(out.metric, "Sum");
        assert_eq!(out.value, 5.0);
        assert_eq!(out.time, clock.0);
    }

    #[test]
    fn test_order_independent_and_resets() {
        let mut c = sum();
        let mut clock = Clock::new();
        let out = run(&mut c, vec![clock.point("B", 4.0), clock.point("A", 3.0)]);
        assert_eq!(out.value, 7.0);
        assert!(!c.update(&clock.point("A", 1.0)));
    }

    #[test]
    fn test_keeps_newest_timestamp() {
        let mut c = sum();
        let mut clock = Clock::new();
        let late = clock.point("A", 1.0);
        let early = Datapoint::new("B", 1.0, clock.ago(5));
        c.update(&late);
        assert!(c.update(&early));
        assert_eq!(c.compute().time, late.time);
    }

    #[test]
    fn test_ignores_unrelated_metric() {
        let mut c = sum();
        let mut clock = Clock::new();
        assert!(!c.update(&clock.point("A", 1.0)));
        assert!(!c.update(&clock.point("Other", 1.0)));
    }
}
