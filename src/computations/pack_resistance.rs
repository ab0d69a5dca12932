use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use super::physics::least_squares_slope;
use crate::core::{Computable, Datapoint, CONNECTION_STATUS_METRIC};

pub const MAX_SAMPLES: usize = 4096;

/// Bus voltage below this is a dead or missing reading
const VOLTAGE_FLOOR: f64 = 1.0;

/// Pack resistance as `-dV/dI`, the least-squares slope over paired
/// (current, voltage) samples.
///
/// Voltage and current arrive on separate metrics and are paired in arrival
/// order; a reading that would leave one side two ahead is discarded. A
/// voltage under the floor drops itself and the next current. Once the window
/// holds `MAX_SAMPLES` pairs the oldest pair is evicted after each output.
pub struct PackResistance {
    voltage_metric: String,
    current_metric: String,
    voltages: VecDeque<f64>,
    currents: VecDeque<f64>,
    reject_current: bool,
    time: Option<DateTime<Utc>>,
}

impl PackResistance {
    pub fn new() -> Self {
        Self {
            voltage_metric: "Average_Bus_Voltage".to_string(),
            current_metric: "BMS_Current".to_string(),
            voltages: VecDeque::with_capacity(MAX_SAMPLES),
            currents: VecDeque::with_capacity(MAX_SAMPLES),
            reject_current: false,
            time: None,
        }
    }

    pub fn len(&self) -> usize {
        self.voltages.len().min(self.currents.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reset(&mut self) {
        self.voltages.clear();
        self.currents.clear();
        self.reject_current = false;
    }
}

impl Default for PackResistance {
    fn default() -> Self {
        Self::new()
    }
}

impl Computable for PackResistance {
    fn name(&self) -> &str {
        "Pack_Resistance"
    }

    fn required_metrics(&self) -> Vec<String> {
        vec![
            self.voltage_metric.clone(),
            self.current_metric.clone(),
            CONNECTION_STATUS_METRIC.to_string(),
        ]
    }

    fn output_metric(&self) -> String {
        "Pack_Resistance".to_string()
    }

    fn update(&mut self, point: &Datapoint) -> bool {
        if point.metric == CONNECTION_STATUS_METRIC {
            if point.is_disconnect() {
                self.reset();
            }
            return false;
        }

        if point.metric == self.voltage_metric {
            self.reject_current = point.value < VOLTAGE_FLOOR;
            if self.reject_current || self.currents.len() < self.voltages.len() {
                return false;
            }
            self.voltages.push_back(point.value);
        } else if point.metric == self.current_metric {
            if self.reject_current || self.voltages.len() < self.currents.len() {
                return false;
            }
            self.currents.push_back(point.value);
        } else {
            return false;
        }

        self.time = Some(point.time);
        self.currents.len() > 1 && self.currents.len() == self.voltages.len()
    }

    fn compute(&mut self) -> Datapoint {
        let slope = least_squares_slope(self.currents.iter().zip(self.voltages.iter()));
        if self.currents.len() >= MAX_SAMPLES {
            self.currents.pop_front();
            self.voltages.pop_front();
        }
        Datapoint::new("Pack_Resistance", -slope, self.time.unwrap_or_else(Utc::now))
    }
}
