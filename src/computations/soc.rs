use std::cmp::Ordering;

use super::physics::interpolate;
use crate::core::{Computable, Datapoint};

const CURRENTS: [f64; 5] = [0.0, 36.0, 60.0, 120.0, 180.0];

/// Cell voltage per row of `CURRENTS`, ascending
const VOLTAGES: [[f64; 12]; 5] = [
    [2.50, 3.22, 3.45, 3.52, 3.58, 3.65, 3.75, 3.83, 3.95, 4.05, 4.15, 4.19],
    [2.50, 3.05, 3.30, 3.38, 3.45, 3.55, 3.65, 3.75, 3.85, 3.95, 4.08, 4.12],
    [2.50, 3.00, 3.22, 3.30, 3.40, 3.48, 3.58, 3.68, 3.78, 3.87, 4.00, 4.05],
    [2.50, 2.90, 3.10, 3.18, 3.25, 3.35, 3.45, 3.55, 3.65, 3.75, 3.87, 3.90],
    [2.50, 2.83, 3.00, 3.10, 3.18, 3.25, 3.33, 3.43, 3.52, 3.63, 3.83, 3.85],
];

/// Charge consumed (mAh) at each voltage of the matching `VOLTAGES` row
const CHARGE_CONSUMED: [[f64; 12]; 5] = [
    [2998.0, 2700.0, 2400.0, 2100.0, 1800.0, 1500.0, 1200.0, 900.0, 600.0, 300.0, 30.0, 0.0],
    [2886.0, 2700.0, 2400.0, 2100.0, 1800.0, 1500.0, 1200.0, 900.0, 600.0, 300.0, 30.0, 0.0],
    [2884.0, 2700.0, 2400.0, 2100.0, 1800.0, 1500.0, 1200.0, 900.0, 600.0, 300.0, 30.0, 0.0],
    [2855.0, 2700.0, 2400.0, 2100.0, 1800.0, 1500.0, 1200.0, 900.0, 600.0, 300.0, 30.0, 0.0],
    [2825.0, 2700.0, 2400.0, 2100.0, 1800.0, 1500.0, 1200.0, 900.0, 600.0, 300.0, 30.0, 0.0],
];

/// Indices of the entries bracketing `value` in ascending `table`; equal on
/// an exact hit or when `value` lies outside the table.
fn bracket(value: f64, table: &[f64]) -> (usize, usize) {
    match table.binary_search_by(|row| row.partial_cmp(&value).unwrap_or(Ordering::Less)) {
        Ok(i) => (i, i),
        Err(0) => (0, 0),
        Err(i) if i >= table.len() => (table.len() - 1, table.len() - 1),
        Err(i) => (i - 1, i),
    }
}

fn lerp_row(xs: &[f64], ys: &[f64], (lo, hi): (usize, usize), x: f64) -> f64 {
    if lo == hi {
        ys[lo]
    } else {
        interpolate(xs[lo], xs[hi], ys[lo], ys[hi], x)
    }
}

/// Fraction of charge remaining for a cell at `voltage` under `current` amps.
pub fn lookup_soc(voltage: f64, current: f64) -> f64 {
    let rows = bracket(current, &CURRENTS);
    let consumed_at = |row: usize| lerp_row(&VOLTAGES[row], &CHARGE_CONSUMED[row], bracket(voltage, &VOLTAGES[row]), voltage);
    let capacity_of = |row: usize| CHARGE_CONSUMED[row][0];

    let (consumed, capacity) = if rows.0 == rows.1 {
        (consumed_at(rows.0), capacity_of(rows.0))
    } else {
        let (lo, hi) = rows;
        (
            interpolate(CURRENTS[lo], CURRENTS[hi], consumed_at(lo), consumed_at(hi), current),
            interpolate(CURRENTS[lo], CURRENTS[hi], capacity_of(lo), capacity_of(hi), current),
        )
    };
    1.0 - consumed / capacity
}

/// Fires only when `Min_Voltage` updates and a `BMS_Current` is known, since
/// the voltage arrives far less often than the current.
#[derive(Default)]
pub struct StateOfCharge {
    voltage: Option<Datapoint>,
    current: Option<f64>,
}

impl StateOfCharge {
    pub const VOLTAGE_METRIC: &'static str = "Min_Voltage";
    pub const CURRENT_METRIC: &'static str = "BMS_Current";

    pub fn new() -> Self {
        Self::default()
    }
}

impl Computable for StateOfCharge {
    fn name(&self) -> &str {
        "SOC_Percentage"
    }

    fn required_metrics(&self) -> Vec<String> {
        vec![Self::VOLTAGE_METRIC.to_string(), Self::CURRENT_METRIC.to_string()]
    }

    fn output_metric(&self) -> String {
        "SOC_Percentage".to_string()
    }

    fn update(&mut self, point: &Datapoint) -> bool {
        match point.metric.as_str() {
            Self::VOLTAGE_METRIC => {
                self.voltage = Some(point.clone());
                self.current.is_some()
            }
            Self::CURRENT_METRIC => {
                self.current = Some(point.value);
                false
            }
            _ => false,
        }
    }

    fn compute(&mut self) -> Datapoint {
        let current = self.current.take().unwrap_or_default();
        match self.voltage.take() {
            Some(v) => Datapoint::new("SOC_Percentage", lookup_soc(v.value, current), v.time),
            None => Datapoint::now("SOC_Percentage", f64::NAN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::standard::test_support::*;
    use super::*;

    #[test]
    fn test_empty_at_cutoff_voltage() {
        for current in [0.0, 10.0, 36.0, 90.0, 180.0, 250.0] {
            assert_close(lookup_soc(2.5, current), 0.0);
        }
    }

    #[test]
    fn test_full_at_top_of_table() {
        assert_close(lookup_soc(4.19, 0.0), 1.0);
        assert_close(lookup_soc(4.3, 0.0), 1.0);
    }

    #[test]
    fn test_interpolates_between_entries() {
        // halfway between 3.75V (1200 consumed) and 3.83V (900 consumed) at 0A
        assert_close(lookup_soc(3.79, 0.0), 1.0 - 1050.0 / 2998.0);
    }

    #[test]
    fn test_bracket() {
        assert_eq!(bracket(36.0, &CURRENTS), (1, 1));
        assert_eq!(bracket(40.0, &CURRENTS), (1, 2));
        assert_eq!(bracket(-5.0, &CURRENTS), (0, 0));
        assert_eq!(bracket(500.0, &CURRENTS), (4, 4));
    }

    #[test]
    fn test_fires_on_voltage_only() {
        let mut soc = StateOfCharge::new();
        let mut clock = Clock::new();
        assert!(!soc.update(&clock.point("Min_Voltage", 3.0)));
        assert!(!soc.update(&clock.point("BMS_Current", 0.0)));
        assert!(!soc.update(&clock.point("BMS_Current", 0.0)));
        let out = run(&mut soc, vec![clock.point("Min_Voltage", 4.19)]);
        assert_eq!(out.metric, "SOC_Percentage");
        assert_close(out.value, 1.0);
        assert_eq!(out.time, clock.0);

        // the consumed current must be refreshed before the next cycle
        assert!(!soc.update(&clock.point("Min_Voltage", 4.19)));
    }
}
