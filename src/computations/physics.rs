use std::f64::consts::PI;

/// Motor radius in meters
pub const MOTOR_RADIUS_M: f64 = 0.278;

/// Linear speed in m/s from motor RPM
pub fn velocity_from_rpm(rpm: f64, radius: f64) -> f64 {
    rpm * PI * radius / 30.0
}

/// Fraction of bus power not dissipated in the pack resistance.
pub fn pack_efficiency(bus_current: f64, bus_power: f64, pack_resistance: f64) -> f64 {
    if bus_power == 0.0 {
        return 1.0;
    }
    let power_ratio = bus_current * bus_current * pack_resistance / bus_power.abs();
    (1.0 / (1.0 + power_ratio)).abs()
}

/// Least-squares slope of `y` against `x`. NaN when `x` has no spread.
pub fn least_squares_slope<'a>(samples: impl Iterator<Item = (&'a f64, &'a f64)> + Clone) -> f64 {
    let (mut n, mut sum_x, mut sum_y) = (0.0, 0.0, 0.0);
    for (x, y) in samples.clone() {
        n += 1.0;
        sum_x += x;
        sum_y += y;
    }
    let (mean_x, mean_y) = (sum_x / n, sum_y / n);

    let (mut covariance, mut variance) = (0.0, 0.0);
    for (x, y) in samples {
        covariance += (x - mean_x) * (y - mean_y);
        variance += (x - mean_x) * (x - mean_x);
    }
    covariance / variance
}

/// Linear interpolation through (x1, y1) and (x2, y2)
pub fn interpolate(x1: f64, x2: f64, y1: f64, y2: f64, x: f64) -> f64 {
    (y2 - y1) / (x2 - x1) * (x - x1) + y1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_velocity_from_rpm() {
        assert!((velocity_from_rpm(30.0, 1.0) - PI).abs() < 1e-12);
        assert_eq!(velocity_from_rpm(0.0, MOTOR_RADIUS_M), 0.0);
    }

    #[test]
    fn test_pack_efficiency() {
        assert_eq!(pack_efficiency(10.0, 0.0, 0.1), 1.0);
        // 6A through 0.1Ω dissipates 3.6W against 700W
        assert!((pack_efficiency(6.0, 700.0, 0.1) - 1.0 / (1.0 + 3.6 / 700.0)).abs() < 1e-12);
    }

    #[test]
    fn test_least_squares_slope() {
        let x = [0.0, 1.0, 2.0];
        let y = [1.0, 3.0, 5.0];
        assert!((least_squares_slope(x.iter().zip(y.iter())) - 2.0).abs() < 1e-12);

        let flat = [1.0, 1.0];
        assert!(least_squares_slope(flat.iter().zip(y.iter())).is_nan());
    }
}
