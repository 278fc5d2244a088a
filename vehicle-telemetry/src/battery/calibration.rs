//! Voltage to state-of-charge lookup tables

use crate::types::{Result, TelemetryError};
use serde::{Deserialize, Serialize};

/// Built-in discharge curves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationPreset {
    /// 3S Li-ion treated as linear between 9.0V (empty) and 12.6V (full)
    #[serde(rename = "3s-linear")]
    ThreeCellLinear,
    /// 2S Li-ion (7.4V nominal) measured discharge curve
    #[serde(rename = "2s-li-ion")]
    TwoCellLiIon,
}

/// 2S pack, per-cell 4.20V down to the 3.00V cutoff
const TWO_CELL_LI_ION: [(f64, f64); 23] = [
    (8.40, 100.0),
    (8.30, 95.0),
    (8.20, 90.0),
    (8.10, 85.0),
    (8.00, 80.0),
    (7.90, 75.0),
    (7.80, 70.0),
    (7.72, 65.0),
    (7.64, 60.0),
    (7.56, 55.0),
    (7.48, 50.0),
    (7.40, 45.0),
    (7.32, 40.0),
    (7.24, 35.0),
    (7.16, 30.0),
    (7.08, 25.0),
    (7.00, 20.0),
    (6.90, 15.0),
    (6.80, 10.0),
    (6.70, 5.0),
    (6.60, 2.0),
    (6.50, 1.0),
    (6.00, 0.0),
];

const THREE_CELL_LINEAR: [(f64, f64); 2] = [(12.6, 100.0), (9.0, 0.0)];

impl CalibrationPreset {
    pub fn calibration(self) -> BatteryCalibration {
        let points = match self {
            CalibrationPreset::ThreeCellLinear => THREE_CELL_LINEAR.to_vec(),
            CalibrationPreset::TwoCellLiIon => TWO_CELL_LI_ION.to_vec(),
        };
        BatteryCalibration { points }
    }
}

/// Ordered (voltage, SOC%) breakpoints, strictly decreasing in voltage
///
/// The first point is full charge (100%), the last is cutoff (0%).
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryCalibration {
    points: Vec<(f64, f64)>,
}

impl BatteryCalibration {
    /// Validate and wrap a breakpoint table
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self> {
        if points.len() < 2 {
            return Err(TelemetryError::InvalidConfig(format!(
                "calibration needs at least 2 breakpoints, got {}",
                points.len()
            )));
        }

        for pair in points.windows(2) {
            let (v_high, soc_high) = pair[0];
            let (v_low, soc_low) = pair[1];
            if !(v_high > v_low) {
                return Err(TelemetryError::InvalidConfig(format!(
                    "calibration voltages must strictly decrease ({} then {})",
                    v_high, v_low
                )));
            }
            if soc_low > soc_high {
                return Err(TelemetryError::InvalidConfig(format!(
                    "calibration SOC must not increase as voltage drops ({}% at {}V, {}% at {}V)",
                    soc_high, v_high, soc_low, v_low
                )));
            }
        }

        let first = points[0].1;
        let last = points[points.len() - 1].1;
        if first != 100.0 || last != 0.0 {
            return Err(TelemetryError::InvalidConfig(format!(
                "calibration must run from 100% to 0%, got {}% to {}%",
                first, last
            )));
        }

        Ok(Self { points })
    }

    /// Rated full-charge voltage (first breakpoint)
    pub fn full_voltage(&self) -> f64 {
        self.points[0].0
    }

    /// Cutoff voltage (last breakpoint)
    pub fn cutoff_voltage(&self) -> f64 {
        self.points[self.points.len() - 1].0
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Linear interpolation between the bracketing breakpoints
    ///
    /// Saturates to 100 at or above the first breakpoint and to 0 at or below
    /// the last.
    pub fn state_of_charge(&self, voltage: f64) -> f64 {
        if voltage >= self.full_voltage() {
            return 100.0;
        }
        if voltage <= self.cutoff_voltage() || voltage.is_nan() {
            return 0.0;
        }

        for pair in self.points.windows(2) {
            let (v_high, soc_high) = pair[0];
            let (v_low, soc_low) = pair[1];
            if voltage >= v_low && voltage <= v_high {
                let ratio = (voltage - v_low) / (v_high - v_low);
                return soc_low + ratio * (soc_high - soc_low);
            }
        }

        // Unreachable for a validated table
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_linear_midpoint() {
        let calibration = BatteryCalibration::new(vec![(12.6, 100.0), (9.0, 0.0)]).unwrap();
        assert!((calibration.state_of_charge(10.8) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_saturation() {
        let calibration = CalibrationPreset::ThreeCellLinear.calibration();
        assert_eq!(calibration.state_of_charge(12.6), 100.0);
        assert_eq!(calibration.state_of_charge(13.1), 100.0);
        assert_eq!(calibration.state_of_charge(9.0), 0.0);
        assert_eq!(calibration.state_of_charge(4.2), 0.0);
    }

    #[test]
    fn test_two_cell_curve() {
        let calibration = CalibrationPreset::TwoCellLiIon.calibration();
        assert!((calibration.state_of_charge(7.48) - 50.0).abs() < 1e-9);
        // Halfway between 7.40V (45%) and 7.48V (50%)
        assert!((calibration.state_of_charge(7.44) - 47.5).abs() < 1e-6);
        assert!((calibration.state_of_charge(6.25) - 0.5).abs() < 1e-6);
        assert!(BatteryCalibration::new(TWO_CELL_LI_ION.to_vec()).is_ok());
    }

    #[test]
    fn test_rejects_invalid_tables() {
        assert!(BatteryCalibration::new(vec![(12.6, 100.0)]).is_err());
        assert!(BatteryCalibration::new(vec![(9.0, 0.0), (12.6, 100.0)]).is_err());
        assert!(BatteryCalibration::new(vec![(12.6, 100.0), (12.6, 50.0), (9.0, 0.0)]).is_err());
        assert!(BatteryCalibration::new(vec![(12.6, 90.0), (9.0, 0.0)]).is_err());
        assert!(BatteryCalibration::new(vec![(12.6, 100.0), (10.0, 20.0), (11.0, 30.0), (9.0, 0.0)]).is_err());
    }

    proptest! {
        #[test]
        fn prop_soc_is_bounded_and_monotonic(a in 5.0f64..9.0, b in 5.0f64..9.0) {
            let calibration = CalibrationPreset::TwoCellLiIon.calibration();
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            let soc_low = calibration.state_of_charge(low);
            let soc_high = calibration.state_of_charge(high);
            prop_assert!((0.0..=100.0).contains(&soc_low));
            prop_assert!((0.0..=100.0).contains(&soc_high));
            prop_assert!(soc_low <= soc_high + 1e-9);
        }
    }
}
