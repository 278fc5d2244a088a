//! Battery state-of-charge estimation
//!
//! A poll runs four composable steps:
//! 1. sample the pack voltage several times and take a trimmed mean
//! 2. compensate for sag under load using the measured current
//! 3. interpolate SOC from the calibration table
//! 4. update the rolling history used for trend/stability diagnostics
//!
//! A failed voltage read yields a 0% reading with the error attached; the
//! poller simply tries again on its next cycle.

pub mod calibration;
pub mod sampling;
pub mod trend;

use crate::config::BatteryConfig;
use crate::types::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use calibration::{BatteryCalibration, CalibrationPreset};
pub use trend::{Stability, Trend, VoltageHistory};

/// Source of pack voltage and current, typically an I2C power monitor
///
/// Both calls are synchronous and may fail independently.
pub trait BatterySensor: Send {
    /// Bus voltage in volts
    fn voltage(&mut self) -> Result<f64>;

    /// Current draw in milliamps (signed; sign convention is sensor specific)
    fn current_ma(&mut self) -> Result<f64>;
}

/// Coarse charge level for operator displays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatteryStatus {
    Good,
    Ok,
    Low,
    VeryLow,
    Critical,
}

impl BatteryStatus {
    pub fn from_percent(percent: f64) -> Self {
        if percent > 75.0 {
            BatteryStatus::Good
        } else if percent > 50.0 {
            BatteryStatus::Ok
        } else if percent > 25.0 {
            BatteryStatus::Low
        } else if percent > 10.0 {
            BatteryStatus::VeryLow
        } else {
            BatteryStatus::Critical
        }
    }
}

/// Result of one battery poll, including diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryReading {
    pub soc_percent: f64,
    pub voltage_raw: f64,
    pub voltage_compensated: f64,
    pub current_ma: Option<f64>,
    pub trend: Trend,
    pub stability: Stability,
    pub status: BatteryStatus,
    /// Set when the voltage could not be read
    pub error: Option<String>,
}

impl BatteryReading {
    fn failed(error: String) -> Self {
        Self {
            soc_percent: 0.0,
            voltage_raw: 0.0,
            voltage_compensated: 0.0,
            current_ma: None,
            trend: Trend::Unknown,
            stability: Stability::Unknown,
            status: BatteryStatus::Critical,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Maps noisy pack voltage (and optional current) to a bounded SOC percentage
#[derive(Debug, Clone)]
pub struct BatteryEstimator {
    calibration: BatteryCalibration,
    samples: usize,
    sample_delay: Duration,
    internal_resistance_ohms: f64,
    history: VoltageHistory,
}

impl BatteryEstimator {
    pub fn new(calibration: BatteryCalibration, config: &BatteryConfig) -> Self {
        Self {
            calibration,
            samples: config.samples,
            sample_delay: config.sample_delay(),
            internal_resistance_ohms: config.internal_resistance_ohms,
            history: VoltageHistory::new(config.history_len, config.trend_hysteresis_v),
        }
    }

    /// Build from configuration, validating the calibration table
    pub fn from_config(config: &BatteryConfig) -> Result<Self> {
        let calibration = config.calibration.build()?;
        Ok(Self::new(calibration, config))
    }

    pub fn calibration(&self) -> &BatteryCalibration {
        &self.calibration
    }

    /// Run one full poll against the sensor
    pub fn read(&mut self, sensor: &mut dyn BatterySensor) -> BatteryReading {
        let voltage = match sampling::sample_voltage(sensor, self.samples, self.sample_delay) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Battery voltage read failed: {}", e);
                return BatteryReading::failed(e.to_string());
            }
        };

        // Current is optional: without it we just skip compensation
        let current_ma = match sensor.current_ma() {
            Ok(c) => Some(c),
            Err(e) => {
                log::debug!("Battery current unavailable, skipping load compensation: {}", e);
                None
            }
        };

        self.estimate(voltage, current_ma)
    }

    /// Estimate from an already denoised voltage
    pub fn estimate(&mut self, voltage: f64, current_ma: Option<f64>) -> BatteryReading {
        let compensated = sampling::compensate_for_load(
            voltage,
            current_ma,
            self.internal_resistance_ohms,
            self.calibration.full_voltage(),
        );
        let soc = self.calibration.state_of_charge(compensated).clamp(0.0, 100.0);

        self.history.push(voltage);

        log::debug!(
            "Battery: {:.2}V raw, {:.2}V compensated, {:.1}%",
            voltage,
            compensated,
            soc
        );

        BatteryReading {
            soc_percent: soc,
            voltage_raw: voltage,
            voltage_compensated: compensated,
            current_ma,
            trend: self.history.trend(),
            stability: self.history.stability(),
            status: BatteryStatus::from_percent(soc),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TelemetryError;

    struct FixedSensor {
        voltage: Option<f64>,
        current_ma: Option<f64>,
    }

    impl BatterySensor for FixedSensor {
        fn voltage(&mut self) -> Result<f64> {
            self.voltage
                .ok_or_else(|| TelemetryError::SensorReadFailure("no response at 0x41".to_string()))
        }

        fn current_ma(&mut self) -> Result<f64> {
            self.current_ma
                .ok_or_else(|| TelemetryError::SensorReadFailure("current register".to_string()))
        }
    }

    fn estimator(calibration: CalibrationPreset) -> BatteryEstimator {
        let config = BatteryConfig {
            sample_delay_ms: 0,
            ..BatteryConfig::default()
        };
        BatteryEstimator::new(calibration.calibration(), &config)
    }

    #[test]
    fn test_reading_with_compensation() {
        let mut estimator = estimator(CalibrationPreset::TwoCellLiIon);
        let mut sensor = FixedSensor {
            voltage: Some(7.40),
            current_ma: Some(-800.0),
        };

        let reading = estimator.read(&mut sensor);
        assert!(reading.is_ok());
        // 0.8A * 0.1 Ohm = +0.08V -> 7.48V = 50%
        assert!((reading.voltage_compensated - 7.48).abs() < 1e-9);
        assert!((reading.soc_percent - 50.0).abs() < 1e-6);
        assert_eq!(reading.status, BatteryStatus::Low);
        assert_eq!(reading.trend, Trend::Unknown);
    }

    #[test]
    fn test_missing_current_skips_compensation() {
        let mut estimator = estimator(CalibrationPreset::ThreeCellLinear);
        let mut sensor = FixedSensor {
            voltage: Some(10.8),
            current_ma: None,
        };

        let reading = estimator.read(&mut sensor);
        assert_eq!(reading.current_ma, None);
        assert!((reading.soc_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_voltage_failure_yields_zero() {
        let mut estimator = estimator(CalibrationPreset::ThreeCellLinear);
        let mut sensor = FixedSensor {
            voltage: None,
            current_ma: Some(100.0),
        };

        let reading = estimator.read(&mut sensor);
        assert_eq!(reading.soc_percent, 0.0);
        assert!(!reading.is_ok());
        assert!(reading.error.unwrap().contains("0x41"));
    }

    #[test]
    fn test_history_feeds_trend() {
        let mut estimator = estimator(CalibrationPreset::ThreeCellLinear);
        for v in [12.0, 11.9, 11.8, 11.7] {
            estimator.estimate(v, None);
        }
        let reading = estimator.estimate(11.6, None);
        assert_eq!(reading.trend, Trend::Falling);
    }

    #[test]
    fn test_status_thresholds() {
        assert_eq!(BatteryStatus::from_percent(80.0), BatteryStatus::Good);
        assert_eq!(BatteryStatus::from_percent(75.0), BatteryStatus::Ok);
        assert_eq!(BatteryStatus::from_percent(30.0), BatteryStatus::Low);
        assert_eq!(BatteryStatus::from_percent(11.0), BatteryStatus::VeryLow);
        assert_eq!(BatteryStatus::from_percent(10.0), BatteryStatus::Critical);
    }
}
