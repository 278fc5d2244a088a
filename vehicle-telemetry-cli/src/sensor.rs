//! Battery sensor backed by sysfs-style files
//!
//! Linux power-supply drivers expose `voltage_now` (µV) and `current_now` (µA)
//! as single integers. Any file holding one number works, so a test rig can
//! point these at plain files it rewrites.

use crate::config::SensorConfig;
use std::fs;
use std::path::{Path, PathBuf};
use vehicle_telemetry::{BatterySensor, Result, TelemetryError};

#[derive(Debug, Clone)]
pub struct FileBatterySensor {
    voltage_path: PathBuf,
    current_path: Option<PathBuf>,
    voltage_scale: f64,
    current_scale: f64,
}

impl FileBatterySensor {
    /// `None` when no voltage file is configured
    pub fn from_config(config: &SensorConfig) -> Option<Self> {
        let voltage_path = config.voltage_path.clone()?;
        Some(Self {
            voltage_path,
            current_path: config.current_path.clone(),
            voltage_scale: config.voltage_scale,
            current_scale: config.current_scale,
        })
    }
}

impl BatterySensor for FileBatterySensor {
    fn voltage(&mut self) -> Result<f64> {
        Ok(read_number(&self.voltage_path)? * self.voltage_scale)
    }

    fn current_ma(&mut self) -> Result<f64> {
        let path = self.current_path.as_ref().ok_or_else(|| {
            TelemetryError::SensorReadFailure("no current file configured".to_string())
        })?;
        Ok(read_number(path)? * self.current_scale)
    }
}

fn read_number(path: &Path) -> Result<f64> {
    let text = fs::read_to_string(path)
        .map_err(|e| TelemetryError::SensorReadFailure(format!("{:?}: {}", path, e)))?;
    text.trim()
        .parse::<f64>()
        .map_err(|e| TelemetryError::SensorReadFailure(format!("{:?}: {} ({:?})", path, e, text.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_scaled_values() {
        let dir = tempfile::tempdir().unwrap();
        let voltage = dir.path().join("voltage_now");
        let current = dir.path().join("current_now");
        fs::write(&voltage, "10800000\n").unwrap();
        fs::write(&current, "-1500000\n").unwrap();

        let config = SensorConfig {
            voltage_path: Some(voltage),
            current_path: Some(current),
            ..SensorConfig::default()
        };
        let mut sensor = FileBatterySensor::from_config(&config).unwrap();

        assert!((sensor.voltage().unwrap() - 10.8).abs() < 1e-9);
        assert!((sensor.current_ma().unwrap() + 1500.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_or_garbled_files() {
        assert!(FileBatterySensor::from_config(&SensorConfig::default()).is_none());

        let dir = tempfile::tempdir().unwrap();
        let voltage = dir.path().join("voltage_now");
        fs::write(&voltage, "n/a").unwrap();

        let config = SensorConfig {
            voltage_path: Some(voltage),
            ..SensorConfig::default()
        };
        let mut sensor = FileBatterySensor::from_config(&config).unwrap();

        assert!(matches!(sensor.voltage(), Err(TelemetryError::SensorReadFailure(_))));
        assert!(matches!(sensor.current_ma(), Err(TelemetryError::SensorReadFailure(_))));
    }
}
