//! Configuration loading and parsing

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use vehicle_telemetry::{AcquisitionManager, TelemetryConfig};

/// Environment variable naming a bus channel to try first
pub const CAN_IFACE_ENV: &str = "CAN_IFACE";

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where recorded bus traffic comes from: `<dir>/<channel>.log`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplayConfig {
    #[serde(default = "default_replay_dir")]
    pub dir: PathBuf,
    /// Keep the logged frame spacing instead of replaying flat out
    #[serde(default = "default_true")]
    pub realtime: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            dir: default_replay_dir(),
            realtime: true,
        }
    }
}

fn default_replay_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

/// sysfs-style battery files (one number per file)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SensorConfig {
    pub voltage_path: Option<PathBuf>,
    pub current_path: Option<PathBuf>,
    /// Multiplier from file units to volts (default: µV)
    #[serde(default = "default_voltage_scale")]
    pub voltage_scale: f64,
    /// Multiplier from file units to milliamps (default: µA)
    #[serde(default = "default_current_scale")]
    pub current_scale: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            voltage_path: None,
            current_path: None,
            voltage_scale: default_voltage_scale(),
            current_scale: default_current_scale(),
        }
    }
}

fn default_voltage_scale() -> f64 {
    1e-6
}

fn default_current_scale() -> f64 {
    1e-3
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable lines
    Text,
}

impl AppConfig {
    /// Channel candidates: `CAN_IFACE`, then `--can`, then the configured
    /// channel, then the preferred order
    pub fn acquisition(&self, env_iface: Option<String>, flag: Option<String>) -> AcquisitionManager {
        let bus = &self.telemetry.bus;
        let mut manager = AcquisitionManager::new(bus.preferred.clone());
        for channel in [env_iface, flag, bus.channel.clone()].into_iter().flatten() {
            manager = manager.with_override(channel);
        }
        manager
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .telemetry
        .validate()
        .with_context(|| format!("Invalid telemetry settings in {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use vehicle_telemetry::{CalibrationPreset, CalibrationSource, FilterConfig};

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [telemetry.bus]
            channel = "vcan0"
            preferred = ["can1", "can0"]

            [telemetry.speed]
            scale_divisor = 10.0
            filter = { kind = "alpha_beta", alpha = 0.5, beta = 0.1 }

            [telemetry.battery]
            calibration = "2s-li-ion"

            [replay]
            dir = "traces"
            realtime = false

            [sensor]
            voltage_path = "/sys/class/power_supply/BAT0/voltage_now"

            [output]
            format = "text"
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.telemetry.bus.channel.as_deref(), Some("vcan0"));
        assert_eq!(config.telemetry.speed.scale_divisor, 10.0);
        assert_eq!(
            config.telemetry.speed.filter,
            FilterConfig::AlphaBeta { alpha: 0.5, beta: 0.1 }
        );
        assert_eq!(
            config.telemetry.battery.calibration,
            CalibrationSource::Preset(CalibrationPreset::TwoCellLiIon)
        );
        assert_eq!(config.replay.dir, PathBuf::from("traces"));
        assert!(!config.replay.realtime);
        assert_eq!(config.sensor.voltage_scale, 1e-6);
        assert!(config.sensor.current_path.is_none());
        assert_eq!(config.output.format, OutputFormat::Text);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.replay.realtime);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.telemetry, TelemetryConfig::default());
    }

    #[test]
    fn test_override_order() {
        let mut config = AppConfig::default();
        config.telemetry.bus.channel = Some("can1".to_string());

        let manager = config.acquisition(Some("vcan0".to_string()), Some("vcan1".to_string()));
        assert_eq!(manager.candidates(), vec!["vcan0", "vcan1", "can1", "can0"]);

        let manager = config.acquisition(None, None);
        assert_eq!(manager.candidates(), vec!["can1", "can0"]);
    }

    #[test]
    fn test_load_config_rejects_bad_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[telemetry.speed]\nscale_divisor = 0.0").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("scale_divisor"));
    }
}
