//! Telemetry configuration types
//!
//! Every tunable of the estimator lives here: bus acquisition, the speed filter
//! and its publication policy, and the battery pipeline. All fields have serde
//! defaults so a partial TOML/JSON document is enough.

use crate::battery::calibration::{BatteryCalibration, CalibrationPreset};
use crate::types::{Result, TelemetryError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the whole telemetry core
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub speed: SpeedConfig,
    #[serde(default)]
    pub battery: BatteryConfig,
}

/// Field-bus acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusConfig {
    /// Explicit channel override, tried before the preferred list
    #[serde(default)]
    pub channel: Option<String>,

    /// Channels tried in order after any override
    #[serde(default = "default_preferred_channels")]
    pub preferred: Vec<String>,

    /// Blocking read timeout in milliseconds (default: 1000ms)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Pause after a failed read in milliseconds (default: 250ms)
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u64,
}

/// Speed filter selection and tuning
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterConfig {
    /// Alpha-beta filter on (speed, acceleration)
    AlphaBeta {
        /// Measurement trust, in (0, 1)
        #[serde(default = "default_alpha")]
        alpha: f64,
        /// Acceleration correction gain
        #[serde(default = "default_beta")]
        beta: f64,
    },
    /// Two-state Kalman filter on (speed, acceleration)
    Kalman {
        #[serde(default = "default_process_variance")]
        process_variance: f64,
        #[serde(default = "default_measurement_variance")]
        measurement_variance: f64,
        #[serde(default = "default_initial_covariance")]
        initial_covariance: f64,
    },
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig::Kalman {
            process_variance: default_process_variance(),
            measurement_variance: default_measurement_variance(),
            initial_covariance: default_initial_covariance(),
        }
    }
}

/// Speed estimation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeedConfig {
    #[serde(default)]
    pub filter: FilterConfig,

    /// Sample period assumed when no interval can be measured (seconds)
    #[serde(default = "default_nominal_dt")]
    pub nominal_dt_s: f64,

    /// Silence after which the estimate is forced to zero (default: 500ms)
    #[serde(default = "default_stale_after")]
    pub stale_after_ms: u64,

    /// Minimum change worth publishing
    #[serde(default = "default_speed_epsilon")]
    pub epsilon: f64,

    /// Raw value is divided by this before filtering (firmware dependent: 1, 10, 100)
    #[serde(default = "default_scale_divisor")]
    pub scale_divisor: f64,

    /// Unit label for the scaled value, for display only
    #[serde(default = "default_speed_units")]
    pub units: String,
}

/// Battery estimation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatteryConfig {
    /// Preset name or explicit (voltage, percent) breakpoints
    #[serde(default)]
    pub calibration: CalibrationSource,

    /// Voltage samples per poll
    #[serde(default = "default_samples")]
    pub samples: usize,

    /// Delay between samples of one poll in milliseconds
    #[serde(default = "default_sample_delay")]
    pub sample_delay_ms: u64,

    /// Pack internal resistance used for load compensation
    #[serde(default = "default_internal_resistance")]
    pub internal_resistance_ohms: f64,

    /// Interval between polls in milliseconds (default: 1000ms)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Minimum percentage change worth publishing
    #[serde(default = "default_battery_epsilon")]
    pub epsilon: f64,

    /// Rolling voltage history length for trend detection
    #[serde(default = "default_history_len")]
    pub history_len: usize,

    /// Dead band for trend classification in volts
    #[serde(default = "default_trend_hysteresis")]
    pub trend_hysteresis_v: f64,
}

/// Where the SOC lookup table comes from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CalibrationSource {
    Preset(CalibrationPreset),
    Table(Vec<(f64, f64)>),
}

impl Default for CalibrationSource {
    fn default() -> Self {
        CalibrationSource::Preset(CalibrationPreset::ThreeCellLinear)
    }
}

impl CalibrationSource {
    /// Build the validated calibration table
    pub fn build(&self) -> Result<BatteryCalibration> {
        match self {
            CalibrationSource::Preset(preset) => Ok(preset.calibration()),
            CalibrationSource::Table(points) => BatteryCalibration::new(points.clone()),
        }
    }
}

fn default_preferred_channels() -> Vec<String> {
    vec!["can0".to_string(), "can1".to_string()]
}

fn default_read_timeout() -> u64 {
    1000
}

fn default_error_backoff() -> u64 {
    250
}

fn default_alpha() -> f64 {
    0.40
}

fn default_beta() -> f64 {
    0.07
}

fn default_process_variance() -> f64 {
    4.0
}

fn default_measurement_variance() -> f64 {
    3.0
}

fn default_initial_covariance() -> f64 {
    100.0
}

fn default_nominal_dt() -> f64 {
    0.05
}

fn default_stale_after() -> u64 {
    500
}

fn default_speed_epsilon() -> f64 {
    0.1
}

fn default_scale_divisor() -> f64 {
    1.0
}

fn default_speed_units() -> String {
    "cm/s".to_string()
}

fn default_samples() -> usize {
    5
}

fn default_sample_delay() -> u64 {
    10
}

fn default_internal_resistance() -> f64 {
    0.10
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_battery_epsilon() -> f64 {
    0.1
}

fn default_history_len() -> usize {
    10
}

fn default_trend_hysteresis() -> f64 {
    0.02
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel: None,
            preferred: default_preferred_channels(),
            read_timeout_ms: default_read_timeout(),
            error_backoff_ms: default_error_backoff(),
        }
    }
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            nominal_dt_s: default_nominal_dt(),
            stale_after_ms: default_stale_after(),
            epsilon: default_speed_epsilon(),
            scale_divisor: default_scale_divisor(),
            units: default_speed_units(),
        }
    }
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            calibration: CalibrationSource::default(),
            samples: default_samples(),
            sample_delay_ms: default_sample_delay(),
            internal_resistance_ohms: default_internal_resistance(),
            poll_interval_ms: default_poll_interval(),
            epsilon: default_battery_epsilon(),
            history_len: default_history_len(),
            trend_hysteresis_v: default_trend_hysteresis(),
        }
    }
}

impl BusConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl SpeedConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

impl BatteryConfig {
    pub fn sample_delay(&self) -> Duration {
        Duration::from_millis(self.sample_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl TelemetryConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the explicit channel override
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.bus.channel = Some(channel.into());
        self
    }

    /// Builder method: replace the preferred channel order
    pub fn with_preferred_channels(mut self, channels: Vec<String>) -> Self {
        self.bus.preferred = channels;
        self
    }

    /// Builder method: set the bus read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.bus.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder method: select the speed filter
    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.speed.filter = filter;
        self
    }

    /// Builder method: set the staleness window
    pub fn with_stale_after(mut self, window: Duration) -> Self {
        self.speed.stale_after_ms = window.as_millis() as u64;
        self
    }

    /// Builder method: set the raw speed divisor
    pub fn with_speed_scale(mut self, divisor: f64) -> Self {
        self.speed.scale_divisor = divisor;
        self
    }

    /// Builder method: set the battery calibration
    pub fn with_calibration(mut self, calibration: CalibrationSource) -> Self {
        self.battery.calibration = calibration;
        self
    }

    /// Builder method: set samples per battery poll and their spacing
    pub fn with_battery_sampling(mut self, samples: usize, delay: Duration) -> Self {
        self.battery.samples = samples;
        self.battery.sample_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Builder method: set the battery poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.battery.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Check every tunable for a usable value
    pub fn validate(&self) -> Result<()> {
        if self.bus.read_timeout_ms == 0 {
            return Err(invalid("bus.read_timeout_ms must be positive"));
        }

        match self.speed.filter {
            FilterConfig::AlphaBeta { alpha, beta } => {
                if !(alpha > 0.0 && alpha < 1.0) {
                    return Err(invalid(format!("speed.filter.alpha must be in (0, 1), got {}", alpha)));
                }
                if !(beta >= 0.0 && beta.is_finite()) {
                    return Err(invalid(format!("speed.filter.beta must be non-negative, got {}", beta)));
                }
            }
            FilterConfig::Kalman {
                process_variance,
                measurement_variance,
                initial_covariance,
            } => {
                for (name, value) in [
                    ("process_variance", process_variance),
                    ("measurement_variance", measurement_variance),
                    ("initial_covariance", initial_covariance),
                ] {
                    if !(value > 0.0 && value.is_finite()) {
                        return Err(invalid(format!("speed.filter.{} must be positive, got {}", name, value)));
                    }
                }
            }
        }

        if !(self.speed.nominal_dt_s > 0.0 && self.speed.nominal_dt_s.is_finite()) {
            return Err(invalid("speed.nominal_dt_s must be positive"));
        }
        if self.speed.stale_after_ms == 0 {
            return Err(invalid("speed.stale_after_ms must be positive"));
        }
        if !(self.speed.epsilon >= 0.0) {
            return Err(invalid("speed.epsilon must be non-negative"));
        }
        if !(self.speed.scale_divisor > 0.0 && self.speed.scale_divisor.is_finite()) {
            return Err(invalid("speed.scale_divisor must be positive"));
        }

        self.battery.calibration.build()?;
        if self.battery.samples == 0 {
            return Err(invalid("battery.samples must be at least 1"));
        }
        if !(self.battery.internal_resistance_ohms >= 0.0) {
            return Err(invalid("battery.internal_resistance_ohms must be non-negative"));
        }
        if self.battery.poll_interval_ms == 0 {
            return Err(invalid("battery.poll_interval_ms must be positive"));
        }
        if !(self.battery.epsilon >= 0.0) {
            return Err(invalid("battery.epsilon must be non-negative"));
        }
        if self.battery.history_len < 2 {
            return Err(invalid("battery.history_len must be at least 2"));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> TelemetryError {
    TelemetryError::InvalidConfig(message.into())
}
