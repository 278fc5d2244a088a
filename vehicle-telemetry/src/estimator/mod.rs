//! Speed estimation
//!
//! Converts an irregular stream of noisy speed measurements into a smooth,
//! non-negative estimate. The filtering strategy is pluggable through the
//! [`SpeedFilter`] trait; [`SpeedEstimator`] adds everything around it:
//! scaling, sample-spacing measurement, and the staleness timeout.

pub mod alpha_beta;
pub mod kalman;

use crate::config::{FilterConfig, SpeedConfig};
use crate::types::{Result, SpeedMeasurement, TelemetryError};
use std::fmt;
use std::time::{Duration, Instant};

pub use alpha_beta::AlphaBetaFilter;
pub use kalman::KalmanSpeedFilter;

/// A recursive speed filter
///
/// Implementations own their internal state exclusively; it is only ever
/// touched through `update` and `reset`.
pub trait SpeedFilter: Send + fmt::Debug {
    /// Feed one measurement taken `dt` seconds after the previous one.
    /// Returns the new estimate, never negative.
    fn update(&mut self, measurement: f64, dt: f64) -> f64;

    /// Forget all history and return to rest
    fn reset(&mut self);

    fn name(&self) -> &'static str;
}

/// Build the filter selected by configuration
pub fn build_filter(filter: &FilterConfig, nominal_dt: f64) -> Box<dyn SpeedFilter> {
    match *filter {
        FilterConfig::AlphaBeta { alpha, beta } => Box::new(AlphaBetaFilter::new(alpha, beta)),
        FilterConfig::Kalman {
            process_variance,
            measurement_variance,
            initial_covariance,
        } => Box::new(KalmanSpeedFilter::new(
            nominal_dt,
            process_variance,
            measurement_variance,
            initial_covariance,
        )),
    }
}

/// Speed filter plus the timing policy around it
#[derive(Debug)]
pub struct SpeedEstimator {
    filter: Box<dyn SpeedFilter>,
    nominal_dt: f64,
    stale_after: Duration,
    scale_divisor: f64,
    last_measurement: Option<Instant>,
    estimate: f64,
}

impl SpeedEstimator {
    pub fn new(filter: Box<dyn SpeedFilter>, config: &SpeedConfig) -> Self {
        Self {
            filter,
            nominal_dt: config.nominal_dt_s,
            stale_after: config.stale_after(),
            scale_divisor: config.scale_divisor,
            last_measurement: None,
            estimate: 0.0,
        }
    }

    /// Build the configured filter and wrap it
    ///
    /// Rejects timing and scale values the update path would divide by.
    pub fn from_config(config: &SpeedConfig) -> Result<Self> {
        if !(config.nominal_dt_s > 0.0 && config.nominal_dt_s.is_finite()) {
            return Err(TelemetryError::InvalidConfig(format!(
                "speed.nominal_dt_s must be positive, got {}",
                config.nominal_dt_s
            )));
        }
        if !(config.scale_divisor > 0.0 && config.scale_divisor.is_finite()) {
            return Err(TelemetryError::InvalidConfig(format!(
                "speed.scale_divisor must be positive, got {}",
                config.scale_divisor
            )));
        }

        let filter = build_filter(&config.filter, config.nominal_dt_s);
        log::debug!("Speed estimator using {} filter", filter.name());
        Ok(Self::new(filter, config))
    }

    pub fn filter_name(&self) -> &'static str {
        self.filter.name()
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Feed one raw measurement and return the updated estimate
    ///
    /// The raw value is scaled first. The sample spacing comes from the
    /// measurement timestamps; the first sample, a non-positive spacing, or the
    /// first sample after a stale gap uses the nominal period instead. A stale
    /// gap also resets the filter so old acceleration does not leak in.
    pub fn update(&mut self, measurement: SpeedMeasurement) -> f64 {
        let value = (measurement.value / self.scale_divisor).max(0.0);

        let dt = match self.last_measurement {
            Some(previous) => {
                let gap = measurement.timestamp.saturating_duration_since(previous);
                if gap > self.stale_after {
                    log::debug!("Speed stream resumed after {:?}, resetting filter", gap);
                    self.filter.reset();
                    self.nominal_dt
                } else {
                    let dt = gap.as_secs_f64();
                    if dt > 0.0 && dt.is_finite() {
                        dt
                    } else {
                        self.nominal_dt
                    }
                }
            }
            None => self.nominal_dt,
        };

        self.last_measurement = Some(measurement.timestamp);
        self.estimate = self.filter.update(value, dt).max(0.0);

        log::trace!(
            "Speed raw={:.1} scaled={:.2} dt={:.4} filtered={:.2}",
            measurement.value,
            value,
            dt,
            self.estimate
        );
        self.estimate
    }

    /// True when no measurement has arrived within the staleness window
    pub fn is_stale(&self, now: Instant) -> bool {
        match self.last_measurement {
            Some(last) => now.saturating_duration_since(last) > self.stale_after,
            None => true,
        }
    }

    /// The estimate as of `now`: exactly zero once the stream has gone quiet,
    /// whatever the filter last produced.
    pub fn current(&self, now: Instant) -> f64 {
        if self.is_stale(now) {
            0.0
        } else {
            self.estimate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn alpha_beta_config() -> SpeedConfig {
        SpeedConfig {
            filter: FilterConfig::AlphaBeta { alpha: 0.4, beta: 0.07 },
            ..SpeedConfig::default()
        }
    }

    fn measurement(value: f64, timestamp: Instant) -> SpeedMeasurement {
        SpeedMeasurement { value, timestamp }
    }

    #[test]
    fn test_first_update_uses_nominal_dt() {
        let mut estimator = SpeedEstimator::from_config(&alpha_beta_config()).unwrap();
        let t0 = Instant::now();
        let v = estimator.update(measurement(1234.0, t0));
        assert!((v - 493.6).abs() < 1e-9);
        assert_eq!(estimator.current(t0), v);
        assert_eq!(estimator.filter_name(), "alpha-beta");
    }

    #[test]
    fn test_scale_divisor_applies_before_filtering() {
        let config = SpeedConfig {
            scale_divisor: 10.0,
            ..alpha_beta_config()
        };
        let mut estimator = SpeedEstimator::from_config(&config).unwrap();
        let v = estimator.update(measurement(1234.0, Instant::now()));
        assert!((v - 49.36).abs() < 1e-9);
    }

    #[test]
    fn test_stale_forces_zero() {
        let mut estimator = SpeedEstimator::from_config(&alpha_beta_config()).unwrap();
        let t0 = Instant::now();
        estimator.update(measurement(500.0, t0));

        assert!(estimator.current(t0 + Duration::from_millis(400)) > 0.0);
        assert!(!estimator.is_stale(t0 + Duration::from_millis(500)));
        assert_eq!(estimator.current(t0 + Duration::from_millis(501)), 0.0);
    }

    #[test]
    fn test_from_config_rejects_bad_timing() {
        let zero_dt = SpeedConfig {
            nominal_dt_s: 0.0,
            ..alpha_beta_config()
        };
        assert!(matches!(
            SpeedEstimator::from_config(&zero_dt),
            Err(TelemetryError::InvalidConfig(_))
        ));

        let nan_scale = SpeedConfig {
            scale_divisor: f64::NAN,
            ..alpha_beta_config()
        };
        assert!(matches!(
            SpeedEstimator::from_config(&nan_scale),
            Err(TelemetryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_never_measured_is_zero() {
        let estimator = SpeedEstimator::from_config(&SpeedConfig::default()).unwrap();
        assert!(estimator.is_stale(Instant::now()));
        assert_eq!(estimator.current(Instant::now()), 0.0);
        assert_eq!(estimator.filter_name(), "kalman");
    }

    #[test]
    fn test_resume_after_stale_resets_filter() {
        let mut estimator = SpeedEstimator::from_config(&alpha_beta_config()).unwrap();
        let t0 = Instant::now();
        for i in 0..20 {
            estimator.update(measurement(800.0, t0 + Duration::from_millis(50 * i)));
        }

        // Long silence, then a new stream starting at 100
        let resumed = t0 + Duration::from_secs(5);
        let v = estimator.update(measurement(100.0, resumed));
        assert!((v - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_measured_dt_is_used() {
        let mut estimator = SpeedEstimator::from_config(&alpha_beta_config()).unwrap();
        let mut reference = AlphaBetaFilter::new(0.4, 0.07);
        let t0 = Instant::now();

        estimator.update(measurement(100.0, t0));
        reference.update(100.0, 0.05);

        let v = estimator.update(measurement(120.0, t0 + Duration::from_millis(100)));
        let expected = reference.update(120.0, 0.1);
        assert!((v - expected).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_estimate_never_negative(
            values in proptest::collection::vec(0.0f64..5000.0, 1..80),
            gaps in proptest::collection::vec(0u64..800, 80),
            kalman in any::<bool>(),
        ) {
            let config = if kalman { SpeedConfig::default() } else { alpha_beta_config() };
            let mut estimator = SpeedEstimator::from_config(&config).unwrap();
            let mut t = Instant::now();
            for (value, gap) in values.iter().zip(gaps.iter()) {
                t += Duration::from_millis(*gap);
                let v = estimator.update(measurement(*value, t));
                prop_assert!(v >= 0.0);
                prop_assert!(estimator.current(t) >= 0.0);
            }
        }
    }
}
