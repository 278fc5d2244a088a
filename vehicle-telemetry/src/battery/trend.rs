//! Rolling voltage history for trend and stability diagnostics

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Fewer samples than this cannot show a trend
const MIN_TREND_SAMPLES: usize = 4;

/// Standard deviation below which the pack reads as stable (volts)
const STABLE_STD_DEV: f64 = 0.02;

/// Standard deviation below which the pack reads as fluctuating (volts)
const FLUCTUATING_STD_DEV: f64 = 0.10;

/// Direction of recent voltage movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Unknown,
    Rising,
    Falling,
    Stable,
}

/// Spread of recent voltages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    Unknown,
    Stable,
    Fluctuating,
    Unstable,
}

/// Fixed-size history of recent voltages
#[derive(Debug, Clone)]
pub struct VoltageHistory {
    samples: VecDeque<f64>,
    capacity: usize,
    hysteresis: f64,
}

impl VoltageHistory {
    pub fn new(capacity: usize, hysteresis: f64) -> Self {
        let capacity = capacity.max(2);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            hysteresis: hysteresis.abs(),
        }
    }

    /// Append a voltage, evicting the oldest once full
    pub fn push(&mut self, voltage: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(voltage);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Compare the newer half's mean against the older half's
    pub fn trend(&self) -> Trend {
        if self.samples.len() < MIN_TREND_SAMPLES {
            return Trend::Unknown;
        }

        let half = self.samples.len() / 2;
        let older = mean(self.samples.iter().take(half));
        let recent = mean(self.samples.iter().skip(self.samples.len() - half));
        let delta = recent - older;

        if delta > self.hysteresis {
            Trend::Rising
        } else if delta < -self.hysteresis {
            Trend::Falling
        } else {
            Trend::Stable
        }
    }

    pub fn stability(&self) -> Stability {
        if self.samples.len() < 2 {
            return Stability::Unknown;
        }

        let std_dev = self.std_dev();
        if std_dev < STABLE_STD_DEV {
            Stability::Stable
        } else if std_dev < FLUCTUATING_STD_DEV {
            Stability::Fluctuating
        } else {
            Stability::Unstable
        }
    }

    /// Population standard deviation of the history
    pub fn std_dev(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let avg = mean(self.samples.iter());
        let variance = self
            .samples
            .iter()
            .map(|v| (v - avg).powi(2))
            .sum::<f64>()
            / self.samples.len() as f64;
        variance.sqrt()
    }
}

fn mean<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(values: &[f64]) -> VoltageHistory {
        let mut history = VoltageHistory::new(10, 0.02);
        for v in values {
            history.push(*v);
        }
        history
    }

    #[test]
    fn test_trend_needs_samples() {
        assert_eq!(history_of(&[8.0, 7.0, 6.0]).trend(), Trend::Unknown);
        assert_eq!(history_of(&[]).stability(), Stability::Unknown);
    }

    #[test]
    fn test_trend_direction() {
        assert_eq!(history_of(&[8.0, 7.9, 7.8, 7.7]).trend(), Trend::Falling);
        assert_eq!(history_of(&[7.0, 7.1, 7.2, 7.3, 7.4]).trend(), Trend::Rising);
        // 10mV drift sits inside the 20mV band
        assert_eq!(history_of(&[7.40, 7.40, 7.41, 7.41]).trend(), Trend::Stable);
    }

    #[test]
    fn test_stability_classes() {
        assert_eq!(history_of(&[7.40, 7.41, 7.40, 7.41]).stability(), Stability::Stable);
        assert_eq!(history_of(&[7.30, 7.40, 7.35, 7.45]).stability(), Stability::Fluctuating);
        assert_eq!(history_of(&[6.5, 7.5, 6.5, 7.5]).stability(), Stability::Unstable);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = VoltageHistory::new(4, 0.02);
        for v in [9.0, 9.0, 9.0, 9.0, 7.0, 7.0, 7.0, 7.0] {
            history.push(v);
        }
        assert_eq!(history.len(), 4);
        // Old 9V samples evicted entirely
        assert_eq!(history.trend(), Trend::Stable);
        assert_eq!(history.std_dev(), 0.0);
    }
}
