//! Voltage denoising and load compensation

use super::BatterySensor;
use crate::types::Result;
use std::thread;
use std::time::Duration;

/// Mean of the samples, dropping one highest and one lowest when there are
/// at least three of them.
///
/// Returns `None` for an empty slice.
pub fn trimmed_mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    if samples.len() < 3 {
        return Some(samples.iter().sum::<f64>() / samples.len() as f64);
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let kept = &sorted[1..sorted.len() - 1];
    Some(kept.iter().sum::<f64>() / kept.len() as f64)
}

/// Take `count` voltage readings in quick succession and return their trimmed mean
///
/// Any failed read fails the whole sample; the caller polls again later.
pub fn sample_voltage(sensor: &mut dyn BatterySensor, count: usize, delay: Duration) -> Result<f64> {
    let count = count.max(1);
    let mut samples = Vec::with_capacity(count);

    for i in 0..count {
        samples.push(sensor.voltage()?);
        if i + 1 < count && !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    // count >= 1, so the mean always exists
    Ok(trimmed_mean(&samples).unwrap_or_default())
}

/// Add the voltage lost across the pack's internal resistance
///
/// Uses the absolute current so compensation always raises the estimate, then
/// caps at the pack's rated full voltage.
pub fn compensate_for_load(
    voltage: f64,
    current_ma: Option<f64>,
    internal_resistance_ohms: f64,
    full_voltage: f64,
) -> f64 {
    let Some(current_ma) = current_ma else {
        return voltage;
    };

    let current_amps = current_ma.abs() / 1000.0;
    let compensated = voltage + current_amps * internal_resistance_ohms;
    compensated.min(full_voltage)
}
