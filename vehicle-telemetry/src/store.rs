//! Vehicle state store
//!
//! The single authoritative copy of {speed, battery, gear, turn signal}. Every
//! field is its own atomic, so readers on any thread see a whole value for the
//! field they ask for and never wait on writes to other fields. Only the
//! dispatcher writes (`apply` is crate-private); everyone else reads.

use crate::state_machine::{self, Gear, TurnSignal};
use crate::types::ChangeEvent;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// A requested change to one field, sent by a producer to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mutation {
    Speed(f64),
    Battery(f64),
    Gear(Gear),
    TurnSignal(TurnSignal),
}

/// Point-in-time view of the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleState {
    pub speed: f64,
    pub battery_percent: f64,
    pub gear: Gear,
    pub turn_signal: TurnSignal,
}

/// Minimum change magnitudes worth publishing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeThresholds {
    pub speed_epsilon: f64,
    pub battery_epsilon: f64,
}

impl Default for ChangeThresholds {
    fn default() -> Self {
        Self {
            speed_epsilon: 0.1,
            battery_epsilon: 0.1,
        }
    }
}

impl ChangeThresholds {
    /// Speed must move by more than epsilon, except that reaching exactly zero
    /// from any non-zero value always counts.
    pub fn speed_changed(&self, old: f64, new: f64) -> bool {
        (new == 0.0 && old != 0.0) || (new - old).abs() > self.speed_epsilon
    }

    pub fn battery_changed(&self, old: f64, new: f64) -> bool {
        (new - old).abs() > self.battery_epsilon
    }
}

#[derive(Debug)]
pub struct VehicleStateStore {
    speed_bits: AtomicU64,
    battery_bits: AtomicU64,
    gear: AtomicU8,
    turn_signal: AtomicU8,
    thresholds: ChangeThresholds,
}

impl VehicleStateStore {
    /// Start in Park, signals off, stopped, battery unknown (0%)
    pub fn new(thresholds: ChangeThresholds) -> Self {
        let initial = VehicleState::default();
        Self {
            speed_bits: AtomicU64::new(initial.speed.to_bits()),
            battery_bits: AtomicU64::new(initial.battery_percent.to_bits()),
            gear: AtomicU8::new(initial.gear.to_bits()),
            turn_signal: AtomicU8::new(initial.turn_signal.to_bits()),
            thresholds,
        }
    }

    pub fn thresholds(&self) -> ChangeThresholds {
        self.thresholds
    }

    pub fn speed(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::Acquire))
    }

    pub fn battery_level(&self) -> f64 {
        f64::from_bits(self.battery_bits.load(Ordering::Acquire))
    }

    pub fn gear(&self) -> Gear {
        Gear::from_bits(self.gear.load(Ordering::Acquire))
    }

    pub fn turn_signal(&self) -> TurnSignal {
        TurnSignal::from_bits(self.turn_signal.load(Ordering::Acquire))
    }

    /// Read every field; each is individually consistent
    pub fn snapshot(&self) -> VehicleState {
        VehicleState {
            speed: self.speed(),
            battery_percent: self.battery_level(),
            gear: self.gear(),
            turn_signal: self.turn_signal(),
        }
    }

    /// Would applying this mutation right now change anything?
    ///
    /// Producers use this to avoid flooding the queue; the dispatcher repeats
    /// the test authoritatively in `apply`.
    pub fn is_significant(&self, mutation: &Mutation) -> bool {
        match *mutation {
            Mutation::Speed(v) => self.thresholds.speed_changed(self.speed(), sanitize_speed(v)),
            Mutation::Battery(p) => {
                self.thresholds.battery_changed(self.battery_level(), sanitize_percent(p))
            }
            Mutation::Gear(g) => state_machine::transition(self.gear(), g).is_some(),
            Mutation::TurnSignal(t) => state_machine::transition(self.turn_signal(), t).is_some(),
        }
    }

    /// Test and apply a mutation, returning the event to publish if it changed
    /// the state. Must only be called from the dispatcher thread.
    pub(crate) fn apply(&self, mutation: Mutation) -> Option<ChangeEvent> {
        match mutation {
            Mutation::Speed(v) => {
                if !v.is_finite() {
                    log::warn!("Discarding non-finite speed {}", v);
                    return None;
                }
                let v = sanitize_speed(v);
                if !self.thresholds.speed_changed(self.speed(), v) {
                    return None;
                }
                self.speed_bits.store(v.to_bits(), Ordering::Release);
                Some(ChangeEvent::SpeedChanged(v))
            }
            Mutation::Battery(p) => {
                if !p.is_finite() {
                    log::warn!("Discarding non-finite battery level {}", p);
                    return None;
                }
                let p = sanitize_percent(p);
                if !self.thresholds.battery_changed(self.battery_level(), p) {
                    return None;
                }
                self.battery_bits.store(p.to_bits(), Ordering::Release);
                Some(ChangeEvent::BatteryChanged(p))
            }
            Mutation::Gear(g) => {
                let next = state_machine::transition(self.gear(), g)?;
                self.gear.store(next.to_bits(), Ordering::Release);
                Some(ChangeEvent::GearChanged(next))
            }
            Mutation::TurnSignal(t) => {
                let next = state_machine::transition(self.turn_signal(), t)?;
                self.turn_signal.store(next.to_bits(), Ordering::Release);
                Some(ChangeEvent::TurnSignalChanged(next))
            }
        }
    }
}

impl Default for VehicleStateStore {
    fn default() -> Self {
        Self::new(ChangeThresholds::default())
    }
}

fn sanitize_speed(v: f64) -> f64 {
    v.max(0.0)
}

fn sanitize_percent(p: f64) -> f64 {
    p.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let store = VehicleStateStore::default();
        assert_eq!(
            store.snapshot(),
            VehicleState {
                speed: 0.0,
                battery_percent: 0.0,
                gear: Gear::Park,
                turn_signal: TurnSignal::Off,
            }
        );
    }

    #[test]
    fn test_speed_epsilon() {
        let store = VehicleStateStore::default();
        assert_eq!(store.apply(Mutation::Speed(0.05)), None);
        assert_eq!(store.apply(Mutation::Speed(12.0)), Some(ChangeEvent::SpeedChanged(12.0)));
        assert_eq!(store.apply(Mutation::Speed(12.08)), None);
        assert_eq!(store.speed(), 12.0);
        assert_eq!(store.apply(Mutation::Speed(12.2)), Some(ChangeEvent::SpeedChanged(12.2)));
    }

    #[test]
    fn test_zero_always_published() {
        let store = VehicleStateStore::default();
        store.apply(Mutation::Speed(0.5));
        store.apply(Mutation::Speed(0.45));
        assert_eq!(store.speed(), 0.5);
        assert_eq!(store.apply(Mutation::Speed(0.42)), None);
        assert_eq!(store.apply(Mutation::Speed(0.0)), Some(ChangeEvent::SpeedChanged(0.0)));
        assert_eq!(store.apply(Mutation::Speed(0.0)), None);
    }

    #[test]
    fn test_battery_clamped() {
        let store = VehicleStateStore::default();
        assert_eq!(store.apply(Mutation::Battery(130.0)), Some(ChangeEvent::BatteryChanged(100.0)));
        assert_eq!(store.battery_level(), 100.0);
        assert_eq!(store.apply(Mutation::Battery(f64::NAN)), None);
        assert_eq!(store.battery_level(), 100.0);
    }

    #[test]
    fn test_discrete_fields_exact_inequality() {
        let store = VehicleStateStore::default();
        assert_eq!(store.apply(Mutation::Gear(Gear::Park)), None);
        assert_eq!(store.apply(Mutation::Gear(Gear::Drive)), Some(ChangeEvent::GearChanged(Gear::Drive)));
        assert_eq!(store.apply(Mutation::Gear(Gear::Drive)), None);

        assert!(store.is_significant(&Mutation::TurnSignal(TurnSignal::Left)));
        assert_eq!(
            store.apply(Mutation::TurnSignal(TurnSignal::Left)),
            Some(ChangeEvent::TurnSignalChanged(TurnSignal::Left))
        );
        assert!(!store.is_significant(&Mutation::TurnSignal(TurnSignal::Left)));
        assert_eq!(store.turn_signal(), TurnSignal::Left);
    }
}
