//! Discrete driver-selected state: gear and turn signal
//!
//! Both machines are fully connected (any state may move to any other), so the
//! only work here is validating inputs against the finite alphabets and deciding
//! whether a requested value is an actual transition.

use crate::types::{Result, TelemetryError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Gear selector position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Gear {
    #[default]
    #[serde(rename = "P")]
    Park,
    #[serde(rename = "R")]
    Reverse,
    #[serde(rename = "N")]
    Neutral,
    #[serde(rename = "D")]
    Drive,
}

impl Gear {
    pub const ALL: [Gear; 4] = [Gear::Park, Gear::Reverse, Gear::Neutral, Gear::Drive];

    /// Single-character code used on the bus and the control surface
    pub fn as_char(self) -> char {
        match self {
            Gear::Park => 'P',
            Gear::Reverse => 'R',
            Gear::Neutral => 'N',
            Gear::Drive => 'D',
        }
    }

    pub(crate) fn to_bits(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_bits(bits: u8) -> Gear {
        match bits {
            1 => Gear::Reverse,
            2 => Gear::Neutral,
            3 => Gear::Drive,
            _ => Gear::Park,
        }
    }
}

impl TryFrom<char> for Gear {
    type Error = TelemetryError;

    /// Accepts `P`, `R`, `N`, `D` in either case
    fn try_from(code: char) -> Result<Self> {
        match code.to_ascii_uppercase() {
            'P' => Ok(Gear::Park),
            'R' => Ok(Gear::Reverse),
            'N' => Ok(Gear::Neutral),
            'D' => Ok(Gear::Drive),
            _ => Err(TelemetryError::InvalidInput(format!(
                "invalid gear {:?} (use P/R/N/D)",
                code
            ))),
        }
    }
}

impl fmt::Display for Gear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Turn signal mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnSignal {
    #[default]
    Off,
    Left,
    Right,
    Hazard,
}

impl TurnSignal {
    pub const ALL: [TurnSignal; 4] = [
        TurnSignal::Off,
        TurnSignal::Left,
        TurnSignal::Right,
        TurnSignal::Hazard,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TurnSignal::Off => "off",
            TurnSignal::Left => "left",
            TurnSignal::Right => "right",
            TurnSignal::Hazard => "hazard",
        }
    }

    pub(crate) fn to_bits(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_bits(bits: u8) -> TurnSignal {
        match bits {
            1 => TurnSignal::Left,
            2 => TurnSignal::Right,
            3 => TurnSignal::Hazard,
            _ => TurnSignal::Off,
        }
    }
}

impl FromStr for TurnSignal {
    type Err = TelemetryError;

    fn from_str(mode: &str) -> Result<Self> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(TurnSignal::Off),
            "left" => Ok(TurnSignal::Left),
            "right" => Ok(TurnSignal::Right),
            "hazard" => Ok(TurnSignal::Hazard),
            _ => Err(TelemetryError::InvalidInput(format!(
                "invalid turn signal mode {:?} (use off/left/right/hazard)",
                mode
            ))),
        }
    }
}

impl fmt::Display for TurnSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decide whether moving from `current` to `requested` is a real transition.
///
/// Returns the new state, or `None` when the request repeats the current value
/// (which must never produce a notification).
pub fn transition<S: Copy + PartialEq>(current: S, requested: S) -> Option<S> {
    if current == requested {
        None
    } else {
        Some(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gear_parsing() {
        assert_eq!(Gear::try_from('P').unwrap(), Gear::Park);
        assert_eq!(Gear::try_from('d').unwrap(), Gear::Drive);
        assert!(matches!(
            Gear::try_from('X'),
            Err(TelemetryError::InvalidInput(_))
        ));
        assert!(Gear::try_from('\0').is_err());
    }

    #[test]
    fn test_turn_signal_parsing() {
        assert_eq!("hazard".parse::<TurnSignal>().unwrap(), TurnSignal::Hazard);
        assert_eq!("Left".parse::<TurnSignal>().unwrap(), TurnSignal::Left);
        assert!("blink".parse::<TurnSignal>().is_err());
        assert!("".parse::<TurnSignal>().is_err());
    }

    #[test]
    fn test_bits_roundtrip_covers_alphabet() {
        for gear in Gear::ALL {
            assert_eq!(Gear::from_bits(gear.to_bits()), gear);
        }
        for mode in TurnSignal::ALL {
            assert_eq!(TurnSignal::from_bits(mode.to_bits()), mode);
        }
    }

    #[test]
    fn test_transition_any_to_any() {
        for from in Gear::ALL {
            for to in Gear::ALL {
                let result = transition(from, to);
                if from == to {
                    assert_eq!(result, None);
                } else {
                    assert_eq!(result, Some(to));
                }
            }
        }
    }
}
