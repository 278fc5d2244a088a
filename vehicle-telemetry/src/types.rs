//! Core types for the vehicle telemetry library
//!
//! This module defines the fundamental types that flow through the estimator:
//! raw frames coming off the field bus, the typed measurements decoded from them,
//! and the change events handed to subscribers.

use crate::state_machine::{Gear, TurnSignal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Result type for telemetry operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// CAN identifier carrying the wheel speed (2 bytes, big-endian)
pub const SPEED_FRAME_ID: u32 = 0x100;

/// CAN identifier carrying the gear selector (1 byte, ASCII)
pub const GEAR_FRAME_ID: u32 = 0x102;

/// Largest payload of a classic CAN frame
pub const MAX_PAYLOAD_LEN: usize = 8;

const MAX_STANDARD_ID: u32 = 0x7FF;
const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Raw frame read from the field bus
///
/// Ephemeral: produced once per bus read and consumed immediately by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// CAN message ID (11-bit or 29-bit)
    pub can_id: u32,
    /// True if this is an extended (29-bit) CAN ID
    pub is_extended: bool,
    /// Frame data bytes (0-8 bytes)
    pub data: Vec<u8>,
    /// Monotonic reception time
    pub timestamp: Instant,
}

impl RawFrame {
    /// Build a frame, validating the identifier range and payload length
    pub fn new(can_id: u32, data: impl Into<Vec<u8>>, timestamp: Instant) -> Result<Self> {
        let data = data.into();
        if data.len() > MAX_PAYLOAD_LEN {
            return Err(TelemetryError::InvalidFrame(format!(
                "payload of {} bytes exceeds {} bytes (ID 0x{:X})",
                data.len(),
                MAX_PAYLOAD_LEN,
                can_id
            )));
        }
        if can_id > MAX_EXTENDED_ID {
            return Err(TelemetryError::InvalidFrame(format!(
                "identifier 0x{:X} does not fit in 29 bits",
                can_id
            )));
        }

        Ok(Self {
            can_id,
            is_extended: can_id > MAX_STANDARD_ID,
            data,
            timestamp,
        })
    }

    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }
}

/// A raw speed reading in native sensor units (scale applied downstream)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedMeasurement {
    pub value: f64,
    pub timestamp: Instant,
}

/// A raw gear code as sent on the bus, not yet validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GearMeasurement {
    pub code: char,
}

/// Typed measurement produced by the frame decoder
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodedEvent {
    Speed(SpeedMeasurement),
    Gear(GearMeasurement),
}

/// Fields of the vehicle state that can change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateField {
    Speed,
    Battery,
    Gear,
    TurnSignal,
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateField::Speed => write!(f, "Speed"),
            StateField::Battery => write!(f, "Battery"),
            StateField::Gear => write!(f, "Gear"),
            StateField::TurnSignal => write!(f, "TurnSignal"),
        }
    }
}

/// Notification emitted once per applied state mutation
///
/// Serializes as `{"event": "SpeedChanged", "value": 12.5}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "value")]
pub enum ChangeEvent {
    SpeedChanged(f64),
    BatteryChanged(f64),
    GearChanged(Gear),
    TurnSignalChanged(TurnSignal),
}

impl ChangeEvent {
    /// The state field this event reports on
    pub fn field(&self) -> StateField {
        match self {
            ChangeEvent::SpeedChanged(_) => StateField::Speed,
            ChangeEvent::BatteryChanged(_) => StateField::Battery,
            ChangeEvent::GearChanged(_) => StateField::Gear,
            ChangeEvent::TurnSignalChanged(_) => StateField::TurnSignal,
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeEvent::SpeedChanged(v) => write!(f, "SpeedChanged({:.1})", v),
            ChangeEvent::BatteryChanged(v) => write!(f, "BatteryChanged({:.1})", v),
            ChangeEvent::GearChanged(g) => write!(f, "GearChanged({})", g),
            ChangeEvent::TurnSignalChanged(t) => write!(f, "TurnSignalChanged({})", t),
        }
    }
}

/// Errors that can occur in the telemetry core
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// No candidate bus channel could be opened
    #[error("No bus channel available (tried: {})", format_attempts(.tried))]
    TransportUnavailable { tried: Vec<(String, String)> },

    /// A single bus read failed; the caller retries on its next cycle
    #[error("Bus read failed: {0}")]
    ReadFailure(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Battery sensor read failed: {0}")]
    SensorReadFailure(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Telemetry service has been stopped")]
    ServiceStopped,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

fn format_attempts(tried: &[(String, String)]) -> String {
    if tried.is_empty() {
        return "no candidates".to_string();
    }
    tried
        .iter()
        .map(|(channel, reason)| format!("{}: {}", channel, reason))
        .collect::<Vec<_>>()
        .join("; ")
}
