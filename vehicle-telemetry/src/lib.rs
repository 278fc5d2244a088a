//! Vehicle Telemetry Library
//!
//! The telemetry core of a small vehicle: it reads speed and gear frames off a
//! CAN bus, samples the battery, and keeps one authoritative vehicle state that
//! consumers can query and subscribe to.
//!
//! # Architecture
//!
//! - Frames are decoded into raw measurements (`0x100` speed, `0x102` gear)
//! - Speed is smoothed by a configurable kinematic filter and forced to zero
//!   when the bus goes quiet
//! - Battery voltage is denoised, load-compensated and mapped to a state of
//!   charge through a calibration table
//! - Every state change travels as a typed mutation to a single dispatcher
//!   thread, which is the only writer of the state store and emits exactly one
//!   change event per applied mutation
//!
//! The library does NOT:
//! - Talk to any particular IPC or message bus (publishers are pluggable)
//! - Persist state across restarts
//! - Decode anything beyond the speed and gear frames
//!
//! # Example Usage
//!
//! ```no_run
//! use vehicle_telemetry::{CandumpDirectoryOpener, TelemetryConfig, TelemetryService};
//! use std::time::Duration;
//!
//! let config = TelemetryConfig::new()
//!     .with_channel("vcan0")
//!     .with_stale_after(Duration::from_millis(500));
//!
//! // Replay recorded traces as if they were live channels
//! let opener = CandumpDirectoryOpener::new("traces", true);
//!
//! let builder = TelemetryService::builder(config);
//! let events = builder.subscribe();
//! let service = builder.start(&opener).unwrap();
//!
//! println!("Connected on {}", service.channel());
//! service.set_gear('D').unwrap();
//!
//! while let Ok(event) = events.recv_timeout(Duration::from_secs(1)) {
//!     println!("{}", event);
//! }
//! ```

// Public modules
pub mod acquisition;
pub mod battery;
pub mod config;
pub mod decoder;
pub mod dispatcher;
pub mod estimator;
pub mod formats;
pub mod service;
pub mod state_machine;
pub mod stats;
pub mod store;
pub mod types;

// Internal modules (not exposed in public API)
mod producers;

// Re-export main types for convenience
pub use acquisition::{AcquiredChannel, AcquisitionManager, ChannelOpener, FrameSource};
pub use battery::{
    BatteryCalibration, BatteryEstimator, BatteryReading, BatterySensor, BatteryStatus,
    CalibrationPreset, Stability, Trend,
};
pub use config::{
    BatteryConfig, BusConfig, CalibrationSource, FilterConfig, SpeedConfig, TelemetryConfig,
};
pub use decoder::FrameDecoder;
pub use dispatcher::{ChannelPublisher, Publisher};
pub use estimator::{SpeedEstimator, SpeedFilter};
pub use formats::{CandumpDirectoryOpener, CandumpParser, CandumpReplay};
pub use service::{TelemetryService, TelemetryServiceBuilder};
pub use state_machine::{Gear, TurnSignal};
pub use stats::StatsSnapshot;
pub use store::{ChangeThresholds, VehicleState};
pub use types::{
    ChangeEvent, DecodedEvent, GearMeasurement, RawFrame, Result, SpeedMeasurement, StateField,
    TelemetryError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
