//! Field-bus acquisition
//!
//! Builds an ordered, de-duplicated list of candidate channels (overrides
//! first, then the preferred order) and opens the first one that works. If none
//! open, the caller gets `TransportUnavailable` listing every attempt and must
//! not start reading.

use crate::config::BusConfig;
use crate::types::{RawFrame, Result, TelemetryError};
use std::collections::HashSet;
use std::time::Duration;

/// An open field-bus channel
pub trait FrameSource: Send {
    /// Block for up to `timeout` waiting for a frame.
    ///
    /// `Ok(None)` means the timeout elapsed with nothing on the bus; an `Err`
    /// is a transient read failure the caller retries after a backoff.
    fn recv(&mut self, timeout: Duration) -> Result<Option<RawFrame>>;
}

/// Knows how to open a named channel (e.g. `can0`)
pub trait ChannelOpener {
    fn open(&self, channel: &str) -> Result<Box<dyn FrameSource>>;
}

/// A successfully opened channel and the name it was opened under
pub struct AcquiredChannel {
    pub channel: String,
    pub source: Box<dyn FrameSource>,
}

impl std::fmt::Debug for AcquiredChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquiredChannel")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AcquisitionManager {
    overrides: Vec<String>,
    preferred: Vec<String>,
}

impl AcquisitionManager {
    pub fn new(preferred: Vec<String>) -> Self {
        Self {
            overrides: Vec::new(),
            preferred,
        }
    }

    /// Build from bus configuration: the configured channel (if any) is an override
    pub fn from_config(config: &BusConfig) -> Self {
        let mut manager = Self::new(config.preferred.clone());
        if let Some(channel) = &config.channel {
            manager = manager.with_override(channel.clone());
        }
        manager
    }

    /// Builder method: add an override tried before the preferred list.
    /// Overrides keep the order they were added in.
    pub fn with_override(mut self, channel: impl Into<String>) -> Self {
        let channel = channel.into();
        if !channel.trim().is_empty() {
            self.overrides.push(channel);
        }
        self
    }

    /// Overrides first, then the preferred order, duplicates removed
    pub fn candidates(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.overrides
            .iter()
            .chain(self.preferred.iter())
            .filter(|c| seen.insert(c.as_str()))
            .cloned()
            .collect()
    }

    /// Try each candidate in turn; the first successful open wins
    pub fn acquire(&self, opener: &dyn ChannelOpener) -> Result<AcquiredChannel> {
        let mut tried = Vec::new();

        for channel in self.candidates() {
            match opener.open(&channel) {
                Ok(source) => {
                    log::info!("Bus connected on {}", channel);
                    return Ok(AcquiredChannel { channel, source });
                }
                Err(e) => {
                    log::debug!("Bus open failed on {}: {}", channel, e);
                    tried.push((channel, e.to_string()));
                }
            }
        }

        for (channel, reason) in &tried {
            log::error!("Bus open failed {}: {}", channel, reason);
        }
        Err(TelemetryError::TransportUnavailable { tried })
    }
}
