//! Printing change events and run summaries

use crate::config::OutputFormat;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::io::{self, Write};
use vehicle_telemetry::{ChangeEvent, Publisher, StatsSnapshot};

/// One output line in JSON mode
#[derive(Debug, Serialize)]
struct EventLine<'a> {
    timestamp: String,
    #[serde(flatten)]
    event: &'a ChangeEvent,
}

/// Render an event as a single line (no trailing newline)
pub fn format_event(event: &ChangeEvent, at: DateTime<Local>, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            let line = EventLine {
                timestamp: at.to_rfc3339(),
                event,
            };
            serde_json::to_string(&line).unwrap_or_else(|e| {
                log::error!("Failed to serialize {}: {}", event, e);
                String::new()
            })
        }
        OutputFormat::Text => format!("[{}] {}", at.format("%H:%M:%S%.3f"), event),
    }
}

/// Publisher that writes every event to stdout
pub struct StdoutPublisher {
    format: OutputFormat,
}

impl StdoutPublisher {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl Publisher for StdoutPublisher {
    fn publish(&self, event: &ChangeEvent) {
        let line = format_event(event, Local::now(), self.format);
        let mut out = io::stdout().lock();
        if let Err(e) = writeln!(out, "{}", line) {
            log::warn!("Failed to write event: {}", e);
        }
    }
}

/// Print the end-of-run counters
pub fn print_stats(stats: &StatsSnapshot, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string(stats) {
            Ok(json) => println!("{{\"stats\":{}}}", json),
            Err(e) => log::error!("Failed to serialize stats: {}", e),
        },
        OutputFormat::Text => {
            println!("\nSummary:");
            println!("  Frames received:   {}", stats.frames_received);
            println!("  Frames decoded:    {}", stats.frames_decoded);
            println!("  Read failures:     {}", stats.read_failures);
            println!("  Invalid inputs:    {}", stats.invalid_inputs);
            println!("  Battery failures:  {}", stats.battery_failures);
            println!("  Mutations queued:  {}", stats.mutations_queued);
            println!("  Events published:  {}", stats.events_published);
        }
    }
}
