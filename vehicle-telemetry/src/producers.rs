//! Producer loops: bus reader and battery poller
//!
//! Each producer runs on its own thread, owns its estimator outright, and only
//! talks to the rest of the system by queueing [`Mutation`]s. Both expose a
//! single-step `poll_once` so the loop body can be driven directly in tests.

use crate::acquisition::FrameSource;
use crate::battery::{BatteryEstimator, BatteryReading, BatterySensor};
use crate::decoder::FrameDecoder;
use crate::dispatcher::MutationSender;
use crate::estimator::SpeedEstimator;
use crate::state_machine::Gear;
use crate::stats::TelemetryCounters;
use crate::store::{ChangeThresholds, Mutation, VehicleStateStore};
use crate::types::{DecodedEvent, RawFrame, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep, so shutdown is noticed promptly
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Reads frames, decodes them, filters speed, and queues state changes
pub struct BusReader {
    source: Box<dyn FrameSource>,
    decoder: FrameDecoder,
    estimator: SpeedEstimator,
    store: Arc<VehicleStateStore>,
    tx: MutationSender,
    counters: Arc<TelemetryCounters>,
    read_timeout: Duration,
    error_backoff: Duration,
    last_sent_speed: f64,
    last_sent_gear: Option<Gear>,
}

impl BusReader {
    pub fn new(
        source: Box<dyn FrameSource>,
        estimator: SpeedEstimator,
        store: Arc<VehicleStateStore>,
        tx: MutationSender,
        counters: Arc<TelemetryCounters>,
        read_timeout: Duration,
        error_backoff: Duration,
    ) -> Self {
        let last_sent_speed = store.speed();
        Self {
            source,
            decoder: FrameDecoder::new(),
            estimator,
            store,
            tx,
            counters,
            read_timeout,
            error_backoff,
            last_sent_speed,
            last_sent_gear: None,
        }
    }

    /// One loop iteration: wait for a frame, handle it, then re-check staleness
    ///
    /// Read failures are counted and backed off here; only a stopped dispatcher
    /// is reported to the caller.
    pub fn poll_once(&mut self) -> Result<()> {
        // Never block past the staleness window, or zero-forcing would lag
        let timeout = self.read_timeout.min(self.estimator.stale_after());

        match self.source.recv(timeout) {
            Ok(Some(frame)) => {
                self.counters.inc_frames_received();
                self.handle_frame(frame)?;
            }
            Ok(None) => {}
            Err(e) => {
                self.counters.inc_read_failures();
                log::warn!("Bus read error: {}", e);
                thread::sleep(self.error_backoff);
            }
        }

        self.offer_speed(Instant::now())
    }

    /// Loop until `running` clears or the dispatcher goes away
    pub fn run(mut self, running: &AtomicBool) {
        log::info!("Listening: CAN 0x100 (speed), 0x102 (gear)");
        while running.load(Ordering::Acquire) {
            if let Err(e) = self.poll_once() {
                log::info!("Bus reader stopping: {}", e);
                break;
            }
        }
        log::info!("Bus reader exited");
    }

    fn handle_frame(&mut self, frame: RawFrame) -> Result<()> {
        let Some(event) = self.decoder.decode(&frame) else {
            return Ok(());
        };
        self.counters.inc_frames_decoded();

        match event {
            DecodedEvent::Speed(measurement) => {
                self.estimator.update(measurement);
                Ok(())
            }
            DecodedEvent::Gear(measurement) => match Gear::try_from(measurement.code) {
                Ok(gear) => {
                    let mutation = Mutation::Gear(gear);
                    // Re-assert when the store disagrees, e.g. after a control-surface change
                    if self.last_sent_gear != Some(gear) || self.store.is_significant(&mutation) {
                        self.tx.send(mutation)?;
                        self.last_sent_gear = Some(gear);
                    }
                    Ok(())
                }
                Err(e) => {
                    self.counters.inc_invalid_inputs();
                    log::warn!("Ignoring gear frame: {}", e);
                    Ok(())
                }
            },
        }
    }

    fn offer_speed(&mut self, now: Instant) -> Result<()> {
        let speed = self.estimator.current(now);
        if self.store.thresholds().speed_changed(self.last_sent_speed, speed) {
            self.tx.send(Mutation::Speed(speed))?;
            self.last_sent_speed = speed;
        }
        Ok(())
    }
}

/// Polls the battery sensor on a fixed cadence
pub struct BatteryPoller {
    estimator: BatteryEstimator,
    sensor: Box<dyn BatterySensor>,
    tx: MutationSender,
    counters: Arc<TelemetryCounters>,
    thresholds: ChangeThresholds,
    interval: Duration,
    latest: Arc<Mutex<Option<BatteryReading>>>,
    last_sent_percent: f64,
}

impl BatteryPoller {
    pub fn new(
        estimator: BatteryEstimator,
        sensor: Box<dyn BatterySensor>,
        store: &VehicleStateStore,
        tx: MutationSender,
        counters: Arc<TelemetryCounters>,
        interval: Duration,
        latest: Arc<Mutex<Option<BatteryReading>>>,
    ) -> Self {
        Self {
            estimator,
            sensor,
            tx,
            counters,
            thresholds: store.thresholds(),
            interval,
            latest,
            last_sent_percent: store.battery_level(),
        }
    }

    /// Take one reading and queue it if it moved enough
    ///
    /// A failed read still produces a 0% reading, which is published like any
    /// other so consumers see the degraded state.
    pub fn poll_once(&mut self) -> Result<BatteryReading> {
        let reading = self.estimator.read(self.sensor.as_mut());
        if !reading.is_ok() {
            self.counters.inc_battery_failures();
        }

        *self.latest.lock() = Some(reading.clone());

        let percent = reading.soc_percent;
        if self.thresholds.battery_changed(self.last_sent_percent, percent) {
            self.tx.send(Mutation::Battery(percent))?;
            self.last_sent_percent = percent;
        }
        Ok(reading)
    }

    pub fn run(mut self, running: &AtomicBool) {
        log::info!("Battery poller started ({:?} interval)", self.interval);
        while running.load(Ordering::Acquire) {
            if let Err(e) = self.poll_once() {
                log::info!("Battery poller stopping: {}", e);
                break;
            }
            sleep_while_running(self.interval, running);
        }
        log::info!("Battery poller exited");
    }
}

fn sleep_while_running(total: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
