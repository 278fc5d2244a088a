//! Telemetry service: the wired-up runtime
//!
//! Starting a service acquires the bus first and refuses to start if no channel
//! opens. Only then are the dispatcher, bus reader, and battery poller threads
//! spawned. The service exposes the query surface (plain reads of the store),
//! the control surface (validated gear and turn-signal requests queued to the
//! dispatcher), and counters. Dropping it shuts everything down and drains the
//! mutation queue.

use crate::acquisition::{AcquisitionManager, ChannelOpener};
use crate::battery::{BatteryEstimator, BatteryReading, BatterySensor};
use crate::config::TelemetryConfig;
use crate::dispatcher::{Dispatcher, MutationSender, Publisher, PublisherRegistry};
use crate::estimator::SpeedEstimator;
use crate::producers::{BatteryPoller, BusReader};
use crate::state_machine::{Gear, TurnSignal};
use crate::stats::{StatsSnapshot, TelemetryCounters};
use crate::store::{ChangeThresholds, Mutation, VehicleState, VehicleStateStore};
use crate::types::{ChangeEvent, Result, TelemetryError};
use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Collects everything a service needs before it starts
///
/// Publishers registered here see every event from the first mutation on.
pub struct TelemetryServiceBuilder {
    config: TelemetryConfig,
    acquisition: Option<AcquisitionManager>,
    sensor: Option<Box<dyn BatterySensor>>,
    publishers: PublisherRegistry,
}

impl TelemetryServiceBuilder {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            acquisition: None,
            sensor: None,
            publishers: PublisherRegistry::new(),
        }
    }

    /// Use this candidate list instead of the one derived from `config.bus`
    pub fn with_acquisition(mut self, acquisition: AcquisitionManager) -> Self {
        self.acquisition = Some(acquisition);
        self
    }

    pub fn with_battery_sensor(mut self, sensor: Box<dyn BatterySensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn with_publisher(self, publisher: Arc<dyn Publisher>) -> Self {
        self.publishers.register(publisher);
        self
    }

    /// Channel-backed subscription that is live before the first event
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.publishers.subscribe()
    }

    /// Validate, acquire the bus, then spawn the worker threads
    pub fn start(self, opener: &dyn ChannelOpener) -> Result<TelemetryService> {
        let TelemetryServiceBuilder {
            config,
            acquisition,
            sensor,
            publishers,
        } = self;

        config.validate()?;

        // Estimators are built up front so a bad config fails before any I/O
        let speed_estimator = SpeedEstimator::from_config(&config.speed)?;
        let battery_estimator = BatteryEstimator::from_config(&config.battery)?;

        let acquisition = acquisition.unwrap_or_else(|| AcquisitionManager::from_config(&config.bus));
        let acquired = match acquisition.acquire(opener) {
            Ok(acquired) => acquired,
            Err(e) => {
                log::error!("Declining to start: {}", e);
                return Err(e);
            }
        };

        let store = Arc::new(VehicleStateStore::new(ChangeThresholds {
            speed_epsilon: config.speed.epsilon,
            battery_epsilon: config.battery.epsilon,
        }));
        let counters = Arc::new(TelemetryCounters::new());
        let dispatcher = Dispatcher::spawn(Arc::clone(&store), publishers.clone(), Arc::clone(&counters))?;

        let control = dispatcher.sender();

        let running = Arc::new(AtomicBool::new(true));
        let latest_battery = Arc::new(Mutex::new(None));
        // From here on an early return drops the service, which drains and joins.
        // Producer senders are cloned from it so none outlives a failed start.
        let mut service = TelemetryService {
            store: Arc::clone(&store),
            publishers,
            counters: Arc::clone(&counters),
            control,
            running: Arc::clone(&running),
            producers: Vec::new(),
            channel: acquired.channel,
            latest_battery: Arc::clone(&latest_battery),
            dispatcher: Some(dispatcher),
        };

        let filter_name = speed_estimator.filter_name();
        let reader = BusReader::new(
            acquired.source,
            speed_estimator,
            Arc::clone(&store),
            service.sender()?,
            Arc::clone(&counters),
            config.bus.read_timeout(),
            config.bus.error_backoff(),
        );
        let reader_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("telemetry-bus-reader".to_string())
            .spawn(move || reader.run(&reader_running))?;
        service.producers.push(handle);

        match sensor {
            Some(sensor) => {
                let poller = BatteryPoller::new(
                    battery_estimator,
                    sensor,
                    &store,
                    service.sender()?,
                    Arc::clone(&counters),
                    config.battery.poll_interval(),
                    latest_battery,
                );
                let poller_running = Arc::clone(&running);
                let handle = thread::Builder::new()
                    .name("telemetry-battery".to_string())
                    .spawn(move || poller.run(&poller_running))?;
                service.producers.push(handle);
            }
            None => log::warn!("No battery sensor configured, battery level stays at 0%"),
        }

        log::info!(
            "Telemetry service running on {} ({} speed filter)",
            service.channel,
            filter_name
        );
        Ok(service)
    }
}

/// A running telemetry core
///
/// Reads and control requests take `&self` and may be called from any thread.
pub struct TelemetryService {
    store: Arc<VehicleStateStore>,
    publishers: PublisherRegistry,
    counters: Arc<TelemetryCounters>,
    control: Option<MutationSender>,
    running: Arc<AtomicBool>,
    producers: Vec<JoinHandle<()>>,
    channel: String,
    latest_battery: Arc<Mutex<Option<BatteryReading>>>,
    dispatcher: Option<Dispatcher>,
}

impl TelemetryService {
    pub fn builder(config: TelemetryConfig) -> TelemetryServiceBuilder {
        TelemetryServiceBuilder::new(config)
    }

    /// Start with default acquisition and no extra publishers
    pub fn start(
        config: TelemetryConfig,
        opener: &dyn ChannelOpener,
        sensor: Option<Box<dyn BatterySensor>>,
    ) -> Result<Self> {
        let builder = Self::builder(config);
        match sensor {
            Some(sensor) => builder.with_battery_sensor(sensor).start(opener),
            None => builder.start(opener),
        }
    }

    // Query surface

    pub fn speed(&self) -> f64 {
        self.store.speed()
    }

    pub fn battery_level(&self) -> f64 {
        self.store.battery_level()
    }

    pub fn gear(&self) -> Gear {
        self.store.gear()
    }

    pub fn turn_signal(&self) -> TurnSignal {
        self.store.turn_signal()
    }

    pub fn snapshot(&self) -> VehicleState {
        self.store.snapshot()
    }

    // Control surface

    /// Request a gear change; the code is validated before anything is queued
    pub fn set_gear(&self, code: char) -> Result<()> {
        let gear = Gear::try_from(code).inspect_err(|e| self.reject(e))?;
        self.request(Mutation::Gear(gear))
    }

    /// Request a turn-signal mode by name (`off`, `left`, `right`, `hazard`)
    pub fn set_turn_signal(&self, name: &str) -> Result<()> {
        let signal = name.parse::<TurnSignal>().inspect_err(|e| self.reject(e))?;
        self.request(Mutation::TurnSignal(signal))
    }

    fn reject(&self, error: &TelemetryError) {
        self.counters.inc_invalid_inputs();
        log::warn!("Rejected control request: {}", error);
    }

    fn request(&self, mutation: Mutation) -> Result<()> {
        self.control
            .as_ref()
            .ok_or(TelemetryError::ServiceStopped)?
            .send(mutation)
    }

    fn sender(&self) -> Result<MutationSender> {
        self.control.clone().ok_or(TelemetryError::ServiceStopped)
    }

    // Diagnostics

    /// True while the acquired channel is being read
    pub fn is_connected(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.producers.first().is_some_and(|reader| !reader.is_finished())
    }

    /// Name of the channel acquisition settled on
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.counters.snapshot()
    }

    /// The most recent battery poll, including trend and error detail
    pub fn latest_battery(&self) -> Option<BatteryReading> {
        self.latest_battery.lock().clone()
    }

    /// Add a publisher while running; it sees events from now on
    pub fn register_publisher(&self, publisher: Arc<dyn Publisher>) {
        self.publishers.register(publisher);
    }

    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.publishers.subscribe()
    }

    /// Stop producers, drain the queue, join every thread
    ///
    /// Mutations already queued (including accepted control requests) are
    /// applied and published before this returns. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(mut dispatcher) = self.dispatcher.take() else {
            return;
        };

        log::info!("Shutting down telemetry service");
        self.running.store(false, Ordering::Release);
        for producer in self.producers.drain(..) {
            let name = producer.thread().name().unwrap_or("producer").to_string();
            if producer.join().is_err() {
                log::error!("Thread {} panicked", name);
            }
        }

        self.control.take();
        dispatcher.shutdown();

        let stats = self.counters.snapshot();
        log::info!(
            "Telemetry service stopped: {} frames, {} events published",
            stats.frames_received,
            stats.events_published
        );
    }
}

impl Drop for TelemetryService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
