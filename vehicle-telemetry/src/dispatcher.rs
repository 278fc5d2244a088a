//! Single-writer dispatcher
//!
//! Producers on any thread send [`Mutation`]s into one ordered, unbounded
//! channel. A single dispatcher thread drains it, applies each mutation to the
//! [`VehicleStateStore`] (the only place the store is written), and for every
//! mutation that actually changed something hands exactly one [`ChangeEvent`]
//! to each registered [`Publisher`].
//!
//! Shutdown is a drain: once every sender is dropped the dispatcher finishes the
//! queued mutations and exits.

use crate::stats::TelemetryCounters;
use crate::store::{Mutation, VehicleStateStore};
use crate::types::{ChangeEvent, Result, TelemetryError};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Outbound notification capability (the transport to other processes)
pub trait Publisher: Send + Sync {
    fn publish(&self, event: &ChangeEvent);

    /// A closed publisher is dropped from the registry after its next event
    fn is_closed(&self) -> bool {
        false
    }
}

impl<F> Publisher for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn publish(&self, event: &ChangeEvent) {
        self(event)
    }
}

/// Publisher that forwards events into a channel for pull-style consumers
pub struct ChannelPublisher {
    tx: Sender<ChangeEvent>,
    closed: AtomicBool,
}

impl ChannelPublisher {
    /// Create a publisher and the receiving end it feeds
    pub fn new() -> (Self, Receiver<ChangeEvent>) {
        let (tx, rx) = channel::unbounded();
        (
            Self {
                tx,
                closed: AtomicBool::new(false),
            },
            rx,
        )
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&self, event: &ChangeEvent) {
        if self.tx.send(*event).is_err() {
            log::debug!("Subscriber receiver dropped, unsubscribing");
            self.closed.store(true, Ordering::Release);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Shared list of publishers; can be extended while the dispatcher runs
#[derive(Clone, Default)]
pub struct PublisherRegistry {
    publishers: Arc<Mutex<Vec<Arc<dyn Publisher>>>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, publisher: Arc<dyn Publisher>) {
        self.publishers.lock().push(publisher);
    }

    /// Register a channel-backed subscriber and return its receiver
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (publisher, rx) = ChannelPublisher::new();
        self.register(Arc::new(publisher));
        rx
    }

    pub fn len(&self) -> usize {
        self.publishers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, event: &ChangeEvent) {
        // Publishers run unlocked so they may register or subscribe themselves
        let publishers = self.publishers.lock().clone();
        for publisher in &publishers {
            publisher.publish(event);
        }

        if publishers.iter().any(|p| p.is_closed()) {
            self.publishers.lock().retain(|p| !p.is_closed());
        }
    }
}

/// Cloneable handle producers use to queue mutations
#[derive(Clone)]
pub struct MutationSender {
    tx: Sender<Mutation>,
    counters: Arc<TelemetryCounters>,
}

impl MutationSender {
    /// Queue a mutation; fails only once the dispatcher has gone away
    pub fn send(&self, mutation: Mutation) -> Result<()> {
        self.tx
            .send(mutation)
            .map_err(|_| TelemetryError::ServiceStopped)?;
        self.counters.inc_mutations_queued();
        Ok(())
    }
}

/// Owner of the dispatcher thread
pub struct Dispatcher {
    tx: Option<Sender<Mutation>>,
    thread: Option<JoinHandle<()>>,
    counters: Arc<TelemetryCounters>,
}

impl Dispatcher {
    /// Start the dispatcher thread
    pub fn spawn(
        store: Arc<VehicleStateStore>,
        publishers: PublisherRegistry,
        counters: Arc<TelemetryCounters>,
    ) -> Result<Self> {
        let (tx, rx) = channel::unbounded();
        let thread_counters = Arc::clone(&counters);

        let thread = thread::Builder::new()
            .name("telemetry-dispatcher".to_string())
            .spawn(move || Self::run(rx, &store, &publishers, &thread_counters))?;

        log::info!("Dispatcher started");
        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
            counters,
        })
    }

    /// A new producer handle, or `None` once shutdown has begun
    pub fn sender(&self) -> Option<MutationSender> {
        self.tx.as_ref().map(|tx| MutationSender {
            tx: tx.clone(),
            counters: Arc::clone(&self.counters),
        })
    }

    /// Close our end of the queue and wait for the drain to finish
    ///
    /// Returns once every outstanding `MutationSender` has also been dropped and
    /// all queued mutations have been applied and published.
    pub fn shutdown(&mut self) {
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Dispatcher thread panicked");
            }
        }
    }

    fn run(
        rx: Receiver<Mutation>,
        store: &VehicleStateStore,
        publishers: &PublisherRegistry,
        counters: &TelemetryCounters,
    ) {
        // Ends when every sender is dropped and the queue is empty
        for mutation in rx.iter() {
            let Some(event) = store.apply(mutation) else {
                log::trace!("Mutation {:?} not significant", mutation);
                continue;
            };

            log::debug!("Publishing {}", event);
            publishers.publish(&event);
            counters.inc_events_published();
        }

        log::info!("Dispatcher drained, exiting");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
