//! Lock-free multi-subscriber telemetry broadcast
//!
//! The audio thread publishes [`CompressionPacket`]s; visualizers each hold a
//! [`Subscription`] with its own bounded queue.
//!
//! Performance characteristics:
//! - Lock-free and allocation-free on the publishing side
//! - Fixed slot array, so publishing with no subscriber is a short scan
//! - Cache-padded slot flags to prevent false sharing between cores
//! - A full subscriber queue loses its oldest packet; the publisher never waits

use compand_core::domain::config::TelemetryConfig;
use compand_core::domain::telemetry::{CompressionPacket, CompressionTelemetrySink};
use crossbeam::queue::ArrayQueue;
use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur when subscribing to telemetry
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("All {0} telemetry subscriber slots are in use")]
    NoFreeSlot(usize),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;

/// One subscriber slot: claimed flag plus the subscriber's queue
struct Slot {
    active: CachePadded<AtomicBool>,
    queue: ArrayQueue<CompressionPacket>,
}

impl Slot {
    fn new(capacity: usize) -> Self {
        Self {
            active: CachePadded::new(AtomicBool::new(false)),
            queue: ArrayQueue::new(capacity),
        }
    }

    fn clear(&self) {
        while self.queue.pop().is_some() {}
    }
}

struct Shared {
    slots: Box<[Slot]>,
    published: CachePadded<AtomicU64>,
}

/// Broadcasts compression packets to up to `max_subscribers` readers
///
/// Cloning is cheap and every clone publishes into the same slots.
#[derive(Clone)]
pub struct TelemetryPublisher {
    shared: Arc<Shared>,
}

impl TelemetryPublisher {
    /// Create a publisher with `max_subscribers` slots of `queue_capacity`
    /// packets each
    pub fn new(max_subscribers: usize, queue_capacity: usize) -> Self {
        let capacity = queue_capacity.max(1);
        let slots = (0..max_subscribers.max(1))
            .map(|_| Slot::new(capacity))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shared: Arc::new(Shared {
                slots,
                published: CachePadded::new(AtomicU64::new(0)),
            }),
        }
    }

    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self::new(config.max_subscribers, config.queue_capacity)
    }

    /// Claim a free slot
    ///
    /// Packets published before this returns are not delivered to the new
    /// subscription.
    pub fn subscribe(&self) -> Result<Subscription> {
        for (index, slot) in self.shared.slots.iter().enumerate() {
            if slot
                .active
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // Leftovers from the previous holder of this slot
                slot.clear();
                debug!(slot = index, "Telemetry subscriber added");
                return Ok(Subscription {
                    shared: Arc::clone(&self.shared),
                    slot: index,
                });
            }
        }

        warn!(max = self.max_subscribers(), "No free telemetry slot");
        Err(TelemetryError::NoFreeSlot(self.max_subscribers()))
    }

    /// Type-erased handle for [`CompressorInstance::realtime_add_processor`]
    ///
    /// [`CompressorInstance::realtime_add_processor`]: compand_core::domain::CompressorInstance::realtime_add_processor
    pub fn sink(&self) -> Arc<dyn CompressionTelemetrySink> {
        Arc::new(self.clone())
    }

    pub fn max_subscribers(&self) -> usize {
        self.shared.slots.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared
            .slots
            .iter()
            .filter(|slot| slot.active.load(Ordering::Acquire))
            .count()
    }

    /// Packets published since creation, delivered or not
    pub fn published_count(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }
}

impl CompressionTelemetrySink for TelemetryPublisher {
    fn push(&self, packet: CompressionPacket) {
        self.shared.published.fetch_add(1, Ordering::Relaxed);
        for slot in self.shared.slots.iter() {
            if slot.active.load(Ordering::Acquire) {
                slot.queue.force_push(packet);
            }
        }
    }
}

impl std::fmt::Debug for TelemetryPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryPublisher")
            .field("subscribers", &self.subscriber_count())
            .field("max_subscribers", &self.max_subscribers())
            .field("published", &self.published_count())
            .finish()
    }
}

/// A reader's claim on one publisher slot; released on drop
pub struct Subscription {
    shared: Arc<Shared>,
    slot: usize,
}

impl Subscription {
    fn slot(&self) -> &Slot {
        &self.shared.slots[self.slot]
    }

    /// Oldest pending packet, if any
    pub fn try_recv(&self) -> Option<CompressionPacket> {
        self.slot().queue.pop()
    }

    /// Move every pending packet into `out`, oldest first; returns the count
    pub fn drain_into(&self, out: &mut Vec<CompressionPacket>) -> usize {
        let before = out.len();
        while let Some(packet) = self.slot().queue.pop() {
            out.push(packet);
        }
        out.len() - before
    }

    pub fn len(&self) -> usize {
        self.slot().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slot().queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.slot().queue.capacity()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let slot = self.slot();
        slot.active.store(false, Ordering::Release);
        slot.clear();
        debug!(slot = self.slot, "Telemetry subscriber removed");
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("slot", &self.slot)
            .field("pending", &self.len())
            .finish()
    }
}
