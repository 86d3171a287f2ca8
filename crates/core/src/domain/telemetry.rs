//! Compression telemetry produced on the audio thread
//!
//! Each realtime slave may carry a [`CompressionTelemetrySink`]. After every
//! processed block it pushes one [`CompressionPacket`] describing how much the
//! engine wanted to compress and how much it actually did.

use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};

/// Compression summary of one processed block
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CompressionPacket {
    /// Position of the block's first sample on the slave's timeline
    pub index_of_first_sample: i64,
    /// Gain change the static curve asks for at the block's peak, in dB
    pub target_compression_db: f32,
    /// Gain change the engine applied at the block's peak, in dB
    pub actual_compression_db: f32,
}

/// Append-only destination for packets
///
/// `push` is called from the audio thread: implementations must not block,
/// lock or allocate, and may drop packets when full.
pub trait CompressionTelemetrySink: Send + Sync {
    fn push(&self, packet: CompressionPacket);
}

/// Bounded lock-free packet queue with drop-oldest overflow
///
/// The simplest sink: one producer (a realtime slave) and one consumer that
/// drains at its own pace.
pub struct PacketQueue {
    queue: ArrayQueue<CompressionPacket>,
}

impl PacketQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Remove and return the oldest packet
    pub fn pop(&self) -> Option<CompressionPacket> {
        self.queue.pop()
    }

    /// Move every queued packet into `out`, oldest first; returns the count
    pub fn drain_into(&self, out: &mut Vec<CompressionPacket>) -> usize {
        let before = out.len();
        while let Some(packet) = self.queue.pop() {
            out.push(packet);
        }
        out.len() - before
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

impl CompressionTelemetrySink for PacketQueue {
    fn push(&self, packet: CompressionPacket) {
        // Overwrites the oldest packet rather than waiting for the reader
        self.queue.force_push(packet);
    }
}

impl std::fmt::Debug for PacketQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
