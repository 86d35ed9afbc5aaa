use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running counters for one serial transport.
#[derive(Debug, Default)]
pub struct TransportStats {
    frames_queued: AtomicU64,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    bytes_discarded: AtomicU64,
    corrupt_frames: AtomicU64,
    capacity_rejections: AtomicU64,
}

/// Point-in-time copy of [`TransportStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Frames accepted into the transmit ring.
    pub frames_queued: u64,
    /// Frames fully handed to the I/O back end.
    pub frames_sent: u64,
    /// Frames decoded with a valid checksum.
    pub frames_received: u64,
    /// Bytes dropped while hunting for the next frame.
    pub bytes_discarded: u64,
    /// Candidate frames rejected by header or checksum validation.
    pub corrupt_frames: u64,
    /// Sends refused because the transmit ring stayed full.
    pub capacity_rejections: u64,
}

impl TransportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_queued(&self) {
        self.frames_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self, frames: u64) {
        self.frames_sent.fetch_add(frames, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self, bytes: usize) {
        self.bytes_discarded
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_corrupt(&self) {
        self.corrupt_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_capacity_rejection(&self) {
        self.capacity_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_queued: self.frames_queued.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
            corrupt_frames: self.corrupt_frames.load(Ordering::Relaxed),
            capacity_rejections: self.capacity_rejections.load(Ordering::Relaxed),
        }
    }
}
