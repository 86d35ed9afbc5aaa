use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use chanbus_transport::SerialIO;
use tracing::debug;

use crate::codec::{encode_frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::ring::ByteRing;
use crate::stats::TransportStats;

/// Queues encoded frames in a bounded transmit ring and drains them into a
/// [`SerialIO`] link.
///
/// A frame is either enqueued whole or rejected; the link never sees half a
/// frame followed by another frame.
pub struct FrameWriter {
    io: Arc<dyn SerialIO>,
    tx: ByteRing,
    config: FrameConfig,
    scratch: BytesMut,
    /// Wire sizes of queued frames, oldest first, for sent-frame accounting.
    in_flight: VecDeque<usize>,
    stats: Arc<TransportStats>,
}

impl FrameWriter {
    pub fn new(io: Arc<dyn SerialIO>, config: FrameConfig) -> Self {
        Self::with_stats(io, config, Arc::new(TransportStats::new()))
    }

    pub fn with_stats(
        io: Arc<dyn SerialIO>,
        config: FrameConfig,
        stats: Arc<TransportStats>,
    ) -> Self {
        Self {
            io,
            tx: ByteRing::new(config.buf_size),
            scratch: BytesMut::with_capacity(config.max_frame_len()),
            config,
            in_flight: VecDeque::new(),
            stats,
        }
    }

    /// Encode and enqueue one message.
    ///
    /// When the transmit ring is full this drains it into the link for up to
    /// the configured write timeout; if the frame still does not fit the send
    /// fails with [`FrameError::CapacityExceeded`] and nothing is enqueued.
    pub fn send(&mut self, channel: &str, payload: &[u8]) -> Result<()> {
        self.scratch.clear();
        encode_frame(channel, payload, &self.config, &mut self.scratch)?;
        let needed = self.scratch.len();

        let deadline = Instant::now() + self.config.write_timeout;
        while !self.tx.push_all(&self.scratch) {
            let now = Instant::now();
            if now >= deadline || needed > self.tx.capacity() {
                self.stats.record_capacity_rejection();
                debug!(
                    channel,
                    needed,
                    available = self.tx.room(),
                    "transmit buffer full; rejecting frame"
                );
                return Err(FrameError::CapacityExceeded {
                    needed,
                    available: self.tx.room(),
                });
            }
            if self.drain_once(deadline - now)? == 0 {
                std::thread::yield_now();
            }
        }

        self.in_flight.push_back(needed);
        self.stats.record_queued();
        self.drain_once(Duration::ZERO)?;
        Ok(())
    }

    /// Push as many queued bytes into the link as it accepts right now.
    /// Returns the number of bytes written.
    pub fn poll_flush(&mut self) -> Result<usize> {
        let mut total = 0;
        loop {
            let n = self.drain_once(Duration::ZERO)?;
            if n == 0 {
                return Ok(total);
            }
            total += n;
        }
    }

    /// Block until every queued byte is handed to the link or `timeout`
    /// elapses.
    pub fn flush(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while !self.tx.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return Err(FrameError::FlushTimeout {
                    pending: self.tx.len(),
                });
            }
            if self.drain_once(deadline - now)? == 0 {
                std::thread::yield_now();
            }
        }
        Ok(())
    }

    /// Bytes queued but not yet written to the link.
    pub fn pending(&self) -> usize {
        self.tx.len()
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn drain_once(&mut self, timeout: Duration) -> Result<usize> {
        if self.tx.is_empty() {
            return Ok(0);
        }
        let written = loop {
            match self.io.put(self.tx.front_slice(), timeout) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    break 0
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        };
        self.tx.consume(written);
        self.account_sent(written);
        Ok(written)
    }

    fn account_sent(&mut self, mut written: usize) {
        let mut completed = 0;
        while written > 0 {
            let Some(front) = self.in_flight.front_mut() else {
                break;
            };
            if written >= *front {
                written -= *front;
                self.in_flight.pop_front();
                completed += 1;
            } else {
                *front -= written;
                written = 0;
            }
        }
        if completed > 0 {
            self.stats.record_sent(completed);
        }
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter")
            .field("pending", &self.tx.len())
            .field("capacity", &self.tx.capacity())
            .field("frames_in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}
