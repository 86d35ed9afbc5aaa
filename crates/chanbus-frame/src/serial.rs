use std::sync::Arc;
use std::time::Duration;

use chanbus_transport::SerialIO;
use parking_lot::Mutex;
use tracing::debug;

use crate::codec::{Frame, FrameConfig};
use crate::error::Result;
use crate::reader::FrameReader;
use crate::stats::{StatsSnapshot, TransportStats};
use crate::writer::FrameWriter;

/// Framed, checksummed message transport over a [`SerialIO`] link.
///
/// Receive and transmit sides lock independently, so one thread can sit in
/// [`recv`](Self::recv) while others [`send`](Self::send).
pub struct SerialTransport {
    reader: Mutex<FrameReader>,
    writer: Mutex<FrameWriter>,
    config: FrameConfig,
    stats: Arc<TransportStats>,
}

impl SerialTransport {
    /// Create a transport over `io`. Fails if `config` cannot hold a
    /// maximum-size frame.
    pub fn new(io: Arc<dyn SerialIO>, config: FrameConfig) -> Result<Self> {
        config.validate()?;
        let stats = Arc::new(TransportStats::new());
        debug!(
            mtu = config.mtu,
            buf_size = config.buf_size,
            "serial transport created"
        );
        Ok(Self {
            reader: Mutex::new(FrameReader::with_stats(
                Arc::clone(&io),
                config.clone(),
                Arc::clone(&stats),
            )),
            writer: Mutex::new(FrameWriter::with_stats(
                io,
                config.clone(),
                Arc::clone(&stats),
            )),
            config,
            stats,
        })
    }

    /// Convenience constructor taking the link by value.
    pub fn from_io<T: SerialIO + 'static>(io: T, config: FrameConfig) -> Result<Self> {
        Self::new(Arc::new(io), config)
    }

    /// Frame and enqueue one message on `channel`.
    pub fn send(&self, channel: &str, payload: &[u8]) -> Result<()> {
        self.writer.lock().send(channel, payload)
    }

    /// Receive the next frame, waiting up to `timeout`.
    pub fn recv(&self, timeout: Duration) -> Result<Option<Frame>> {
        self.reader.lock().read_frame(timeout)
    }

    /// Block until the transmit ring is empty or `timeout` elapses.
    pub fn flush(&self, timeout: Duration) -> Result<()> {
        self.writer.lock().flush(timeout)
    }

    /// Push queued bytes without blocking. Skips the attempt entirely when a
    /// sender holds the transmit side.
    pub fn poll_flush(&self) -> Result<usize> {
        match self.writer.try_lock() {
            Some(mut writer) => writer.poll_flush(),
            None => Ok(0),
        }
    }

    /// Bytes waiting in the transmit ring.
    pub fn pending_tx(&self) -> usize {
        self.writer.lock().pending()
    }

    pub fn mtu(&self) -> usize {
        self.config.mtu
    }

    pub fn buf_size(&self) -> usize {
        self.config.buf_size
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}
