use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use chanbus_transport::SerialIO;

use crate::codec::{Frame, FrameConfig};
use crate::decoder::FrameDecoder;
use crate::error::{FrameError, Result};
use crate::stats::TransportStats;

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Pulls bytes from a [`SerialIO`] link and yields complete frames.
///
/// Each call blocks at most once: the first `get` waits up to the caller's
/// timeout, after which whatever else is already available is drained
/// without blocking.
pub struct FrameReader {
    io: Arc<dyn SerialIO>,
    decoder: FrameDecoder,
    chunk: Vec<u8>,
}

impl FrameReader {
    pub fn new(io: Arc<dyn SerialIO>, config: FrameConfig) -> Self {
        Self::with_stats(io, config, Arc::new(TransportStats::new()))
    }

    pub fn with_stats(
        io: Arc<dyn SerialIO>,
        config: FrameConfig,
        stats: Arc<TransportStats>,
    ) -> Self {
        let chunk = vec![0u8; READ_CHUNK_SIZE.min(config.buf_size)];
        Self {
            io,
            decoder: FrameDecoder::with_stats(config, stats),
            chunk,
        }
    }

    /// Read the next frame, waiting up to `timeout` for the link to produce
    /// bytes. `Ok(None)` means no complete frame arrived in time.
    pub fn read_frame(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        let mut wait = timeout;
        loop {
            if let Some(frame) = self.decoder.decode() {
                return Ok(Some(frame));
            }
            if self.fill(wait)? == 0 {
                return Ok(None);
            }
            wait = Duration::ZERO;
        }
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.decoder.buffered()
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    fn fill(&mut self, timeout: Duration) -> Result<usize> {
        let want = self.decoder.room().min(self.chunk.len());
        if want == 0 {
            return Ok(0);
        }
        loop {
            match self.io.get(&mut self.chunk[..want], timeout) {
                Ok(n) => {
                    let taken = self.decoder.feed(&self.chunk[..n]);
                    debug_assert_eq!(taken, n);
                    return Ok(n);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(0)
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}

impl std::fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader")
            .field("decoder", &self.decoder)
            .finish_non_exhaustive()
    }
}
