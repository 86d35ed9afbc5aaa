use std::sync::Arc;

use tracing::debug;

use crate::codec::{
    build_frame, parse_header, sync_offset, Frame, FrameConfig, Header, HEADER_SIZE, SYNC,
};
use crate::ring::ByteRing;
use crate::stats::TransportStats;

/// Where the decoder is within the current candidate frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Dropping bytes until a sync marker sits at the front of the ring.
    SeekingSync,
    /// Sync found; waiting for the channel and payload length fields.
    ReadingLength,
    /// Header accepted; waiting for the channel name and payload.
    ReadingPayload { chan_len: usize, data_len: usize },
    /// Body buffered; waiting for the trailing checksum.
    ReadingChecksum { chan_len: usize, data_len: usize },
}

/// Incremental receive-side frame decoder over a bounded ring.
///
/// Bytes go in through [`feed`](Self::feed) in whatever chunks the link
/// delivers; [`decode`](Self::decode) yields frames as soon as they are
/// complete. A rejected candidate frame costs exactly one byte before the
/// search for the next sync marker resumes.
#[derive(Debug)]
pub struct FrameDecoder {
    rx: ByteRing,
    config: FrameConfig,
    state: DecodeState,
    stats: Arc<TransportStats>,
}

impl FrameDecoder {
    pub fn new(config: FrameConfig) -> Self {
        Self::with_stats(config, Arc::new(TransportStats::new()))
    }

    /// Create a decoder that records into shared transport counters.
    pub fn with_stats(config: FrameConfig, stats: Arc<TransportStats>) -> Self {
        Self {
            rx: ByteRing::new(config.buf_size),
            config,
            state: DecodeState::SeekingSync,
            stats,
        }
    }

    /// Buffer received bytes. Returns how many fit; the rest must be offered
    /// again after [`decode`](Self::decode) frees space.
    pub fn feed(&mut self, data: &[u8]) -> usize {
        self.rx.push_slice(data)
    }

    /// Free space in the receive ring.
    pub fn room(&self) -> usize {
        self.rx.room()
    }

    /// Bytes buffered but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    pub fn stats(&self) -> &Arc<TransportStats> {
        &self.stats
    }

    /// Drop buffered bytes and start over at the next sync marker.
    pub fn reset(&mut self) {
        self.rx.clear();
        self.state = DecodeState::SeekingSync;
    }

    /// Extract the next complete, checksum-valid frame, if one is buffered.
    pub fn decode(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                DecodeState::SeekingSync => {
                    let buffered = self.rx.make_contiguous();
                    let skip = match sync_offset(buffered) {
                        Some(offset) => offset,
                        None => buffered.len(),
                    };
                    if skip > 0 {
                        self.discard(skip);
                    }
                    if self.rx.len() < SYNC.len() {
                        return None;
                    }
                    self.state = DecodeState::ReadingLength;
                }
                DecodeState::ReadingLength => {
                    if self.rx.len() < HEADER_SIZE {
                        return None;
                    }
                    match parse_header(self.rx.make_contiguous(), &self.config) {
                        Some(Header { chan_len, data_len }) => {
                            self.state = DecodeState::ReadingPayload { chan_len, data_len };
                        }
                        None => self.reject("header"),
                    }
                }
                DecodeState::ReadingPayload { chan_len, data_len } => {
                    if self.rx.len() < (Header { chan_len, data_len }).body_end() {
                        return None;
                    }
                    self.state = DecodeState::ReadingChecksum { chan_len, data_len };
                }
                DecodeState::ReadingChecksum { chan_len, data_len } => {
                    let header = Header { chan_len, data_len };
                    let frame_len = header.frame_len();
                    if self.rx.len() < frame_len {
                        return None;
                    }
                    let buffered = self.rx.make_contiguous();
                    match build_frame(&buffered[..frame_len], header) {
                        Some(frame) => {
                            self.rx.consume(frame_len);
                            self.state = DecodeState::SeekingSync;
                            self.stats.record_received();
                            return Some(frame);
                        }
                        None => self.reject("checksum"),
                    }
                }
            }
        }
    }

    fn discard(&mut self, n: usize) {
        self.rx.consume(n);
        self.stats.record_discarded(n);
    }

    fn reject(&mut self, stage: &'static str) {
        debug!(stage, buffered = self.rx.len(), "dropping corrupt frame candidate");
        self.stats.record_corrupt();
        self.discard(1);
        self.state = DecodeState::SeekingSync;
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::codec::encode_frame;

    fn wire(frames: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (channel, payload) in frames {
            encode_frame(channel, payload, &FrameConfig::default(), &mut buf).unwrap();
        }
        buf.to_vec()
    }

    fn drain(decoder: &mut FrameDecoder) -> Vec<Frame> {
        std::iter::from_fn(|| decoder.decode()).collect()
    }

    #[test]
    fn decodes_whole_buffer() {
        let mut decoder = FrameDecoder::new(FrameConfig::default());
        decoder.feed(&wire(&[("A", b"one".as_slice()), ("B", b"two".as_slice())]));

        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].channel, "A");
        assert_eq!(frames[1].payload.as_ref(), b"two");
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.stats().snapshot().frames_received, 2);
    }

    #[test]
    fn chunking_does_not_change_output() {
        let bytes = wire(&[
            ("STATUS", b"first".as_slice()),
            ("CMD", b"".as_slice()),
            ("TELEMETRY", [0xCC, 0x00, 0xCC, 0x00, 7].as_slice()),
        ]);

        for chunk in [1usize, 2, 3, 7, 64] {
            let mut decoder = FrameDecoder::new(FrameConfig::default());
            let mut frames = Vec::new();
            for piece in bytes.chunks(chunk) {
                assert_eq!(decoder.feed(piece), piece.len());
                frames.extend(drain(&mut decoder));
            }
            let channels: Vec<&str> = frames.iter().map(|f| f.channel.as_str()).collect();
            assert_eq!(channels, ["STATUS", "CMD", "TELEMETRY"], "chunk size {chunk}");
            assert_eq!(frames[2].payload.as_ref(), &[0xCC, 0x00, 0xCC, 0x00, 7]);
            assert_eq!(decoder.stats().snapshot().corrupt_frames, 0);
        }
    }

    #[test]
    fn states_advance_as_bytes_arrive() {
        let bytes = wire(&[("CH", b"data".as_slice())]);
        let mut decoder = FrameDecoder::new(FrameConfig::default());

        decoder.feed(&bytes[..2]);
        assert!(decoder.decode().is_none());
        assert_eq!(decoder.state(), DecodeState::ReadingLength);

        decoder.feed(&bytes[2..HEADER_SIZE]);
        assert!(decoder.decode().is_none());
        assert_eq!(
            decoder.state(),
            DecodeState::ReadingPayload {
                chan_len: 2,
                data_len: 4
            }
        );

        decoder.feed(&bytes[HEADER_SIZE..bytes.len() - 1]);
        assert!(decoder.decode().is_none());
        assert!(matches!(decoder.state(), DecodeState::ReadingChecksum { .. }));

        decoder.feed(&bytes[bytes.len() - 1..]);
        assert_eq!(decoder.decode().unwrap().channel, "CH");
        assert_eq!(decoder.state(), DecodeState::SeekingSync);
    }

    #[test]
    fn noise_before_frame_is_discarded() {
        let mut decoder = FrameDecoder::new(FrameConfig::default());
        decoder.feed(&[0x11, 0x22, 0xCC, 0x33]);
        decoder.feed(&wire(&[("OK", b"yes".as_slice())]));

        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].channel, "OK");
        assert_eq!(decoder.stats().snapshot().bytes_discarded, 4);
    }

    #[test]
    fn corrupted_frame_costs_only_itself() {
        let mut bad = wire(&[("FIRST", b"payload one".as_slice())]);
        bad[HEADER_SIZE + 2] ^= 0x40;
        let good = wire(&[("SECOND", b"payload two".as_slice())]);

        let mut decoder = FrameDecoder::new(FrameConfig::default());
        decoder.feed(&bad);
        decoder.feed(&good);

        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].channel, "SECOND");

        let stats = decoder.stats().snapshot();
        assert_eq!(stats.bytes_discarded, bad.len() as u64);
        assert!(stats.corrupt_frames >= 1);
    }

    #[test]
    fn oversized_length_field_is_rejected() {
        let config = FrameConfig::new(16, 1024);
        let mut decoder = FrameDecoder::new(config);
        decoder.feed(&[0xCC, 0x00, 0x01, 0x00, 0x00, 0x10, 0x00]);

        assert!(decoder.decode().is_none());
        assert_eq!(decoder.stats().snapshot().corrupt_frames, 1);
        assert_eq!(decoder.state(), DecodeState::SeekingSync);
    }

    #[test]
    fn feed_respects_ring_capacity() {
        let config = FrameConfig::new(16, 64);
        let mut decoder = FrameDecoder::new(config);
        assert_eq!(decoder.feed(&[0u8; 100]), 64);
        assert_eq!(decoder.room(), 0);

        assert!(decoder.decode().is_none());
        assert_eq!(decoder.room(), 64);
    }

    #[test]
    fn reset_clears_partial_frame() {
        let bytes = wire(&[("CH", b"data".as_slice())]);
        let mut decoder = FrameDecoder::new(FrameConfig::default());
        decoder.feed(&bytes[..5]);
        decoder.decode();

        decoder.reset();
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.state(), DecodeState::SeekingSync);

        decoder.feed(&bytes);
        assert_eq!(decoder.decode().unwrap().payload.as_ref(), b"data");
    }
}
