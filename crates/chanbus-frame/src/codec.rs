use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use crate::checksum::Fletcher16;
use crate::error::{FrameError, Result};

/// Sync marker that opens every frame.
pub const SYNC: [u8; 2] = [0xCC, 0x00];

/// Frame header: sync (2) + channel length (1) + payload length (4) = 7 bytes.
pub const HEADER_SIZE: usize = 7;

/// Trailing checksum width.
pub const CHECKSUM_SIZE: usize = 2;

/// Fixed bytes added to every frame on top of channel and payload.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + CHECKSUM_SIZE;

/// Longest channel name that can be framed.
pub const CHANNEL_MAXLEN: usize = 32;

/// Default maximum payload size: 16 KiB.
pub const DEFAULT_MTU: usize = 16 * 1024;

/// Default size of each transport ring buffer: 128 KiB.
pub const DEFAULT_BUF_SIZE: usize = 128 * 1024;

/// A message routed by channel name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The channel this message was published on.
    pub channel: String,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(channel: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        FRAME_OVERHEAD + self.channel.len() + self.payload.len()
    }
}

/// Configuration shared by both ends of a serial link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 KiB.
    pub mtu: usize,
    /// Capacity of the receive and transmit rings in bytes. Default: 128 KiB.
    pub buf_size: usize,
    /// How long a receive call may block waiting for the first byte.
    /// `Duration::ZERO` makes receives non-blocking.
    pub read_timeout: Duration,
    /// How long a send may block waiting for transmit capacity.
    pub write_timeout: Duration,
}

impl FrameConfig {
    /// Create a configuration with explicit MTU and buffer size.
    pub fn new(mtu: usize, buf_size: usize) -> Self {
        Self {
            mtu,
            buf_size,
            ..Self::default()
        }
    }

    /// Largest frame this configuration can produce.
    pub fn max_frame_len(&self) -> usize {
        FRAME_OVERHEAD + CHANNEL_MAXLEN + self.mtu
    }

    /// Check that the buffers can hold at least one maximum-size frame.
    pub fn validate(&self) -> Result<()> {
        if self.mtu == 0 {
            return Err(FrameError::InvalidConfig("mtu must be positive".into()));
        }
        if self.mtu > u32::MAX as usize {
            return Err(FrameError::InvalidConfig(format!(
                "mtu {} exceeds the 32-bit length field",
                self.mtu
            )));
        }
        if self.buf_size < self.max_frame_len() {
            return Err(FrameError::InvalidConfig(format!(
                "buf_size {} cannot hold a maximum frame of {} bytes",
                self.buf_size,
                self.max_frame_len()
            )));
        }
        Ok(())
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            buf_size: DEFAULT_BUF_SIZE,
            read_timeout: Duration::from_millis(100),
            write_timeout: Duration::from_secs(1),
        }
    }
}

/// Outcome of [`decode_frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A whole frame sits at the front of the buffer.
    Complete { frame: Frame, consumed: usize },
    /// More bytes are needed; nothing should be consumed.
    Incomplete,
    /// The front of the buffer cannot be a frame; drop `discard` bytes and retry.
    Invalid { discard: usize },
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────┬──────────┬───────────┬───────────┬───────────┬──────────┐
/// │ Sync (2B) │ ChanLen  │ DataLen   │ Channel   │ Payload   │ Checksum │
/// │ 0xCC 0x00 │ (1B)     │ (4B BE)   │ (ChanLen) │ (DataLen) │ (2B BE)  │
/// └───────────┴──────────┴───────────┴───────────┴───────────┴──────────┘
/// ```
/// The checksum is Fletcher-16 over everything between sync and checksum.
pub fn encode_frame(
    channel: &str,
    payload: &[u8],
    config: &FrameConfig,
    dst: &mut BytesMut,
) -> Result<()> {
    if channel.is_empty() || channel.len() > CHANNEL_MAXLEN {
        return Err(FrameError::InvalidChannel {
            len: channel.len(),
            max: CHANNEL_MAXLEN,
        });
    }
    if payload.len() > config.mtu {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: config.mtu,
        });
    }

    let start = dst.len();
    dst.reserve(FRAME_OVERHEAD + channel.len() + payload.len());
    dst.put_slice(&SYNC);
    dst.put_u8(channel.len() as u8);
    dst.put_u32(payload.len() as u32);
    dst.put_slice(channel.as_bytes());
    dst.put_slice(payload);

    let mut sum = Fletcher16::new();
    sum.update(&dst[start + SYNC.len()..]);
    dst.put_u16(sum.finish());
    Ok(())
}

/// Decode the frame at the front of `src` without consuming anything.
///
/// Safe to call repeatedly on a growing buffer: `Incomplete` never implies
/// the bytes seen so far are bad.
pub fn decode_frame(src: &[u8], config: &FrameConfig) -> Decoded {
    match sync_offset(src) {
        None if src.is_empty() => return Decoded::Incomplete,
        None => return Decoded::Invalid { discard: src.len() },
        Some(0) => {}
        Some(offset) => return Decoded::Invalid { discard: offset },
    }

    if src.len() < HEADER_SIZE {
        return Decoded::Incomplete;
    }
    let Some(header) = parse_header(src, config) else {
        return Decoded::Invalid { discard: 1 };
    };

    let frame_len = header.frame_len();
    if src.len() < frame_len {
        return Decoded::Incomplete;
    }
    match build_frame(&src[..frame_len], header) {
        Some(frame) => Decoded::Complete {
            frame,
            consumed: frame_len,
        },
        None => Decoded::Invalid { discard: 1 },
    }
}

/// Lengths carried in a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) chan_len: usize,
    pub(crate) data_len: usize,
}

impl Header {
    pub(crate) fn body_end(&self) -> usize {
        HEADER_SIZE + self.chan_len + self.data_len
    }

    pub(crate) fn frame_len(&self) -> usize {
        self.body_end() + CHECKSUM_SIZE
    }
}

/// Index of the first byte that could open a frame.
///
/// A trailing lone `SYNC[0]` counts: its partner may still be in flight.
pub(crate) fn sync_offset(src: &[u8]) -> Option<usize> {
    src.iter()
        .enumerate()
        .position(|(i, &byte)| {
            byte == SYNC[0] && src.get(i + 1).is_none_or(|&next| next == SYNC[1])
        })
}

/// Parse the header at the front of `src`. Expects `src[..2] == SYNC` and at
/// least [`HEADER_SIZE`] bytes.
pub(crate) fn parse_header(src: &[u8], config: &FrameConfig) -> Option<Header> {
    let chan_len = src[2] as usize;
    let data_len = u32::from_be_bytes([src[3], src[4], src[5], src[6]]) as usize;

    if chan_len == 0 || chan_len > CHANNEL_MAXLEN || data_len > config.mtu {
        return None;
    }
    Some(Header { chan_len, data_len })
}

/// Verify the checksum of a complete frame and split out channel and payload.
pub(crate) fn build_frame(src: &[u8], header: Header) -> Option<Frame> {
    let body_end = header.body_end();
    let expected = u16::from_be_bytes([src[body_end], src[body_end + 1]]);

    let mut sum = Fletcher16::new();
    sum.update(&src[SYNC.len()..body_end]);
    if sum.finish() != expected {
        return None;
    }

    let chan_end = HEADER_SIZE + header.chan_len;
    let channel = std::str::from_utf8(&src[HEADER_SIZE..chan_end]).ok()?;
    Some(Frame {
        channel: channel.to_owned(),
        payload: Bytes::copy_from_slice(&src[chan_end..body_end]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(channel: &str, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(channel, payload, &FrameConfig::default(), &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let payload = b"hello, chanbus!";
        let buf = encoded("STATUS", payload);

        assert_eq!(buf.len(), FRAME_OVERHEAD + "STATUS".len() + payload.len());

        match decode_frame(&buf, &FrameConfig::default()) {
            Decoded::Complete { frame, consumed } => {
                assert_eq!(frame.channel, "STATUS");
                assert_eq!(frame.payload.as_ref(), payload);
                assert_eq!(consumed, buf.len());
            }
            other => panic!("expected complete frame, got {other:?}"),
        }
    }

    #[test]
    fn test_roundtrip_at_mtu_boundary() {
        let config = FrameConfig::new(64, 1024);
        let payload = vec![0x5A; 64];
        let mut buf = BytesMut::new();
        encode_frame("EDGE", &payload, &config, &mut buf).unwrap();

        match decode_frame(&buf, &config) {
            Decoded::Complete { frame, consumed } => {
                assert_eq!(frame.payload.len(), 64);
                assert_eq!(consumed, buf.len());
            }
            other => panic!("expected complete frame, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_payload() {
        let buf = encoded("PING", b"");
        match decode_frame(&buf, &FrameConfig::default()) {
            Decoded::Complete { frame, .. } => assert!(frame.payload.is_empty()),
            other => panic!("expected complete frame, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let config = FrameConfig::new(8, 1024);
        let mut buf = BytesMut::new();
        let err = encode_frame("X", b"123456789", &config, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 9, max: 8 }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_rejects_bad_channel_names() {
        let mut buf = BytesMut::new();
        let config = FrameConfig::default();
        assert!(matches!(
            encode_frame("", b"x", &config, &mut buf),
            Err(FrameError::InvalidChannel { len: 0, .. })
        ));
        let long = "c".repeat(CHANNEL_MAXLEN + 1);
        assert!(matches!(
            encode_frame(&long, b"x", &config, &mut buf),
            Err(FrameError::InvalidChannel { .. })
        ));
    }

    #[test]
    fn test_every_truncation_is_incomplete() {
        let buf = encoded("TRUNC", b"partial frame body");
        for cut in 0..buf.len() {
            assert_eq!(
                decode_frame(&buf[..cut], &FrameConfig::default()),
                Decoded::Incomplete,
                "prefix of {cut} bytes"
            );
        }
    }

    #[test]
    fn test_leading_noise_is_discarded_up_to_sync() {
        let mut wire = BytesMut::from(&b"\x01\x02\x03"[..]);
        wire.extend_from_slice(&encoded("A", b"x"));

        assert_eq!(
            decode_frame(&wire, &FrameConfig::default()),
            Decoded::Invalid { discard: 3 }
        );
    }

    #[test]
    fn test_noise_without_sync_discards_everything() {
        let noise = [0x10, 0x20, 0x30, 0x40];
        assert_eq!(
            decode_frame(&noise, &FrameConfig::default()),
            Decoded::Invalid { discard: 4 }
        );
    }

    #[test]
    fn test_checksum_mismatch_discards_one_byte() {
        let mut buf = encoded("CHK", b"payload");
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;

        assert_eq!(
            decode_frame(&buf, &FrameConfig::default()),
            Decoded::Invalid { discard: 1 }
        );
    }

    #[test]
    fn test_payload_length_above_mtu_is_invalid() {
        let mut buf = BytesMut::new();
        buf.put_slice(&SYNC);
        buf.put_u8(1);
        buf.put_u32(1_000_000);

        assert_eq!(
            decode_frame(&buf, &FrameConfig::default()),
            Decoded::Invalid { discard: 1 }
        );
    }

    #[test]
    fn test_zero_channel_length_is_invalid() {
        let mut buf = BytesMut::new();
        buf.put_slice(&SYNC);
        buf.put_u8(0);
        buf.put_u32(0);

        assert_eq!(
            decode_frame(&buf, &FrameConfig::default()),
            Decoded::Invalid { discard: 1 }
        );
    }

    #[test]
    fn test_resync_skips_corrupted_frame_byte_by_byte() {
        let mut corrupted = encoded("FIRST", b"first payload");
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0x01;
        let good = encoded("SECOND", b"second payload");

        let mut wire = corrupted.clone();
        wire.extend_from_slice(&good);

        let config = FrameConfig::default();
        let mut offset = 0;
        loop {
            match decode_frame(&wire[offset..], &config) {
                Decoded::Invalid { discard } => offset += discard,
                Decoded::Complete { frame, consumed } => {
                    assert_eq!(offset, corrupted.len());
                    assert_eq!(frame.channel, "SECOND");
                    assert_eq!(frame.payload.as_ref(), b"second payload");
                    assert_eq!(offset + consumed, wire.len());
                    break;
                }
                Decoded::Incomplete => panic!("stalled at offset {offset}"),
            }
        }
    }

    #[test]
    fn test_multiple_frames_back_to_back() {
        let mut wire = encoded("ONE", b"first");
        wire.extend_from_slice(&encoded("TWO", b"second"));
        let config = FrameConfig::default();

        let Decoded::Complete { frame, consumed } = decode_frame(&wire, &config) else {
            panic!("first frame should decode");
        };
        assert_eq!(frame.channel, "ONE");

        let Decoded::Complete { frame, consumed: rest } = decode_frame(&wire[consumed..], &config)
        else {
            panic!("second frame should decode");
        };
        assert_eq!(frame.channel, "TWO");
        assert_eq!(frame.payload.as_ref(), b"second");
        assert_eq!(consumed + rest, wire.len());
    }

    #[test]
    fn test_config_validation() {
        assert!(FrameConfig::default().validate().is_ok());
        assert!(FrameConfig::new(16384, 131072).validate().is_ok());
        assert!(FrameConfig::new(0, 1024).validate().is_err());
        assert!(FrameConfig::new(1024, 1024).validate().is_err());
    }

    #[test]
    fn test_frame_wire_size() {
        let frame = Frame::new("TEST", Bytes::from_static(b"data"));
        assert_eq!(frame.wire_size(), encoded("TEST", b"data").len());
    }
}
