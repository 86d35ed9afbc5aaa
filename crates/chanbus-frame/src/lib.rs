//! Checksummed message framing over unreliable byte streams.
//!
//! Every message travels as one frame:
//! - A 2-byte sync marker (`0xCC 0x00`) the receiver hunts for after noise
//! - A 1-byte channel length and a 4-byte big-endian payload length
//! - The channel name and the payload
//! - A 2-byte big-endian Fletcher-16 checksum over everything after the sync
//!
//! A corrupted frame is dropped one byte at a time until the receiver locks
//! back onto a sync marker, so a single bad frame never costs the next one.

pub mod checksum;
pub mod codec;
pub mod decoder;
pub mod error;
pub mod reader;
pub mod ring;
pub mod serial;
pub mod stats;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Decoded, Frame, FrameConfig, CHANNEL_MAXLEN, CHECKSUM_SIZE,
    DEFAULT_BUF_SIZE, DEFAULT_MTU, FRAME_OVERHEAD, HEADER_SIZE, SYNC,
};
pub use decoder::{DecodeState, FrameDecoder};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use ring::ByteRing;
pub use serial::SerialTransport;
pub use stats::{StatsSnapshot, TransportStats};
pub use writer::FrameWriter;
