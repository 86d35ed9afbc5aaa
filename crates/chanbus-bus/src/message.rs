use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use chanbus_frame::Frame;
use chanbus_types::{Fingerprint, MessageType, Record, TypeRegistry};

use crate::error::Result;

/// A message as seen by subscribers.
///
/// Subscribers receive it by reference for the duration of the callback and
/// clone it if they need to keep it. Cloning is cheap: the payload is
/// reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel: String,
    pub payload: Bytes,
    /// Type fingerprint read from the first 8 payload bytes, if present.
    pub fingerprint: Option<Fingerprint>,
    /// Receive time in microseconds since the Unix epoch.
    pub recv_utime: Option<u64>,
}

impl Message {
    pub fn new(channel: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            channel: channel.into(),
            fingerprint: Fingerprint::from_payload(&payload),
            payload,
            recv_utime: None,
        }
    }

    /// Wrap a decoded frame, stamping the receive time.
    pub fn received(frame: Frame) -> Self {
        let mut message = Self::new(frame.channel, frame.payload);
        message.recv_utime = now_utime();
        message
    }

    /// Decode with whichever registered type the fingerprint names.
    pub fn decode_with(&self, registry: &TypeRegistry) -> Result<Record> {
        Ok(registry.decode(&self.payload)?)
    }

    /// Decode as a known type.
    pub fn decode_as<T: MessageType>(&self) -> Result<T> {
        Ok(T::decode(&self.payload)?)
    }
}

fn now_utime() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|elapsed| u64::try_from(elapsed.as_micros()).ok())
}
