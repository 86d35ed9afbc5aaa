use std::marker::PhantomData;

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, TypeError};
use crate::fingerprint::{Fingerprint, FINGERPRINT_SIZE};

/// Structured view of a decoded payload.
pub type Record = serde_json::Value;

/// Turns fingerprinted payloads of one type into [`Record`]s.
pub trait TypeDecoder: Send + Sync {
    fn type_name(&self) -> &str;

    fn fingerprint(&self) -> Fingerprint;

    /// Decode a whole payload, fingerprint prefix included.
    fn decode(&self, payload: &[u8]) -> Result<Record>;
}

/// A statically known message type.
///
/// The default body encoding is JSON after the fingerprint prefix. Types
/// with a binary layout override [`encode_body`](Self::encode_body) and
/// [`decode_body`](Self::decode_body).
pub trait MessageType: Serialize + DeserializeOwned {
    const FINGERPRINT: Fingerprint;
    const TYPE_NAME: &'static str;

    fn encode_body(&self, dst: &mut BytesMut) -> Result<()> {
        serde_json::to_writer(dst.writer(), self)?;
        Ok(())
    }

    fn decode_body(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|err| TypeError::Decode {
            type_name: Self::TYPE_NAME.to_string(),
            reason: err.to_string(),
        })
    }

    /// Encode to a payload carrying the fingerprint prefix.
    fn encode(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(64);
        dst.put_slice(&Self::FINGERPRINT.to_bytes());
        self.encode_body(&mut dst)?;
        Ok(dst.freeze())
    }

    /// Decode a payload, checking that its fingerprint names this type.
    fn decode(payload: &[u8]) -> Result<Self> {
        let found = Fingerprint::from_payload(payload)
            .ok_or(TypeError::MissingFingerprint { len: payload.len() })?;
        if found != Self::FINGERPRINT {
            return Err(TypeError::FingerprintMismatch {
                type_name: Self::TYPE_NAME,
                expected: Self::FINGERPRINT,
                found,
            });
        }
        Self::decode_body(&payload[FINGERPRINT_SIZE..])
    }
}

/// [`TypeDecoder`] for any [`MessageType`].
pub struct TypedDecoder<T> {
    _type: PhantomData<fn() -> T>,
}

impl<T: MessageType> TypedDecoder<T> {
    pub fn new() -> Self {
        Self { _type: PhantomData }
    }
}

impl<T: MessageType> Default for TypedDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: MessageType> TypeDecoder for TypedDecoder<T> {
    fn type_name(&self) -> &str {
        T::TYPE_NAME
    }

    fn fingerprint(&self) -> Fingerprint {
        T::FINGERPRINT
    }

    fn decode(&self, payload: &[u8]) -> Result<Record> {
        let message = T::decode(payload)?;
        Ok(serde_json::to_value(&message)?)
    }
}

impl<T> std::fmt::Debug for TypedDecoder<T>
where
    T: MessageType,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedDecoder")
            .field("type_name", &T::TYPE_NAME)
            .field("fingerprint", &T::FINGERPRINT)
            .finish()
    }
}
