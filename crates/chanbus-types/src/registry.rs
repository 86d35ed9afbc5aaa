use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, TypeError};
use crate::fingerprint::Fingerprint;
use crate::message::{MessageType, Record, TypeDecoder, TypedDecoder};

/// Fingerprint-keyed table of message decoders.
#[derive(Default)]
pub struct TypeRegistry {
    decoders: HashMap<Fingerprint, Arc<dyn TypeDecoder>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a closed table of decoders.
    pub fn from_decoders<I>(decoders: I) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<dyn TypeDecoder>>,
    {
        let mut registry = Self::new();
        for decoder in decoders {
            registry.register_arc(decoder)?;
        }
        Ok(registry)
    }

    /// Register a decoder.
    ///
    /// Registering a second decoder with the same type name under the same
    /// fingerprint is a no-op; a different type name is a collision.
    pub fn register<D: TypeDecoder + 'static>(&mut self, decoder: D) -> Result<()> {
        self.register_arc(Arc::new(decoder))
    }

    pub fn register_arc(&mut self, decoder: Arc<dyn TypeDecoder>) -> Result<()> {
        let fingerprint = decoder.fingerprint();
        if let Some(existing) = self.decoders.get(&fingerprint) {
            if existing.type_name() == decoder.type_name() {
                return Ok(());
            }
            return Err(TypeError::DuplicateFingerprint {
                fingerprint,
                existing: existing.type_name().to_string(),
                new: decoder.type_name().to_string(),
            });
        }
        debug!(%fingerprint, type_name = decoder.type_name(), "registered message type");
        self.decoders.insert(fingerprint, decoder);
        Ok(())
    }

    /// Register a statically known message type.
    pub fn register_type<T: MessageType + 'static>(&mut self) -> Result<()> {
        self.register(TypedDecoder::<T>::new())
    }

    pub fn resolve(&self, fingerprint: Fingerprint) -> Option<&dyn TypeDecoder> {
        self.decoders.get(&fingerprint).map(Arc::as_ref)
    }

    /// Look up the decoder for a payload by its fingerprint prefix.
    pub fn resolve_payload(&self, payload: &[u8]) -> Option<&dyn TypeDecoder> {
        self.resolve(Fingerprint::from_payload(payload)?)
    }

    /// Decode a payload with whichever registered type its fingerprint names.
    pub fn decode(&self, payload: &[u8]) -> Result<Record> {
        let fingerprint = Fingerprint::from_payload(payload)
            .ok_or(TypeError::MissingFingerprint { len: payload.len() })?;
        let decoder = self
            .resolve(fingerprint)
            .ok_or(TypeError::UnknownFingerprint(fingerprint))?;
        decoder.decode(payload)
    }

    pub fn contains(&self, fingerprint: Fingerprint) -> bool {
        self.decoders.contains_key(&fingerprint)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Registered fingerprints in ascending order.
    pub fn fingerprints(&self) -> Vec<Fingerprint> {
        let mut fingerprints: Vec<Fingerprint> = self.decoders.keys().copied().collect();
        fingerprints.sort_unstable();
        fingerprints
    }

    /// Registered type names in ascending order.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.decoders.values().map(|d| d.type_name()).collect();
        names.sort_unstable();
        names
    }

    /// Finish registration and share the table read-only.
    pub fn freeze(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}
