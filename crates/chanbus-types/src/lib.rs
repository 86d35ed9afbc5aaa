//! Fingerprint-keyed message type registry.
//!
//! Typed payloads start with an 8-byte big-endian fingerprint that names
//! their type. A [`TypeRegistry`] maps fingerprints to decoders so a
//! subscriber that only sees bytes can still turn them into a structured
//! [`Record`].
//!
//! The registry is built once from a closed table of types and is read-only
//! afterwards; share it with [`TypeRegistry::freeze`].

pub mod error;
pub mod fingerprint;
pub mod message;
pub mod registry;

pub use error::{Result, TypeError};
pub use fingerprint::{Fingerprint, FINGERPRINT_SIZE};
pub use message::{MessageType, Record, TypeDecoder, TypedDecoder};
pub use registry::TypeRegistry;
