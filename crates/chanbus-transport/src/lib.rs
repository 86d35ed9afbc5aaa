//! Byte-level transport capability for chanbus.
//!
//! Everything above this crate talks to the outside world through the
//! [`SerialIO`] trait: two calls, `get` and `put`, each bounded by a timeout.
//! Back ends provided here:
//! - [`LoopbackSerial`]: in-memory bounded byte queues (self-loopback or linked pair)
//! - [`UnixStreamSerial`]: a connected Unix domain stream socket (Linux/macOS)
//!
//! This is the lowest layer of chanbus. Framing, checksums and dispatch all
//! build on top of it.

pub mod error;
pub mod loopback;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use loopback::LoopbackSerial;
pub use traits::SerialIO;

#[cfg(unix)]
pub use uds::{SerialListener, UnixStreamSerial};
