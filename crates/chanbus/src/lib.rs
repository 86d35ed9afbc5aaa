//! Channel-routed publish/subscribe over a checksummed serial link.
//!
//! chanbus frames named-channel messages onto any byte-oriented link that can
//! `get` and `put` bytes, recovers from line noise by resynchronising on the
//! frame header, and dispatches received messages to subscribers whose regular
//! expression matches the full channel name.
//!
//! # Crate Structure
//!
//! - [`transport`]: the `SerialIO` trait and its loopback / Unix stream back ends
//! - [`frame`]: Fletcher-16 checked frame codec and the buffered serial transport
//! - [`types`]: fingerprint-keyed type registry for typed payloads
//! - [`bus`]: subscription dispatch and the `Bus` facade
//!
//! ```no_run
//! use chanbus::bus::{Bus, BusConfig, Message};
//! use chanbus::transport::LoopbackSerial;
//!
//! # fn main() -> Result<(), chanbus::bus::BusError> {
//! let bus = Bus::from_io(LoopbackSerial::default(), BusConfig::default())?;
//! bus.subscribe("SENSOR_.*", |message: &Message| {
//!     println!("{} -> {} bytes", message.channel, message.payload.len());
//! })?;
//! bus.start()?;
//! bus.publish("SENSOR_IMU", b"\x01\x02\x03")?;
//! # bus.close()
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use chanbus_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use chanbus_frame::*;
}

/// Re-export type registry types.
pub mod types {
    pub use chanbus_types::*;
}

/// Re-export bus types.
pub mod bus {
    pub use chanbus_bus::*;
}

pub use chanbus_bus::{Bus, BusConfig, BusError, Message, Subscription};
