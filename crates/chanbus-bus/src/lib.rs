//! Channel-pattern publish/subscribe over framed serial transports.
//!
//! A [`Bus`] owns one [`SerialTransport`](chanbus_frame::SerialTransport).
//! Publishers hand it `(channel, payload)` pairs from any thread; a
//! background receive loop decodes incoming frames and dispatches each one,
//! synchronously and in registration order, to every subscription whose
//! pattern matches the whole channel name.

pub mod bus;
#[cfg(unix)]
pub mod connector;
pub mod dispatch;
pub mod error;
#[cfg(unix)]
pub mod listener;
pub mod message;
pub mod subscriber;

pub use bus::{Bus, BusConfig, DEFAULT_THREAD_NAME};
#[cfg(unix)]
pub use connector::{connect, connect_with_config};
pub use dispatch::{Dispatcher, Subscription, SubscriptionId};
pub use error::{BusError, Result};
#[cfg(unix)]
pub use listener::BusListener;
pub use message::Message;
pub use subscriber::{QueuedSubscriber, Subscriber};
