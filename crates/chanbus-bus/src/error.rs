use crate::dispatch::SubscriptionId;

/// Errors that can occur in bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Frame-level error (encoding, capacity, link I/O).
    #[error("frame error: {0}")]
    Frame(#[from] chanbus_frame::FrameError),

    /// Typed message encoding or decoding failed.
    #[error("type error: {0}")]
    Type(#[from] chanbus_types::TypeError),

    /// Link setup error.
    #[error("transport error: {0}")]
    Transport(#[from] chanbus_transport::TransportError),

    /// The subscription pattern is not a valid regular expression.
    #[error("invalid channel pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The subscription was never registered or was already removed.
    #[error("unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),

    /// The bus has been closed.
    #[error("bus is closed")]
    Closed,

    /// The receive loop is already running.
    #[error("receive loop already running")]
    AlreadyRunning,

    /// A worker thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Thread(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BusError>;
