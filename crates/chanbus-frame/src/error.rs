/// Errors that can occur while framing, sending or receiving messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured MTU.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The channel name is empty or does not fit the one-byte length field.
    #[error("invalid channel name ({len} bytes, expected 1..={max})")]
    InvalidChannel { len: usize, max: usize },

    /// The transmit buffer stayed full for the whole write timeout.
    #[error("transport capacity exceeded (frame needs {needed} bytes, {available} free)")]
    CapacityExceeded { needed: usize, available: usize },

    /// Buffered bytes could not be handed to the link before the timeout.
    #[error("flush timed out with {pending} bytes still queued")]
    FlushTimeout { pending: usize },

    /// The transport configuration is inconsistent.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// The underlying byte link failed.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
