use std::path::PathBuf;

/// Failures while establishing a serial link.
///
/// Once a link is up, `SerialIO` reports plain `std::io::Error`s; this type
/// covers socket setup and the errors surfaced from it.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot listen on {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot open link to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("accepting link failed: {0}")]
    Accept(std::io::Error),

    #[error("serial link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unix socket paths are limited by `sockaddr_un.sun_path`.
    #[error("socket path {path} is {len} bytes; the limit is {max}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;
