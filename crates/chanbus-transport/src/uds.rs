use std::io::{self, ErrorKind};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::SerialIO;

#[cfg(target_os = "linux")]
const SEND_FLAGS: libc::c_int = libc::MSG_DONTWAIT | libc::MSG_NOSIGNAL;
#[cfg(not(target_os = "linux"))]
const SEND_FLAGS: libc::c_int = libc::MSG_DONTWAIT;

/// [`SerialIO`] over a connected Unix domain stream socket.
///
/// The socket stays in blocking mode; timeouts are implemented with `poll(2)`
/// followed by a `MSG_DONTWAIT` transfer, so a reader thread and a writer
/// thread can share one descriptor without fighting over `O_NONBLOCK`.
pub struct UnixStreamSerial {
    stream: UnixStream,
}

impl UnixStreamSerial {
    /// Wrap an already connected stream.
    pub fn from_stream(stream: UnixStream) -> Self {
        Self { stream }
    }

    /// Connect to a listening [`SerialListener`] (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|e| TransportError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(?path, "connected serial link over unix domain socket");
        Ok(Self::from_stream(stream))
    }

    /// Create a connected pair of endpoints.
    pub fn pair() -> Result<(Self, Self)> {
        let (a, b) = UnixStream::pair()?;
        Ok((Self::from_stream(a), Self::from_stream(b)))
    }

    /// Shut down both directions of the link.
    pub fn shutdown(&self) -> Result<()> {
        match self.stream.shutdown(std::net::Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl SerialIO for UnixStreamSerial {
    fn get(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let fd = self.stream.as_raw_fd();
        if !wait_ready(fd, libc::POLLIN, timeout)? {
            return Ok(0);
        }

        loop {
            // SAFETY: `buf` is a valid writable region of `buf.len()` bytes and `fd`
            // is an open socket owned by `self.stream` for the duration of the call.
            let rc = unsafe {
                libc::recv(
                    fd,
                    buf.as_mut_ptr().cast::<libc::c_void>(),
                    buf.len(),
                    libc::MSG_DONTWAIT,
                )
            };
            if rc > 0 {
                return Ok(rc as usize);
            }
            if rc == 0 {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "peer closed the serial link",
                ));
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                ErrorKind::Interrupted => continue,
                ErrorKind::WouldBlock => return Ok(0),
                _ => return Err(err),
            }
        }
    }

    fn put(&self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let fd = self.stream.as_raw_fd();
        if !timeout.is_zero() && !wait_ready(fd, libc::POLLOUT, timeout)? {
            return Ok(0);
        }

        loop {
            // SAFETY: `buf` is a valid readable region of `buf.len()` bytes and `fd`
            // is an open socket owned by `self.stream` for the duration of the call.
            let rc = unsafe {
                libc::send(
                    fd,
                    buf.as_ptr().cast::<libc::c_void>(),
                    buf.len(),
                    SEND_FLAGS,
                )
            };
            if rc >= 0 {
                return Ok(rc as usize);
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                ErrorKind::Interrupted => continue,
                ErrorKind::WouldBlock => return Ok(0),
                _ => return Err(err),
            }
        }
    }
}

impl std::fmt::Debug for UnixStreamSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixStreamSerial")
            .field("fd", &self.stream.as_raw_fd())
            .finish()
    }
}

/// Block in `poll(2)` until `fd` reports `events` or `timeout` elapses.
fn wait_ready(fd: RawFd, events: libc::c_short, timeout: Duration) -> io::Result<bool> {
    let mut timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    if timeout_ms == 0 && !timeout.is_zero() {
        timeout_ms = 1;
    }

    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };

    loop {
        // SAFETY: `pfd` is a valid, initialized pollfd and we pass a count of 1.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc >= 0 {
            return Ok(rc > 0);
        }
        let err = io::Error::last_os_error();
        if err.kind() != ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Listening endpoint for serial links carried over a Unix domain socket.
///
/// Stale sockets at the bind path are replaced; the socket file is removed
/// on drop as long as it is still the one this listener created.
pub struct SerialListener {
    listener: UnixListener,
    path: PathBuf,
    created_inode: (u64, u64),
}

impl SerialListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length (`sockaddr_un.sun_path`).
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen at `path`.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bind_err = |path: &Path, source: io::Error| TransportError::Bind {
            path: path.to_path_buf(),
            source,
        };

        let len = path.as_os_str().len();
        if len >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len,
                max: Self::MAX_PATH_LEN,
            });
        }

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(bind_err(
                    &path,
                    io::Error::new(
                        ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                ));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(|e| bind_err(&path, e))?;
        }

        let listener = UnixListener::bind(&path).map_err(|e| bind_err(&path, e))?;
        std::fs::set_permissions(
            &path,
            std::fs::Permissions::from_mode(Self::DEFAULT_SOCKET_MODE),
        )
        .map_err(|e| bind_err(&path, e))?;
        let metadata = std::fs::symlink_metadata(&path).map_err(|e| bind_err(&path, e))?;

        info!(?path, "serial listener bound");

        Ok(Self {
            listener,
            path,
            created_inode: (metadata.dev(), metadata.ino()),
        })
    }

    /// Accept the next link (blocking).
    pub fn accept(&self) -> Result<UnixStreamSerial> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "accepted serial link");
        Ok(UnixStreamSerial::from_stream(stream))
    }

    /// The path this listener is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SerialListener {
    fn drop(&mut self) {
        let Ok(metadata) = std::fs::symlink_metadata(&self.path) else {
            return;
        };
        let (dev, ino) = self.created_inode;
        if metadata.file_type().is_socket() && metadata.dev() == dev && metadata.ino() == ino {
            debug!(path = ?self.path, "cleaning up socket file");
            let _ = std::fs::remove_file(&self.path);
        } else {
            debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
        }
    }
}
