use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Byte-level I/O capability driven by the serial transport.
///
/// This is the substitutable seam between chanbus and the hardware (or a
/// simulation of it). Implementations own no framing state; the buffers passed
/// in are only borrowed for the duration of the call.
///
/// Timeout semantics are shared by both operations:
/// - `Duration::ZERO` is non-blocking: return immediately with whatever can be
///   moved right now (possibly 0 bytes).
/// - A non-zero timeout blocks until at least one byte can be moved or the
///   timeout elapses, whichever comes first. A timeout is reported as `Ok(0)`,
///   not as an error.
///
/// Errors are reserved for conditions the link cannot recover from on its own
/// (peer hung up, device removed).
pub trait SerialIO: Send + Sync {
    /// Read up to `buf.len()` bytes into `buf`, returning how many were read.
    fn get(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Write up to `buf.len()` bytes from `buf`, returning how many were
    /// accepted. A short count means the sink is full; the caller keeps the
    /// remainder.
    fn put(&self, buf: &[u8], timeout: Duration) -> io::Result<usize>;
}

impl<T: SerialIO + ?Sized> SerialIO for Arc<T> {
    fn get(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        (**self).get(buf, timeout)
    }

    fn put(&self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        (**self).put(buf, timeout)
    }
}

impl<T: SerialIO + ?Sized> SerialIO for Box<T> {
    fn get(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        (**self).get(buf, timeout)
    }

    fn put(&self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        (**self).put(buf, timeout)
    }
}

impl<T: SerialIO + ?Sized> SerialIO for &T {
    fn get(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        (**self).get(buf, timeout)
    }

    fn put(&self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        (**self).put(buf, timeout)
    }
}
