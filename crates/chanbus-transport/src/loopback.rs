use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::traits::SerialIO;

/// Default per-direction capacity of a loopback link: 64 KiB.
pub const DEFAULT_LOOPBACK_CAPACITY: usize = 64 * 1024;

/// In-memory [`SerialIO`] back end built on bounded byte queues.
///
/// Two shapes are supported:
/// - [`LoopbackSerial::new`]: everything `put` becomes readable through `get`
///   on the same endpoint.
/// - [`LoopbackSerial::pair`]: two linked endpoints, like the two ends of a
///   null-modem cable.
///
/// `put` honours the queue capacity, which makes this the reference sink for
/// exercising backpressure. [`LoopbackSerial::inject`] bypasses the capacity
/// and is meant for feeding line noise into a receiver.
#[derive(Clone)]
pub struct LoopbackSerial {
    rx: Arc<Pipe>,
    tx: Arc<Pipe>,
}

impl LoopbackSerial {
    /// Create a self-looped endpoint with the given queue capacity.
    pub fn new(capacity: usize) -> Self {
        let pipe = Arc::new(Pipe::new(capacity));
        Self {
            rx: Arc::clone(&pipe),
            tx: pipe,
        }
    }

    /// Create two linked endpoints; each direction holds up to `capacity` bytes.
    pub fn pair(capacity: usize) -> (Self, Self) {
        let a_to_b = Arc::new(Pipe::new(capacity));
        let b_to_a = Arc::new(Pipe::new(capacity));
        let a = Self {
            rx: Arc::clone(&b_to_a),
            tx: Arc::clone(&a_to_b),
        };
        let b = Self {
            rx: a_to_b,
            tx: b_to_a,
        };
        (a, b)
    }

    /// Append raw bytes to this endpoint's inbound queue, ignoring capacity.
    pub fn inject(&self, bytes: &[u8]) {
        self.rx.inject(bytes);
    }

    /// Bytes waiting to be read on this endpoint.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Remove and return every byte waiting on this endpoint.
    pub fn take_pending(&self) -> Vec<u8> {
        self.rx.take_all()
    }

    /// Capacity of the outbound queue.
    pub fn capacity(&self) -> usize {
        self.tx.capacity
    }

    /// Close both directions. Blocked callers wake up; reads drain what is
    /// left and then fail with `UnexpectedEof`, writes fail with `BrokenPipe`.
    pub fn close(&self) {
        self.rx.close();
        self.tx.close();
    }
}

impl Default for LoopbackSerial {
    fn default() -> Self {
        Self::new(DEFAULT_LOOPBACK_CAPACITY)
    }
}

impl SerialIO for LoopbackSerial {
    fn get(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.rx.read(buf, timeout)
    }

    fn put(&self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        self.tx.write(buf, timeout)
    }
}

impl std::fmt::Debug for LoopbackSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackSerial")
            .field("looped", &Arc::ptr_eq(&self.rx, &self.tx))
            .field("pending", &self.rx.len())
            .field("capacity", &self.tx.capacity)
            .finish()
    }
}

struct Pipe {
    state: Mutex<PipeState>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
}

struct PipeState {
    bytes: VecDeque<u8>,
    closed: bool,
}

impl Pipe {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(PipeState {
                bytes: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            capacity,
        }
    }

    fn read(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock();
        if state.bytes.is_empty() && !timeout.is_zero() {
            let deadline = Instant::now().checked_add(timeout);
            while state.bytes.is_empty() && !state.closed {
                match deadline {
                    Some(deadline) => {
                        if self.readable.wait_until(&mut state, deadline).timed_out() {
                            break;
                        }
                    }
                    None => self.readable.wait(&mut state),
                }
            }
        }

        if state.bytes.is_empty() && state.closed {
            return Err(io::Error::new(ErrorKind::UnexpectedEof, "loopback closed"));
        }

        let n = buf.len().min(state.bytes.len());
        for (dst, src) in buf.iter_mut().zip(state.bytes.drain(..n)) {
            *dst = src;
        }
        if n > 0 {
            self.writable.notify_all();
        }
        Ok(n)
    }

    fn write(&self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock();
        if state.closed {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "loopback closed"));
        }
        if state.bytes.len() >= self.capacity && !timeout.is_zero() {
            let deadline = Instant::now().checked_add(timeout);
            while state.bytes.len() >= self.capacity && !state.closed {
                match deadline {
                    Some(deadline) => {
                        if self.writable.wait_until(&mut state, deadline).timed_out() {
                            break;
                        }
                    }
                    None => self.writable.wait(&mut state),
                }
            }
            if state.closed {
                return Err(io::Error::new(ErrorKind::BrokenPipe, "loopback closed"));
            }
        }

        let room = self.capacity.saturating_sub(state.bytes.len());
        let n = buf.len().min(room);
        state.bytes.extend(&buf[..n]);
        if n > 0 {
            self.readable.notify_all();
        }
        Ok(n)
    }

    fn inject(&self, bytes: &[u8]) {
        let mut state = self.state.lock();
        state.bytes.extend(bytes);
        debug!(injected = bytes.len(), "loopback bytes injected");
        self.readable.notify_all();
    }

    fn len(&self) -> usize {
        self.state.lock().bytes.len()
    }

    fn take_all(&self) -> Vec<u8> {
        let mut state = self.state.lock();
        let bytes: Vec<u8> = state.bytes.drain(..).collect();
        self.writable.notify_all();
        bytes
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.readable.notify_all();
        self.writable.notify_all();
    }
}
