use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chanbus_frame::{FrameConfig, SerialTransport, StatsSnapshot};
use chanbus_transport::SerialIO;
use chanbus_types::MessageType;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::dispatch::{Dispatcher, Subscription};
use crate::error::{BusError, Result};
use crate::message::Message;
use crate::subscriber::Subscriber;

/// Name given to the background receive thread.
pub const DEFAULT_THREAD_NAME: &str = "chanbus-recv";

/// Pause between polls when the transport is configured non-blocking.
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Longest a paused loop sleeps before re-checking for stop.
const PAUSE_POLL: Duration = Duration::from_millis(50);

/// Bus behavior configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Transport framing and timeouts.
    pub frame: FrameConfig,
    /// Name of the receive thread spawned by [`Bus::start`].
    pub thread_name: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl From<FrameConfig> for BusConfig {
    fn from(frame: FrameConfig) -> Self {
        Self {
            frame,
            ..Self::default()
        }
    }
}

/// Publish/subscribe endpoint over one serial transport.
///
/// Share a bus between threads with `Arc<Bus>`; every method takes `&self`.
/// Received messages are dispatched by one receive loop, either on a
/// background thread ([`start`](Self::start)) or on the caller's thread
/// ([`run`](Self::run)). Dropping the bus stops its receive thread.
pub struct Bus {
    inner: Arc<Inner>,
}

struct Inner {
    /// `None` once the bus is closed.
    transport: RwLock<Option<Arc<SerialTransport>>>,
    dispatcher: Dispatcher,
    worker: Mutex<Option<Worker>>,
    paused: Mutex<bool>,
    resumed: Condvar,
    config: BusConfig,
}

impl Inner {
    /// Park the receive loop while dispatch is paused. Returns whether it
    /// parked, in which case the caller re-checks its stop flag.
    fn park_if_paused(&self, wait: Duration) -> bool {
        let mut paused = self.paused.lock();
        if !*paused {
            return false;
        }
        self.resumed.wait_for(&mut paused, wait);
        true
    }

    fn wake(&self) {
        let _paused = self.paused.lock();
        self.resumed.notify_all();
    }
}

/// One run of the receive loop. Each run gets its own flag so a loop that
/// is still winding down never observes the flag of its successor.
/// `handle` is `None` for a loop driven by [`Bus::run`].
struct Worker {
    handle: Option<JoinHandle<()>>,
    active: Arc<AtomicBool>,
}

impl Worker {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn join(self) {
        if let Some(handle) = self.handle {
            if handle.join().is_err() {
                warn!("receive thread terminated abnormally");
            }
        }
    }
}

impl Bus {
    /// Create a bus over `io`. The receive loop is not started.
    pub fn new(io: Arc<dyn SerialIO>, config: BusConfig) -> Result<Self> {
        let transport = SerialTransport::new(io, config.frame.clone())?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Convenience constructor taking the link by value.
    pub fn from_io<T: SerialIO + 'static>(io: T, config: BusConfig) -> Result<Self> {
        Self::new(Arc::new(io), config)
    }

    /// Create a bus over an existing transport.
    pub fn with_transport(transport: Arc<SerialTransport>, config: BusConfig) -> Self {
        info!(
            mtu = transport.mtu(),
            buf_size = transport.buf_size(),
            "bus created"
        );
        Self {
            inner: Arc::new(Inner {
                transport: RwLock::new(Some(transport)),
                dispatcher: Dispatcher::new(),
                worker: Mutex::new(None),
                paused: Mutex::new(false),
                resumed: Condvar::new(),
                config,
            }),
        }
    }

    /// Publish `payload` on `channel`.
    ///
    /// Blocks up to the configured write timeout when the transmit buffer is
    /// full.
    pub fn publish(&self, channel: &str, payload: &[u8]) -> Result<()> {
        self.transport()?.send(channel, payload)?;
        Ok(())
    }

    /// Encode `message` with its fingerprint prefix and publish it.
    pub fn publish_typed<T: MessageType>(&self, channel: &str, message: &T) -> Result<()> {
        let payload = message.encode()?;
        self.publish(channel, &payload)
    }

    /// Subscribe a callback to every channel fully matching `pattern`.
    pub fn subscribe<F>(&self, pattern: &str, callback: F) -> Result<Subscription>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.subscribe_arc(pattern, Arc::new(callback))
    }

    /// Subscribe a shared subscriber object.
    pub fn subscribe_arc(
        &self,
        pattern: &str,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<Subscription> {
        self.ensure_open()?;
        self.inner.dispatcher.subscribe(pattern, subscriber)
    }

    pub fn unsubscribe(&self, subscription: &Subscription) -> Result<()> {
        self.ensure_open()?;
        self.inner.dispatcher.unsubscribe(subscription)
    }

    /// Spawn the background receive loop.
    pub fn start(&self) -> Result<()> {
        let transport = self.transport()?;
        let mut worker = self.inner.worker.lock();
        reclaim_worker(&mut worker)?;

        let active = Arc::new(AtomicBool::new(true));
        let inner = Arc::clone(&self.inner);
        let flag = Arc::clone(&active);
        let handle = thread::Builder::new()
            .name(self.inner.config.thread_name.clone())
            .spawn(move || {
                if let Err(err) = receive_loop(&inner, &transport, &flag) {
                    error!(%err, "receive loop stopped on error");
                }
            })
            .map_err(BusError::Thread)?;

        *worker = Some(Worker {
            handle: Some(handle),
            active,
        });
        info!(thread = %self.inner.config.thread_name, "receive loop started");
        Ok(())
    }

    /// Run the receive loop on the calling thread.
    ///
    /// Returns `Ok(())` once [`stop`](Self::stop) or [`close`](Self::close)
    /// is called, from a subscriber callback or another thread, and the
    /// error that ended the loop if the link fails.
    pub fn run(&self) -> Result<()> {
        let transport = self.transport()?;
        let active = Arc::new(AtomicBool::new(true));
        {
            let mut worker = self.inner.worker.lock();
            reclaim_worker(&mut worker)?;
            *worker = Some(Worker {
                handle: None,
                active: Arc::clone(&active),
            });
        }
        info!("receive loop running on caller thread");

        let result = receive_loop(&self.inner, &transport, &active);

        let mut worker = self.inner.worker.lock();
        if worker
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(&current.active, &active))
        {
            *worker = None;
        }
        result
    }

    /// Signal the receive loop to exit and wait for it.
    ///
    /// A dispatch already in progress finishes first. Called from inside a
    /// subscriber callback, or against a loop driven by [`run`](Self::run),
    /// this only signals; the loop exits once the current dispatch returns.
    pub fn stop(&self) {
        let Some(worker) = self.inner.worker.lock().take() else {
            return;
        };
        worker.active.store(false, Ordering::Release);
        self.inner.wake();
        match &worker.handle {
            None => {
                debug!("stop requested for caller-thread loop");
                return;
            }
            Some(handle) if handle.thread().id() == thread::current().id() => {
                debug!("stop requested from the receive thread");
                return;
            }
            Some(_) => {}
        }
        worker.join();
        info!("receive loop stopped");
    }

    /// Suspend dispatch without stopping the receive loop.
    ///
    /// No dispatch starts after this returns; one already under way
    /// finishes. While paused the loop keeps draining the transmit side but
    /// reads nothing, so incoming frames wait in the link and are dispatched
    /// in order after [`resume`](Self::resume). [`handle`](Self::handle) is
    /// not affected.
    pub fn pause(&self) -> Result<()> {
        self.ensure_open()?;
        *self.inner.paused.lock() = true;
        debug!("dispatch paused");
        Ok(())
    }

    /// Resume dispatch after [`pause`](Self::pause).
    pub fn resume(&self) -> Result<()> {
        self.ensure_open()?;
        *self.inner.paused.lock() = false;
        self.inner.resumed.notify_all();
        debug!("dispatch resumed");
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        *self.inner.paused.lock()
    }

    /// Receive and dispatch at most one message on the calling thread.
    ///
    /// For hosts that drive the bus themselves instead of calling
    /// [`start`](Self::start). Returns whether a message was dispatched.
    pub fn handle(&self, timeout: Duration) -> Result<bool> {
        let transport = self.transport()?;
        if self.is_running() {
            return Err(BusError::AlreadyRunning);
        }
        transport.poll_flush()?;
        match transport.recv(timeout)? {
            Some(frame) => {
                self.inner.dispatcher.dispatch(&Message::received(frame));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Block until every queued frame is handed to the link.
    pub fn flush(&self, timeout: Duration) -> Result<()> {
        self.transport()?.flush(timeout)?;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .worker
            .lock()
            .as_ref()
            .is_some_and(Worker::is_active)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.transport.read().is_none()
    }

    /// Stop the receive loop, flush queued frames, and release the
    /// transport. Every later operation fails with [`BusError::Closed`].
    ///
    /// The transport is released even when the flush does not finish within
    /// the write timeout; that error is returned so the caller knows
    /// accepted frames did not fully reach the link.
    pub fn close(&self) -> Result<()> {
        let transport = self.inner.transport.write().take().ok_or(BusError::Closed)?;
        self.stop();
        let flushed = transport.flush(self.inner.config.frame.write_timeout);
        info!("bus closed");
        flushed.map_err(|err| {
            warn!(%err, "bus closed with unsent frames");
            BusError::from(err)
        })
    }

    /// Transport counters.
    pub fn stats(&self) -> Result<StatsSnapshot> {
        Ok(self.transport()?.stats())
    }

    /// Number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.dispatcher.len()
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    fn transport(&self) -> Result<Arc<SerialTransport>> {
        self.inner.transport.read().clone().ok_or(BusError::Closed)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        Ok(())
    }
}

impl Drop for Bus {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("running", &self.is_running())
            .field("closed", &self.is_closed())
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}

/// Take a finished worker out of the slot, or refuse if one is still live.
fn reclaim_worker(worker: &mut Option<Worker>) -> Result<()> {
    if worker.as_ref().is_some_and(Worker::is_active) {
        return Err(BusError::AlreadyRunning);
    }
    // A loop that stopped on its own leaves a finished handle behind.
    if let Some(previous) = worker.take() {
        previous.join();
    }
    Ok(())
}

/// Block while dispatch is paused, still draining the transmit side.
/// Returns `false` if the loop was stopped meanwhile.
fn hold_while_paused(
    inner: &Inner,
    transport: &SerialTransport,
    active: &AtomicBool,
) -> Result<bool> {
    while inner.park_if_paused(PAUSE_POLL) {
        if !active.load(Ordering::Acquire) {
            return Ok(false);
        }
        transport.poll_flush()?;
    }
    Ok(true)
}

fn receive_loop(inner: &Inner, transport: &SerialTransport, active: &AtomicBool) -> Result<()> {
    let timeout = inner.config.frame.read_timeout;
    let result = loop {
        if !active.load(Ordering::Acquire) {
            break Ok(());
        }
        if let Err(err) = transport.poll_flush() {
            break Err(BusError::from(err));
        }
        match hold_while_paused(inner, transport, active) {
            Ok(true) => {}
            Ok(false) => break Ok(()),
            Err(err) => break Err(err),
        }
        match transport.recv(timeout) {
            Ok(Some(frame)) => {
                let message = Message::received(frame);
                // A frame read just before a pause waits for resume.
                match hold_while_paused(inner, transport, active) {
                    Ok(true) => {
                        inner.dispatcher.dispatch(&message);
                    }
                    Ok(false) => break Ok(()),
                    Err(err) => break Err(err),
                }
            }
            Ok(None) => {
                if timeout.is_zero() {
                    thread::sleep(IDLE_BACKOFF);
                }
            }
            Err(err) => break Err(BusError::from(err)),
        }
    };
    active.store(false, Ordering::Release);
    debug!("receive loop exited");
    result
}
