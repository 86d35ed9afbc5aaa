use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::{BusError, Result};
use crate::message::Message;

/// Receives messages from the dispatcher.
///
/// Callbacks run on the bus's receive thread and block delivery of later
/// messages until they return. Slow consumers should wrap themselves in a
/// [`QueuedSubscriber`].
pub trait Subscriber: Send + Sync {
    fn on_message(&self, message: &Message);
}

impl<F> Subscriber for F
where
    F: Fn(&Message) + Send + Sync,
{
    fn on_message(&self, message: &Message) {
        self(message)
    }
}

/// Subscriber that hands messages to a worker thread through a bounded queue.
///
/// When the queue is full the message is dropped and counted rather than
/// stalling the receive loop.
pub struct QueuedSubscriber {
    sender: Mutex<Option<SyncSender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
    handled: Arc<AtomicU64>,
}

impl QueuedSubscriber {
    /// Spawn the worker thread; `handler` runs there for every queued message.
    pub fn new<F>(capacity: usize, mut handler: F) -> Result<Self>
    where
        F: FnMut(Message) + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel::<Message>(capacity);
        let handled = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&handled);
        let worker = thread::Builder::new()
            .name("chanbus-queue".to_string())
            .spawn(move || {
                for message in receiver {
                    let channel = message.channel.clone();
                    if catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
                        error!(%channel, "queued subscriber panicked");
                    }
                    counter.fetch_add(1, Ordering::Relaxed);
                }
                debug!("queued subscriber worker exiting");
            })
            .map_err(BusError::Thread)?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            dropped: AtomicU64::new(0),
            handled,
        })
    }

    /// Messages discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Messages the worker has finished handling.
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    /// Stop accepting messages, let the worker drain the queue, and join it.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if worker.thread().id() == thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            warn!("queued subscriber worker terminated abnormally");
        }
    }
}

impl Subscriber for QueuedSubscriber {
    fn on_message(&self, message: &Message) {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return;
        };
        match sender.try_send(message.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(channel = %message.channel, "subscriber queue full; dropping message");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl Drop for QueuedSubscriber {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for QueuedSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedSubscriber")
            .field("dropped", &self.dropped())
            .field("handled", &self.handled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::channel;
    use std::time::Duration;

    use super::*;

    #[test]
    fn closures_are_subscribers() {
        let seen = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&seen);
        let subscriber: Arc<dyn Subscriber> = Arc::new(move |_: &Message| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        subscriber.on_message(&Message::new("A", &b"x"[..]));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn queued_subscriber_delivers_in_order() {
        let (tx, rx) = channel();
        let queued = QueuedSubscriber::new(16, move |message: Message| {
            tx.send(message.payload).unwrap();
        })
        .unwrap();

        for i in 0..5u8 {
            queued.on_message(&Message::new("SEQ", vec![i]));
        }
        queued.shutdown();

        let got: Vec<u8> = rx.try_iter().map(|payload| payload[0]).collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
        assert_eq!(queued.handled(), 5);
        assert_eq!(queued.dropped(), 0);
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let (gate_tx, gate_rx) = channel::<()>();
        let queued = QueuedSubscriber::new(1, move |_message: Message| {
            let _ = gate_rx.recv_timeout(Duration::from_secs(5));
        })
        .unwrap();

        for _ in 0..20 {
            queued.on_message(&Message::new("FLOOD", &b"x"[..]));
        }
        assert!(queued.dropped() >= 18);

        drop(gate_tx);
        queued.shutdown();
        assert_eq!(queued.handled() + queued.dropped(), 20);
    }

    #[test]
    fn panicking_handler_keeps_worker_alive() {
        let (tx, rx) = channel();
        let queued = QueuedSubscriber::new(8, move |message: Message| {
            if message.payload.as_ref() == b"boom" {
                panic!("handler failure");
            }
            tx.send(message.channel).unwrap();
        })
        .unwrap();

        queued.on_message(&Message::new("FIRST", &b"boom"[..]));
        queued.on_message(&Message::new("SECOND", &b"ok"[..]));
        queued.shutdown();

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec!["SECOND".to_string()]);
    }

    #[test]
    fn messages_after_shutdown_are_ignored() {
        let queued = QueuedSubscriber::new(4, |_message: Message| {}).unwrap();
        queued.shutdown();
        queued.on_message(&Message::new("LATE", &b"x"[..]));
        assert_eq!(queued.dropped(), 0);
        assert_eq!(queued.handled(), 0);
    }
}
