use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, error};

use crate::error::{BusError, Result};
use crate::message::Message;
use crate::subscriber::Subscriber;

/// Identifier assigned to each subscription, unique per dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source of dispatcher identities; a handle only unsubscribes from the
/// dispatcher that issued it.
static NEXT_DISPATCHER: AtomicU64 = AtomicU64::new(1);

/// Handle returned by [`Dispatcher::subscribe`]; pass it back to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    dispatcher: u64,
    id: SubscriptionId,
    pattern: String,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The pattern as given by the subscriber, without anchors.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

struct Entry {
    id: SubscriptionId,
    regex: Regex,
    subscriber: Arc<dyn Subscriber>,
    active: AtomicBool,
}

type Targets = Arc<[Arc<Entry>]>;

#[derive(Default)]
struct State {
    /// Registration order.
    entries: Vec<Arc<Entry>>,
    /// Channel name to the entries whose pattern matches it.
    cache: HashMap<String, Targets>,
}

impl State {
    fn targets(&mut self, channel: &str) -> Targets {
        if let Some(targets) = self.cache.get(channel) {
            return Arc::clone(targets);
        }
        let targets: Targets = self
            .entries
            .iter()
            .filter(|entry| entry.regex.is_match(channel))
            .cloned()
            .collect();
        if !targets.is_empty() {
            self.cache.insert(channel.to_string(), Arc::clone(&targets));
        }
        targets
    }
}

/// Channel-pattern subscription registry and synchronous dispatcher.
///
/// Patterns are regular expressions matched against the whole channel name:
/// `"A"` matches channel `A` but not `AB`. Matching results are cached per
/// channel and kept current as subscriptions come and go. Only channels with
/// at least one matching subscription are cached, so the cache is bounded by
/// the channels subscribers actually receive; a channel whose last match is
/// unsubscribed is evicted.
///
/// Callbacks run without the registry lock held, so they may subscribe or
/// unsubscribe freely. A subscription removed while a message is being
/// dispatched does not receive that message if it has not been called yet;
/// one added during dispatch first sees the next message.
pub struct Dispatcher {
    identity: u64,
    state: Mutex<State>,
    next_id: AtomicU64,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self {
            identity: NEXT_DISPATCHER.fetch_add(1, Ordering::Relaxed),
            state: Mutex::default(),
            next_id: AtomicU64::new(0),
        }
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscriber` for every channel fully matching `pattern`.
    pub fn subscribe(
        &self,
        pattern: &str,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<Subscription> {
        let regex = compile_anchored(pattern)?;
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let entry = Arc::new(Entry {
            id,
            regex,
            subscriber,
            active: AtomicBool::new(true),
        });

        let mut state = self.state.lock();
        for (channel, targets) in state.cache.iter_mut() {
            if entry.regex.is_match(channel) {
                *targets = targets
                    .iter()
                    .cloned()
                    .chain(std::iter::once(Arc::clone(&entry)))
                    .collect();
            }
        }
        state.entries.push(entry);
        debug!(%id, pattern, "subscribed");

        Ok(Subscription {
            dispatcher: self.identity,
            id,
            pattern: pattern.to_string(),
        })
    }

    /// Remove a subscription. No dispatch starts against it afterwards.
    pub fn unsubscribe(&self, subscription: &Subscription) -> Result<()> {
        let id = subscription.id;
        if subscription.dispatcher != self.identity {
            return Err(BusError::UnknownSubscription(id));
        }
        let mut state = self.state.lock();
        let index = state
            .entries
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(BusError::UnknownSubscription(id))?;
        let entry = state.entries.remove(index);
        entry.active.store(false, Ordering::Release);

        for targets in state.cache.values_mut() {
            if targets.iter().any(|e| e.id == id) {
                *targets = targets.iter().filter(|e| e.id != id).cloned().collect();
            }
        }
        state.cache.retain(|_, targets| !targets.is_empty());
        debug!(%id, pattern = subscription.pattern(), "unsubscribed");
        Ok(())
    }

    /// Deliver `message` to every matching subscription in registration
    /// order. Returns how many callbacks completed.
    pub fn dispatch(&self, message: &Message) -> usize {
        let targets = self.state.lock().targets(&message.channel);

        let mut delivered = 0;
        for entry in targets.iter() {
            if !entry.active.load(Ordering::Acquire) {
                continue;
            }
            let outcome =
                catch_unwind(AssertUnwindSafe(|| entry.subscriber.on_message(message)));
            match outcome {
                Ok(()) => delivered += 1,
                Err(_) => error!(
                    channel = %message.channel,
                    subscription = %entry.id,
                    "subscriber panicked during dispatch"
                ),
            }
        }
        delivered
    }

    /// Ids of the subscriptions that currently match `channel`, in
    /// registration order.
    pub fn matching(&self, channel: &str) -> Vec<SubscriptionId> {
        self.state
            .lock()
            .targets(channel)
            .iter()
            .map(|entry| entry.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of channels with a cached subscriber list.
    pub fn cached_channels(&self) -> usize {
        self.state.lock().cache.len()
    }
}

/// The pattern must be a valid expression on its own before it is wrapped,
/// so it cannot close the anchoring group early.
fn compile_anchored(pattern: &str) -> Result<Regex> {
    let invalid = |source: regex::Error| BusError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    };
    Regex::new(pattern).map_err(invalid)?;
    Regex::new(&format!(r"\A(?:{pattern})\z")).map_err(invalid)
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Dispatcher")
            .field("subscriptions", &state.entries.len())
            .field("cached_channels", &state.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, name: &str) -> Arc<dyn Subscriber> {
        let log = Arc::clone(log);
        let name = name.to_string();
        Arc::new(move |message: &Message| {
            log.lock().push(format!("{name}:{}", message.channel));
        })
    }

    fn msg(channel: &str) -> Message {
        Message::new(channel, &b"payload"[..])
    }

    #[test]
    fn pattern_must_match_whole_channel() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();
        dispatcher.subscribe("A", recorder(&log, "s")).unwrap();

        assert_eq!(dispatcher.dispatch(&msg("A")), 1);
        assert_eq!(dispatcher.dispatch(&msg("AB")), 0);
        assert_eq!(dispatcher.dispatch(&msg("BA")), 0);
        assert_eq!(*log.lock(), vec!["s:A"]);
    }

    #[test]
    fn alternation_is_anchored_as_a_group() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();
        dispatcher.subscribe("FOO|BAR", recorder(&log, "s")).unwrap();

        assert_eq!(dispatcher.dispatch(&msg("FOO")), 1);
        assert_eq!(dispatcher.dispatch(&msg("BAR")), 1);
        assert_eq!(dispatcher.dispatch(&msg("FOOBAR")), 0);
        assert_eq!(dispatcher.dispatch(&msg("XBAR")), 0);
    }

    #[test]
    fn wildcard_receives_every_channel_once() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();
        dispatcher.subscribe(".*", recorder(&log, "all")).unwrap();

        for channel in ["A", "B", "SENSOR_1"] {
            assert_eq!(dispatcher.dispatch(&msg(channel)), 1);
        }
        assert_eq!(*log.lock(), vec!["all:A", "all:B", "all:SENSOR_1"]);
    }

    #[test]
    fn dispatch_follows_registration_order() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();
        dispatcher.subscribe("CH", recorder(&log, "s1")).unwrap();
        dispatcher.subscribe("C.", recorder(&log, "s2")).unwrap();
        dispatcher.subscribe(".*", recorder(&log, "s3")).unwrap();

        dispatcher.dispatch(&msg("CH"));
        assert_eq!(*log.lock(), vec!["s1:CH", "s2:CH", "s3:CH"]);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();
        let err = dispatcher.subscribe("(unclosed", recorder(&log, "s")).unwrap_err();
        assert!(matches!(
            err,
            BusError::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"
        ));
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();
        let sub = dispatcher.subscribe("X", recorder(&log, "s")).unwrap();

        dispatcher.dispatch(&msg("X"));
        dispatcher.unsubscribe(&sub).unwrap();
        assert_eq!(dispatcher.dispatch(&msg("X")), 0);
        assert_eq!(log.lock().len(), 1);

        assert!(matches!(
            dispatcher.unsubscribe(&sub),
            Err(BusError::UnknownSubscription(id)) if id == sub.id()
        ));
    }

    #[test]
    fn cache_tracks_subscribe_and_unsubscribe() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();
        let a = dispatcher.subscribe("A.*", recorder(&log, "a")).unwrap();

        assert_eq!(dispatcher.matching("AB"), vec![a.id()]);
        assert!(dispatcher.matching("ZZ").is_empty());
        assert_eq!(dispatcher.cached_channels(), 1);

        let any = dispatcher.subscribe(".*", recorder(&log, "any")).unwrap();
        let z = dispatcher.subscribe("Z+", recorder(&log, "z")).unwrap();
        assert_eq!(dispatcher.matching("AB"), vec![a.id(), any.id()]);
        assert_eq!(dispatcher.matching("ZZ"), vec![any.id(), z.id()]);

        dispatcher.unsubscribe(&any).unwrap();
        assert_eq!(dispatcher.matching("AB"), vec![a.id()]);
        assert_eq!(dispatcher.matching("ZZ"), vec![z.id()]);
    }

    #[test]
    fn unmatched_channels_are_not_cached() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();
        let sub = dispatcher.subscribe("KEEP", recorder(&log, "k")).unwrap();

        for n in 0..100 {
            assert_eq!(dispatcher.dispatch(&msg(&format!("NOISE_{n}"))), 0);
        }
        assert_eq!(dispatcher.cached_channels(), 0);

        assert_eq!(dispatcher.dispatch(&msg("KEEP")), 1);
        assert_eq!(dispatcher.cached_channels(), 1);

        dispatcher.unsubscribe(&sub).unwrap();
        assert_eq!(dispatcher.cached_channels(), 0);
    }

    #[test]
    fn pattern_cannot_escape_its_anchors() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();
        let err = dispatcher
            .subscribe("A)|(?:B", recorder(&log, "s"))
            .unwrap_err();
        assert!(matches!(err, BusError::InvalidPattern { .. }));
        assert!(dispatcher.is_empty());

        dispatcher.subscribe("A|B", recorder(&log, "s")).unwrap();
        assert_eq!(dispatcher.dispatch(&msg("AXYZ")), 0);
        assert_eq!(dispatcher.dispatch(&msg("XYZB")), 0);
        assert_eq!(dispatcher.dispatch(&msg("B")), 1);
    }

    #[test]
    fn handle_from_another_dispatcher_is_unknown() {
        let first = Dispatcher::new();
        let second = Dispatcher::new();
        let log = Log::default();
        let foreign = first.subscribe("X", recorder(&log, "first")).unwrap();
        let own = second.subscribe("X", recorder(&log, "second")).unwrap();
        assert_eq!(foreign.id(), own.id());

        assert!(matches!(
            second.unsubscribe(&foreign),
            Err(BusError::UnknownSubscription(id)) if id == foreign.id()
        ));
        assert_eq!(second.len(), 1);
        assert_eq!(second.dispatch(&msg("X")), 1);
        assert_eq!(*log.lock(), vec!["second:X"]);

        first.unsubscribe(&foreign).unwrap();
        assert!(first.is_empty());
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();
        dispatcher
            .subscribe(
                "P",
                Arc::new(|message: &Message| {
                    if message.channel == "P" {
                        panic!("subscriber failure");
                    }
                }),
            )
            .unwrap();
        dispatcher.subscribe("P", recorder(&log, "after")).unwrap();

        assert_eq!(dispatcher.dispatch(&msg("P")), 1);
        assert_eq!(*log.lock(), vec!["after:P"]);
    }

    #[test]
    fn unsubscribe_during_dispatch_skips_removed_subscription() {
        let dispatcher = Arc::new(Dispatcher::new());
        let log = Log::default();
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::default();

        let weak: Weak<Dispatcher> = Arc::downgrade(&dispatcher);
        let target = Arc::clone(&victim);
        let killer_log = Arc::clone(&log);
        dispatcher
            .subscribe(
                "M",
                Arc::new(move |_: &Message| {
                    killer_log.lock().push("killer".to_string());
                    if let (Some(dispatcher), Some(sub)) = (weak.upgrade(), target.lock().take()) {
                        dispatcher.unsubscribe(&sub).unwrap();
                    }
                }),
            )
            .unwrap();
        let doomed = dispatcher.subscribe("M", recorder(&log, "doomed")).unwrap();
        *victim.lock() = Some(doomed);

        assert_eq!(dispatcher.dispatch(&msg("M")), 1);
        assert_eq!(*log.lock(), vec!["killer"]);
        assert_eq!(dispatcher.len(), 1);
    }

    #[test]
    fn subscribe_during_dispatch_applies_to_next_message() {
        let dispatcher = Arc::new(Dispatcher::new());
        let log = Log::default();

        let weak = Arc::downgrade(&dispatcher);
        let late_log = Arc::clone(&log);
        let added = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&added);
        dispatcher
            .subscribe(
                "N",
                Arc::new(move |_: &Message| {
                    if !flag.swap(true, Ordering::SeqCst) {
                        if let Some(dispatcher) = weak.upgrade() {
                            dispatcher
                                .subscribe("N", recorder(&late_log, "late"))
                                .unwrap();
                        }
                    }
                }),
            )
            .unwrap();

        assert_eq!(dispatcher.dispatch(&msg("N")), 1);
        assert!(log.lock().is_empty());
        assert_eq!(dispatcher.dispatch(&msg("N")), 2);
        assert_eq!(*log.lock(), vec!["late:N"]);
    }
}
