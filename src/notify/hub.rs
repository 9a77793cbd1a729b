use super::TransactionRecord;
use crate::core::{MirrorError, Result};
use im::OrdMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Records are shared between every listener of every hub that receives them.
pub type SharedRecord = Arc<TransactionRecord>;

pub type Listener = Arc<dyn Fn(&SharedRecord) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub delivered: u64,
    pub listener_failures: u64,
    pub malformed: u64,
}

#[derive(Default)]
struct HubCounters {
    delivered: AtomicU64,
    listener_failures: AtomicU64,
    malformed: AtomicU64,
}

/// Per-view subscription endpoint.
///
/// Every delivery iterates the listener map as it was when the delivery
/// started; listeners added or removed meanwhile take effect from the next
/// record on. A listener that errors or panics does not stop the others.
pub struct SubscriptionHub {
    name: String,
    listeners: Mutex<OrdMap<ListenerId, Listener>>,
    next_listener: AtomicU64,
    counters: HubCounters,
}

impl SubscriptionHub {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listeners: Mutex::new(OrdMap::new()),
            next_listener: AtomicU64::new(1),
            counters: HubCounters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SharedRecord) -> Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.lock_listeners().insert(id, Arc::new(listener));
        debug!(hub = %self.name, listener = id.0, "listener subscribed");
        id
    }

    /// Returns whether the listener was still registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let removed = self.lock_listeners().remove(&id).is_some();
        if removed {
            debug!(hub = %self.name, listener = id.0, "listener unsubscribed");
        }
        removed
    }

    /// Forwards every delivered record into an unbounded channel.
    pub fn subscribe_channel(&self) -> (ListenerId, mpsc::UnboundedReceiver<SharedRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |record| {
            tx.send(Arc::clone(record))
                .map_err(|_| MirrorError::TransportFailure("listener channel closed".to_string()))
        });
        (id, rx)
    }

    /// Subscribes for as long as the returned guard lives.
    pub fn subscribe_scoped<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(&SharedRecord) -> Result<()> + Send + Sync + 'static,
    {
        let id = self.subscribe(listener);
        Subscription {
            hub: Arc::downgrade(self),
            id: Some(id),
        }
    }

    /// Channel subscription tied to the returned guard.
    pub fn channel_scoped(self: &Arc<Self>) -> (Subscription, mpsc::UnboundedReceiver<SharedRecord>) {
        let (id, rx) = self.subscribe_channel();
        let guard = Subscription {
            hub: Arc::downgrade(self),
            id: Some(id),
        };
        (guard, rx)
    }

    /// Hands `record` to every listener registered when the call starts.
    /// Returns the number of listeners that accepted it.
    pub fn deliver(&self, record: &SharedRecord) -> usize {
        let snapshot = self.lock_listeners().clone();
        let mut accepted = 0;

        for (id, listener) in snapshot.iter() {
            match catch_unwind(AssertUnwindSafe(|| listener(record))) {
                Ok(Ok(())) => accepted += 1,
                Ok(Err(err)) => {
                    self.counters.listener_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(hub = %self.name, listener = id.0, kind = %record.kind,
                        action = %record.action, error = %err, "listener failed");
                }
                Err(_) => {
                    self.counters.listener_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(hub = %self.name, listener = id.0, kind = %record.kind,
                        action = %record.action, "listener panicked");
                }
            }
        }

        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
        accepted
    }

    /// Delivers a record in its JSON wire form. Malformed payloads are counted
    /// and dropped.
    pub fn deliver_wire(&self, payload: &str) -> Result<usize> {
        match TransactionRecord::from_wire(payload) {
            Ok(record) => Ok(self.deliver(&Arc::new(record))),
            Err(err) => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                warn!(hub = %self.name, error = %err, "dropping malformed payload");
                Err(err)
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock_listeners().len()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            listener_failures: self.counters.listener_failures.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
        }
    }

    // Listener closures run outside the lock, so a poisoned map is still consistent.
    fn lock_listeners(&self) -> MutexGuard<'_, OrdMap<ListenerId, Listener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SubscriptionHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHub")
            .field("name", &self.name)
            .field("listeners", &self.listener_count())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Unsubscribes its listener when dropped.
#[derive(Debug)]
pub struct Subscription {
    hub: Weak<SubscriptionHub>,
    id: Option<ListenerId>,
}

impl Subscription {
    pub fn id(&self) -> Option<ListenerId> {
        self.id
    }

    pub fn cancel(&mut self) -> bool {
        match (self.id.take(), self.hub.upgrade()) {
            (Some(id), Some(hub)) => hub.unsubscribe(id),
            _ => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EntityKind, RecordId};
    use std::sync::atomic::AtomicUsize;

    fn record() -> SharedRecord {
        Arc::new(TransactionRecord::destroyed(EntityKind::Audio, RecordId::new()))
    }

    fn counting(hub: &SubscriptionHub) -> (ListenerId, Arc<AtomicUsize>) {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let id = hub.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (id, seen)
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let hub = SubscriptionHub::new("audios");
        let (id, seen) = counting(&hub);

        assert_eq!(hub.deliver(&record()), 1);
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        assert_eq!(hub.deliver(&record()), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_listeners_are_isolated() {
        let hub = SubscriptionHub::new("audios");
        hub.subscribe(|_| Err(MirrorError::Unknown("boom".to_string())));
        hub.subscribe(|_| panic!("listener bug"));
        let (_, seen) = counting(&hub);

        assert_eq!(hub.deliver(&record()), 1);
        assert_eq!(hub.deliver(&record()), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        let stats = hub.stats();
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.listener_failures, 4);
        assert_eq!(hub.listener_count(), 3);
    }

    #[test]
    fn test_unsubscribe_during_delivery_uses_snapshot() {
        let hub = Arc::new(SubscriptionHub::new("audios"));
        let (victim, victim_seen) = counting(&hub);

        // registered after the victim, removes it mid-delivery
        let weak = Arc::downgrade(&hub);
        hub.subscribe(move |_| {
            if let Some(hub) = weak.upgrade() {
                hub.unsubscribe(victim);
            }
            Ok(())
        });
        let (_, tail_seen) = counting(&hub);

        hub.deliver(&record());
        hub.deliver(&record());

        assert_eq!(victim_seen.load(Ordering::SeqCst), 1);
        assert_eq!(tail_seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_scoped_subscription_drops() {
        let hub = Arc::new(SubscriptionHub::new("audios"));
        {
            let _guard = hub.subscribe_scoped(|_| Ok(()));
            assert_eq!(hub.listener_count(), 1);
        }
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn test_channel_subscription_receives_records() {
        let hub = Arc::new(SubscriptionHub::new("audios"));
        let (guard, mut rx) = hub.channel_scoped();
        let sent = record();

        hub.deliver(&sent);
        let received = rx.try_recv().unwrap();
        assert!(Arc::ptr_eq(&sent, &received));

        drop(guard);
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn test_malformed_wire_payload_counted() {
        let hub = SubscriptionHub::new("audios");
        let (_, seen) = counting(&hub);

        assert!(hub.deliver_wire("{not json").is_err());
        let valid = record().to_wire().unwrap();
        assert_eq!(hub.deliver_wire(&valid).unwrap(), 1);

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(hub.stats().malformed, 1);
    }
}
