use super::{PostCommitHook, SharedRecord, SubscriptionHub, TRANSACTION_CHANNEL, TransactionRecord};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HubId(u64);

/// Where the notifier sends a record.
#[derive(Clone)]
enum Endpoint {
    /// Hub living in the same process; delivered by reference.
    Local(Weak<SubscriptionHub>),
    /// Hub behind a serialized link; receives the JSON wire form.
    Wire(mpsc::UnboundedSender<String>),
}

impl Endpoint {
    fn is_closed(&self) -> bool {
        match self {
            Self::Local(hub) => hub.strong_count() == 0,
            Self::Wire(tx) => tx.is_closed(),
        }
    }
}

/// Explicit set of hubs a [`ChangeNotifier`] broadcasts to.
///
/// Entries are weak: dropping the last handle on a hub (or the receiving end
/// of a wire link) detaches it, and the entry is pruned on the next broadcast.
#[derive(Clone, Default)]
pub struct HubRegistry {
    endpoints: Arc<RwLock<Vec<(HubId, Endpoint)>>>,
    next_id: Arc<AtomicU64>,
}

impl HubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, hub: &Arc<SubscriptionHub>) -> HubId {
        self.push(Endpoint::Local(Arc::downgrade(hub)))
    }

    /// Attaches `hub` through its JSON wire form. A pump task parses every
    /// payload and hands it to [`SubscriptionHub::deliver_wire`]; it ends
    /// when the hub is dropped or the link is detached.
    pub fn attach_wire(&self, hub: &Arc<SubscriptionHub>) -> (HubId, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let id = self.push(Endpoint::Wire(tx));
        let weak = Arc::downgrade(hub);

        let pump = tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                let Some(hub) = weak.upgrade() else {
                    break;
                };
                // failures are counted by the hub itself
                let _ = hub.deliver_wire(&payload);
            }
        });
        (id, pump)
    }

    pub fn detach(&self, id: HubId) -> bool {
        let mut endpoints = self.endpoints.write().unwrap_or_else(PoisonError::into_inner);
        let before = endpoints.len();
        endpoints.retain(|(entry, _)| *entry != id);
        endpoints.len() != before
    }

    /// Number of attached endpoints that are still alive.
    pub fn len(&self) -> usize {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, endpoint)| !endpoint.is_closed())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, endpoint: Endpoint) -> HubId {
        let id = HubId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, endpoint));
        id
    }

    fn snapshot(&self) -> Vec<Endpoint> {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, endpoint)| endpoint.clone())
            .collect()
    }

    fn prune(&self) -> usize {
        let mut endpoints = self.endpoints.write().unwrap_or_else(PoisonError::into_inner);
        let before = endpoints.len();
        endpoints.retain(|(_, endpoint)| !endpoint.is_closed());
        before - endpoints.len()
    }
}

/// Broadcasts committed mutations to every hub of its registry.
pub struct ChangeNotifier {
    registry: HubRegistry,
    channel: String,
    // serializes fan-out so all hubs observe the same order
    sequence: Mutex<u64>,
}

impl ChangeNotifier {
    pub fn new(registry: HubRegistry) -> Self {
        Self {
            registry,
            channel: TRANSACTION_CHANNEL.to_string(),
            sequence: Mutex::new(0),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn registry(&self) -> &HubRegistry {
        &self.registry
    }

    /// Number of broadcasts so far.
    pub fn broadcasts(&self) -> u64 {
        *self.sequence.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends `record` to every live endpoint; returns how many were reached.
    /// With nothing attached the record is dropped.
    pub fn broadcast(&self, record: TransactionRecord) -> usize {
        let mut sequence = self.sequence.lock().unwrap_or_else(PoisonError::into_inner);
        *sequence += 1;

        let shared: SharedRecord = Arc::new(record);
        let endpoints = self.registry.snapshot();
        let mut wire: Option<String> = None;
        let mut reached = 0;
        let mut dead = 0;

        for endpoint in &endpoints {
            match endpoint {
                Endpoint::Local(weak) => match weak.upgrade() {
                    Some(hub) => {
                        hub.deliver(&shared);
                        reached += 1;
                    }
                    None => dead += 1,
                },
                Endpoint::Wire(tx) => {
                    if wire.is_none() {
                        match shared.to_wire() {
                            Ok(payload) => wire = Some(payload),
                            Err(err) => {
                                warn!(error = %err, "cannot serialize transaction record");
                                continue;
                            }
                        }
                    }
                    if let Some(payload) = &wire
                        && tx.send(payload.clone()).is_ok()
                    {
                        reached += 1;
                    } else {
                        dead += 1;
                    }
                }
            }
        }

        if dead > 0 {
            let pruned = self.registry.prune();
            trace!(pruned, "pruned detached hubs");
        }

        debug!(
            channel = %self.channel,
            seq = *sequence,
            kind = %shared.kind,
            action = %shared.action,
            id = %shared.id,
            hubs = reached,
            "broadcast transaction"
        );
        reached
    }
}

impl PostCommitHook for ChangeNotifier {
    fn after_commit(&self, record: &TransactionRecord) {
        self.broadcast(record.clone());
    }
}
