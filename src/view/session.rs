use super::{FetchTicket, LookupTicket, ProjectionTable, QueryController, SortOption, ViewFilters, ViewState};
use crate::core::{EntityKind, Fields, MirrorError, Record, Result, Value};
use crate::gateway::DataGateway;
use crate::notify::{SharedRecord, Subscription, SubscriptionHub};
use crate::storage::EntitySchema;
use futures::future::{BoxFuture, OptionFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum ViewCommand {
    SetQuery(String),
    SetFilter(String, Value),
    ClearFilter(String),
    SetSort(SortOption),
    LoadMore,
    Refresh,
    Unmount,
}

/// Read-only picture of a view, published after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot {
    pub kind: EntityKind,
    pub items: Vec<Record>,
    pub filters: ViewFilters,
    pub has_more: bool,
    pub loading: bool,
    pub lookups: BTreeMap<EntityKind, Vec<Record>>,
    pub last_error: Option<MirrorError>,
}

impl ViewSnapshot {
    fn of(controller: &QueryController) -> Self {
        let state = controller.state();
        Self {
            kind: state.kind,
            items: state.items.clone(),
            filters: state.filters.clone(),
            has_more: state.has_more,
            loading: controller.is_loading(),
            lookups: controller.lookups().clone(),
            last_error: controller.last_error().cloned(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.items.iter().filter_map(Record::name).collect()
    }

    pub fn lookup_names(&self, kind: EntityKind) -> Vec<&str> {
        self.lookups
            .get(&kind)
            .map(|records| records.iter().filter_map(Record::name).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct ViewOptions {
    pub kind: EntityKind,
    pub page_limit: usize,
    pub debounce: Duration,
    pub sort: SortOption,
    pub filters: Fields,
}

impl ViewOptions {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            page_limit: 500,
            debounce: Duration::from_millis(500),
            sort: SortOption::default(),
            filters: Fields::new(),
        }
    }

    pub fn page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit;
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn sort(mut self, sort: SortOption) -> Self {
        self.sort = sort;
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    fn initial_state(&self) -> ViewState {
        let mut state = ViewState::new(self.kind, self.page_limit).with_sort(self.sort);
        state.filters.equality = self.filters.clone();
        state
    }
}

/// UI-side handle on a mounted view.
pub struct ViewHandle {
    kind: EntityKind,
    commands: mpsc::UnboundedSender<ViewCommand>,
    snapshots: watch::Receiver<ViewSnapshot>,
    hub: Arc<SubscriptionHub>,
    task: JoinHandle<()>,
}

impl ViewHandle {
    /// Mounts a view: subscribes to `hub`, issues the first fetch and keeps
    /// the view current until [`unmount`](Self::unmount).
    pub fn spawn(
        gateway: Arc<dyn DataGateway>,
        hub: Arc<SubscriptionHub>,
        table: Arc<ProjectionTable>,
        options: ViewOptions,
    ) -> Self {
        let search_columns = EntitySchema::for_kind(options.kind).search_columns().to_vec();
        let mut controller = QueryController::new(options.initial_state(), table, search_columns);

        // subscribe before the first fetch so nothing committed meanwhile is missed
        let (subscription, records) = hub.channel_scoped();
        let first = controller.refresh();

        let (snapshot_tx, snapshots) = watch::channel(ViewSnapshot::of(&controller));
        let (commands, command_rx) = mpsc::unbounded_channel();

        let session = ViewSession {
            gateway,
            hub: Arc::clone(&hub),
            controller,
            debounce: options.debounce,
            snapshots: snapshot_tx,
        };
        let task = tokio::spawn(session.run(command_rx, subscription, records, first));

        Self {
            kind: options.kind,
            commands,
            snapshots,
            hub,
            task,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn hub(&self) -> &Arc<SubscriptionHub> {
        &self.hub
    }

    /// Free-text query; applied once it has been left alone for the debounce delay.
    pub fn set_query(&self, query: impl Into<String>) -> Result<()> {
        self.send(ViewCommand::SetQuery(query.into()))
    }

    pub fn set_filter(&self, field: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        self.send(ViewCommand::SetFilter(field.into(), value.into()))
    }

    pub fn clear_filter(&self, field: impl Into<String>) -> Result<()> {
        self.send(ViewCommand::ClearFilter(field.into()))
    }

    pub fn set_sort(&self, sort: SortOption) -> Result<()> {
        self.send(ViewCommand::SetSort(sort))
    }

    pub fn load_more(&self) -> Result<()> {
        self.send(ViewCommand::LoadMore)
    }

    pub fn refresh(&self) -> Result<()> {
        self.send(ViewCommand::Refresh)
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ViewSnapshot> {
        self.snapshots.clone()
    }

    /// Waits until a published snapshot satisfies `predicate`.
    pub async fn wait_for(&self, mut predicate: impl FnMut(&ViewSnapshot) -> bool) -> Result<ViewSnapshot> {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| MirrorError::TransportFailure(format!("{} view has stopped", self.kind)))?;
        Ok(snapshot.clone())
    }

    /// Drops the hub subscription and the view state. Waits for the session to end.
    pub async fn unmount(self) -> Result<()> {
        let _ = self.commands.send(ViewCommand::Unmount);
        self.task
            .await
            .map_err(|err| MirrorError::Unknown(format!("view session failed: {}", err)))
    }

    fn send(&self, command: ViewCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| MirrorError::TransportFailure(format!("{} view has stopped", self.kind)))
    }
}

type Fetch = (u64, JoinHandle<Result<Vec<Record>>>);
type LookupFetch = BoxFuture<'static, (EntityKind, u64, Result<Vec<Record>>)>;

struct ViewSession {
    gateway: Arc<dyn DataGateway>,
    hub: Arc<SubscriptionHub>,
    controller: QueryController,
    debounce: Duration,
    snapshots: watch::Sender<ViewSnapshot>,
}

impl ViewSession {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ViewCommand>,
        subscription: Subscription,
        mut records: mpsc::UnboundedReceiver<SharedRecord>,
        first: Option<FetchTicket>,
    ) {
        let kind = self.controller.state().kind;
        let mut fetch: Option<Fetch> = None;
        let mut lookups: FuturesUnordered<LookupFetch> = FuturesUnordered::new();
        let mut pending_query: Option<(String, Instant)> = None;

        info!(view = %kind, hub = self.hub.name(), "view mounted");
        if let Some(ticket) = first {
            self.start_fetch(&mut fetch, ticket);
        }
        self.schedule_lookups(&mut lookups);
        self.publish();

        loop {
            let deadline = pending_query.as_ref().map(|(_, at)| *at);

            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    let ticket = match command {
                        ViewCommand::SetQuery(text) => {
                            pending_query = Some((text, Instant::now() + self.debounce));
                            None
                        }
                        ViewCommand::SetFilter(field, value) => self.controller.set_filter(field, value),
                        ViewCommand::ClearFilter(field) => self.controller.clear_filter(&field),
                        ViewCommand::SetSort(sort) => self.controller.set_sort(sort),
                        ViewCommand::LoadMore => self.controller.load_more(),
                        ViewCommand::Refresh => self.controller.refresh(),
                        ViewCommand::Unmount => break,
                    };
                    if let Some(ticket) = ticket {
                        self.start_fetch(&mut fetch, ticket);
                    }
                }
                Some(record) = records.recv() => {
                    self.controller.apply(&record);
                    self.schedule_lookups(&mut lookups);
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some((text, _)) = pending_query.take()
                        && let Some(ticket) = self.controller.set_query(text)
                    {
                        self.start_fetch(&mut fetch, ticket);
                    }
                }
                Some(joined) = OptionFuture::from(fetch.as_mut().map(|(_, handle)| handle)) => {
                    let generation = fetch.take().map(|(generation, _)| generation).unwrap_or_default();
                    let result = joined.unwrap_or_else(|err| {
                        Err(MirrorError::Unknown(format!("fetch task failed: {}", err)))
                    });
                    if let Some(ticket) = self.controller.complete(generation, result) {
                        self.start_fetch(&mut fetch, ticket);
                    }
                }
                Some((lookup, generation, result)) = lookups.next(), if !lookups.is_empty() => {
                    self.controller.set_lookup(lookup, generation, result);
                }
            }

            self.publish();
        }

        drop(subscription);
        if let Some((_, handle)) = fetch {
            handle.abort();
        }
        info!(view = %kind, "view unmounted");
    }

    fn start_fetch(&self, slot: &mut Option<Fetch>, ticket: FetchTicket) {
        let gateway = Arc::clone(&self.gateway);
        let FetchTicket {
            generation,
            kind,
            query,
            ..
        } = ticket;
        debug!(view = %kind, generation, channel = %format!("{}-find-all", kind.table_name()), "fetching");

        let handle = tokio::spawn(async move { gateway.find_all(kind, query).await });
        if let Some((_, previous)) = slot.replace((generation, handle)) {
            previous.abort();
        }
    }

    fn schedule_lookups(&mut self, lookups: &mut FuturesUnordered<LookupFetch>) {
        for LookupTicket { generation, kind, query } in self.controller.take_stale_lookups() {
            let gateway = Arc::clone(&self.gateway);
            lookups.push(Box::pin(async move { (kind, generation, gateway.find_all(kind, query).await) }));
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(ViewSnapshot::of(&self.controller));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MutationGateway, Operation, Reply};
    use crate::notify::{ChangeNotifier, HubRegistry};
    use crate::storage::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGateway {
        inner: MutationGateway,
        audio_fetches: AtomicUsize,
    }

    #[async_trait]
    impl DataGateway for CountingGateway {
        async fn execute(&self, operation: Operation) -> Result<Reply> {
            if matches!(operation, Operation::FindAll { kind: EntityKind::Audio, .. }) {
                self.audio_fetches.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.execute(operation).await
        }
    }

    fn fixture() -> (Arc<CountingGateway>, Arc<SubscriptionHub>) {
        let registry = HubRegistry::new();
        let hub = Arc::new(SubscriptionHub::new("audios"));
        registry.attach(&hub);
        let inner = MutationGateway::new(Arc::new(InMemoryStore::new()))
            .with_hook(Arc::new(ChangeNotifier::new(registry)));
        let gateway = Arc::new(CountingGateway {
            inner,
            audio_fetches: AtomicUsize::new(0),
        });
        (gateway, hub)
    }

    async fn create_audio(gateway: &CountingGateway, name: &str) -> Record {
        gateway
            .create(EntityKind::Audio, Fields::from([("name".to_string(), Value::from(name))]))
            .await
            .unwrap()
    }

    fn mount(gateway: &Arc<CountingGateway>, hub: &Arc<SubscriptionHub>) -> ViewHandle {
        let gateway: Arc<dyn DataGateway> = gateway.clone();
        ViewHandle::spawn(
            gateway,
            Arc::clone(hub),
            Arc::new(ProjectionTable::builtin()),
            ViewOptions::new(EntityKind::Audio),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_changes_are_debounced() {
        let (gateway, hub) = fixture();
        create_audio(&gateway, "Morning news").await;
        create_audio(&gateway, "Podcast").await;

        let view = mount(&gateway, &hub);
        view.wait_for(|s| !s.loading && s.items.len() == 2).await.unwrap();
        assert_eq!(gateway.audio_fetches.load(Ordering::SeqCst), 1);

        for partial in ["n", "ne", "new"] {
            view.set_query(partial).unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let last_keystroke = Instant::now();
        view.set_query("news").unwrap();

        let snapshot = view
            .wait_for(|s| !s.loading && s.filters.query == "news" && s.items.len() == 1)
            .await
            .unwrap();
        assert!(last_keystroke.elapsed() >= Duration::from_millis(500));
        assert_eq!(snapshot.names(), vec!["Morning news"]);
        assert_eq!(gateway.audio_fetches.load(Ordering::SeqCst), 2);

        view.unmount().await.unwrap();
    }

    #[tokio::test]
    async fn test_live_records_reach_view_until_unmount() {
        let (gateway, hub) = fixture();
        let view = mount(&gateway, &hub);
        view.wait_for(|s| !s.loading).await.unwrap();
        assert_eq!(hub.listener_count(), 1);

        let created = create_audio(&gateway, "Fresh upload").await;
        let snapshot = view.wait_for(|s| s.items.len() == 1).await.unwrap();
        assert_eq!(snapshot.items[0].id, created.id);

        view.unmount().await.unwrap();
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_category_lookup_follows_changes() {
        let (gateway, hub) = fixture();
        let view = mount(&gateway, &hub);
        view.wait_for(|s| s.lookups.contains_key(&EntityKind::Category))
            .await
            .unwrap();

        gateway
            .create(EntityKind::Category, Fields::from([("name".to_string(), Value::from("News"))]))
            .await
            .unwrap();
        let snapshot = view
            .wait_for(|s| s.lookup_names(EntityKind::Category) == vec!["News"])
            .await
            .unwrap();
        assert!(snapshot.items.is_empty());

        view.unmount().await.unwrap();
    }
}
