use crate::batch::BatchJob;
use crate::config::MirrorConfig;
use crate::core::{EntityKind, Fields, Result};
use crate::gateway::{DataGateway, MutationGateway};
use crate::ipc::{GatewayClient, GatewayServer, ServerMetrics, spawn_gateway_server};
use crate::notify::{ChangeNotifier, HubRegistry, SubscriptionHub};
use crate::storage::InMemoryStore;
use crate::view::{ProjectionTable, ViewHandle, ViewOptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// The wired-up mirroring layer: store and gateway on one side of the
/// request boundary, hubs and views on the other.
///
/// Must be started from within a tokio runtime.
pub struct MirrorRuntime {
    config: MirrorConfig,
    store: Arc<InMemoryStore>,
    gateway: Arc<MutationGateway>,
    registry: HubRegistry,
    server: GatewayServer,
    table: Arc<ProjectionTable>,
    next_hub: AtomicU64,
}

impl MirrorRuntime {
    pub fn start(config: MirrorConfig) -> Result<Self> {
        Self::with_store(config, Arc::new(InMemoryStore::new()))
    }

    pub fn with_store(config: MirrorConfig, store: Arc<InMemoryStore>) -> Result<Self> {
        config.validate()?;

        let registry = HubRegistry::new();
        let notifier = ChangeNotifier::new(registry.clone()).with_channel(config.channel.clone());
        let gateway = Arc::new(MutationGateway::new(Arc::clone(&store)).with_hook(Arc::new(notifier)));
        let server = spawn_gateway_server(Arc::clone(&gateway), config.ipc_queue_depth);

        info!(
            channel = %config.channel,
            page_limit = config.page_limit,
            batch_limit = config.batch_limit,
            "mirror runtime started"
        );

        Ok(Self {
            config,
            store,
            gateway,
            registry,
            server,
            table: Arc::new(ProjectionTable::builtin()),
            next_hub: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    /// Store-side gateway, bypassing the request queue.
    pub fn gateway(&self) -> &Arc<MutationGateway> {
        &self.gateway
    }

    /// Display-side gateway, going through the request queue.
    pub fn client(&self) -> GatewayClient {
        self.server.client.clone()
    }

    pub fn server_metrics(&self) -> &Arc<ServerMetrics> {
        &self.server.metrics
    }

    pub fn registry(&self) -> &HubRegistry {
        &self.registry
    }

    pub fn projection_table(&self) -> &Arc<ProjectionTable> {
        &self.table
    }

    /// New hub receiving records by reference.
    pub fn open_hub(&self, name: &str) -> Arc<SubscriptionHub> {
        let hub = Arc::new(SubscriptionHub::new(self.hub_name(name)));
        self.registry.attach(&hub);
        hub
    }

    /// New hub receiving records in their JSON wire form.
    pub fn open_remote_hub(&self, name: &str) -> Arc<SubscriptionHub> {
        let hub = Arc::new(SubscriptionHub::new(self.hub_name(name)));
        // the pump ends on its own once the hub is gone
        let _pump = self.registry.attach_wire(&hub);
        hub
    }

    /// View options carrying the configured page size and debounce.
    pub fn view_options(&self, kind: EntityKind) -> ViewOptions {
        ViewOptions::new(kind)
            .page_limit(self.config.page_limit)
            .debounce(self.config.debounce)
    }

    /// Mounts a view on its own hub, talking to the store through the client.
    pub fn open_view(&self, options: ViewOptions) -> ViewHandle {
        let hub = self.open_hub(options.kind.table_name());
        self.mount(hub, options)
    }

    /// Like [`open_view`](Self::open_view), over a wire-linked hub.
    pub fn open_remote_view(&self, options: ViewOptions) -> ViewHandle {
        let hub = self.open_remote_hub(options.kind.table_name());
        self.mount(hub, options)
    }

    pub fn start_batch(
        &self,
        hub: &Arc<SubscriptionHub>,
        kind: EntityKind,
        payloads: Vec<Fields>,
    ) -> Result<BatchJob> {
        let client: Arc<dyn DataGateway> = Arc::new(self.client());
        BatchJob::start(client, hub, kind, payloads, self.config.batch_limit)
    }

    /// Points every uncategorized record of `kind` at the configured default
    /// category, creating it when missing.
    pub async fn assign_default_category(&self, kind: EntityKind) -> Result<usize> {
        self.gateway
            .assign_default(kind, "categoryId", EntityKind::Category, &self.config.default_category)
            .await
    }

    /// Stops the gateway server. Views still mounted see transport failures.
    pub async fn shutdown(self) {
        self.server.handle.abort();
        let _ = self.server.handle.await;
        info!("mirror runtime stopped");
    }

    fn mount(&self, hub: Arc<SubscriptionHub>, options: ViewOptions) -> ViewHandle {
        let client: Arc<dyn DataGateway> = Arc::new(self.client());
        ViewHandle::spawn(client, hub, Arc::clone(&self.table), options)
    }

    fn hub_name(&self, name: &str) -> String {
        format!("{}#{}", name, self.next_hub.fetch_add(1, Ordering::Relaxed))
    }
}
