use super::{GatewayClient, IpcRequest};
use crate::gateway::DataGateway;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Request counters of a running gateway server.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    requests_total: AtomicU64,
    requests_failed: AtomicU64,
}

impl ServerMetrics {
    fn on_request(&self) -> u64 {
        self.requests_total.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn on_failure(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn requests_failed(&self) -> u64 {
        self.requests_failed.load(Ordering::Relaxed)
    }
}

pub struct GatewayServer {
    pub client: GatewayClient,
    pub metrics: Arc<ServerMetrics>,
    pub handle: JoinHandle<()>,
}

/// Serves `gateway` behind a request queue of `queue_depth` entries. Each
/// request runs on its own task, so a slow request never holds up the queue.
/// The server stops once every client has been dropped.
pub fn spawn_gateway_server<G>(gateway: Arc<G>, queue_depth: usize) -> GatewayServer
where
    G: DataGateway + 'static,
{
    let (tx, mut rx) = mpsc::channel::<IpcRequest>(queue_depth.max(1));
    let metrics = Arc::new(ServerMetrics::default());
    let server_metrics = Arc::clone(&metrics);

    let handle = tokio::spawn(async move {
        info!(queue_depth, "gateway server started");
        while let Some(request) = rx.recv().await {
            let seen = server_metrics.on_request();
            let gateway = Arc::clone(&gateway);
            let metrics = Arc::clone(&server_metrics);

            tokio::spawn(async move {
                let IpcRequest { operation, reply } = request;
                let channel = operation.channel();
                let result = gateway.execute(operation).await;
                if let Err(err) = &result {
                    metrics.on_failure();
                    debug!(%channel, error = %err, "request failed");
                }
                if reply.send(result).is_err() {
                    warn!(%channel, "caller went away before the reply");
                }
            });

            if seen % 1000 == 0 {
                info!(requests = seen, "gateway requests served");
            }
        }
        info!("gateway server stopped");
    });

    GatewayServer {
        client: GatewayClient::new(tx),
        metrics,
        handle,
    }
}
