use super::IpcRequest;
use crate::core::{MirrorError, Result};
use crate::gateway::{DataGateway, Operation, Reply};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Display-side handle on the gateway server. Cheap to clone.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    requests: mpsc::Sender<IpcRequest>,
}

impl GatewayClient {
    pub fn new(requests: mpsc::Sender<IpcRequest>) -> Self {
        Self { requests }
    }

    pub fn is_connected(&self) -> bool {
        !self.requests.is_closed()
    }
}

#[async_trait]
impl DataGateway for GatewayClient {
    async fn execute(&self, operation: Operation) -> Result<Reply> {
        let channel = operation.channel();
        let (request, reply) = IpcRequest::new(operation);

        self.requests.send(request).await.map_err(|_| {
            MirrorError::TransportFailure(format!("{}: gateway server is not running", channel))
        })?;

        reply.await.map_err(|_| {
            MirrorError::TransportFailure(format!("{}: request dropped before reply", channel))
        })?
    }
}
