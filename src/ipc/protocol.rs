use crate::core::Result;
use crate::gateway::{Operation, Reply};
use tokio::sync::oneshot;

/// One request crossing from a display surface to the gateway server.
#[derive(Debug)]
pub struct IpcRequest {
    pub operation: Operation,
    pub reply: oneshot::Sender<Result<Reply>>,
}

impl IpcRequest {
    pub fn new(operation: Operation) -> (Self, oneshot::Receiver<Result<Reply>>) {
        let (reply, rx) = oneshot::channel();
        (Self { operation, reply }, rx)
    }
}
