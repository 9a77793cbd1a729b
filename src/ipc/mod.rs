//! In-process stand-in for the request/response boundary between display
//! surfaces and the process that owns the store.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::GatewayClient;
pub use protocol::IpcRequest;
pub use server::{GatewayServer, ServerMetrics, spawn_gateway_server};
