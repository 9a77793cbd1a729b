// ============================================================================
// viewmirror Library
// ============================================================================
//
// Reactive mirroring of an in-memory store into display views: a mutation
// gateway that broadcasts every committed change, per-view subscription hubs,
// and view sessions that fold the broadcasts into their cached slice.
//
// ============================================================================

pub mod batch;
pub mod config;
pub mod core;
pub mod facade;
pub mod gateway;
pub mod ipc;
pub mod notify;
pub mod query;
pub mod storage;
pub mod view;

// Re-export main types for convenience
pub use batch::{BatchFailure, BatchJob, BatchOutcome, BatchProgress, BatchProgressTracker, BatchSummary, create_batch};
pub use config::MirrorConfig;
pub use core::{EntityKind, FailureKind, Fields, MirrorError, Record, RecordId, Result, Value};
pub use facade::MirrorRuntime;
pub use gateway::{DataGateway, MutationGateway, Operation, Reply};
pub use ipc::{GatewayClient, spawn_gateway_server};
pub use notify::{
    Action, ChangeNotifier, HubRegistry, PostCommitHook, SubscriptionHub, TRANSACTION_CHANNEL, TransactionRecord,
};
pub use query::{Collator, FindQuery, SortDirection};
pub use storage::InMemoryStore;
pub use view::{ProjectionTable, SortOption, ViewHandle, ViewOptions, ViewSnapshot, ViewState, fold};
