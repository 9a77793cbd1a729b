//! Change notification: the post-commit hook, the broadcast to display
//! surfaces and the per-view subscription hubs that receive it.

pub mod hook;
pub mod hub;
pub mod notifier;
pub mod transaction;

pub use hook::PostCommitHook;
pub use hub::{HubStats, Listener, ListenerId, SharedRecord, Subscription, SubscriptionHub};
pub use notifier::{ChangeNotifier, HubId, HubRegistry};
pub use transaction::{Action, TRANSACTION_CHANNEL, TransactionRecord};
