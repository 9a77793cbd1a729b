//! Display-side mirror of the store: per-view state, the fold that keeps it
//! current, and the session task that drives fetches.

pub mod controller;
pub mod projection;
pub mod reducer;
pub mod session;
pub mod state;

pub use controller::{FetchTicket, LookupTicket, Phase, QueryController};
pub use projection::{DeriveFields, Effect, Projected, ProjectionRule, ProjectionTable};
pub use reducer::{fold, try_apply};
pub use session::{ViewCommand, ViewHandle, ViewOptions, ViewSnapshot};
pub use state::{SortOption, ViewFilters, ViewState};
