pub mod memory;
pub mod schema;
pub mod table;

pub use memory::InMemoryStore;
pub use schema::{CREATED_AT, EntitySchema, MANAGED_FIELDS, UPDATED_AT};
pub use table::RecordTable;
