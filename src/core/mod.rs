pub mod error;
pub mod types;
pub mod value;

pub use error::{FailureKind, MirrorError, Result};
pub use types::{Column, EntityKind, Fields, ForeignKey, OnDelete, Record, RecordId};
pub use value::{DataType, Value};
