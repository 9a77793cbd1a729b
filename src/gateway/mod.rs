pub mod mutation;
pub mod operation;

pub use mutation::MutationGateway;
pub use operation::{Operation, Reply};

use crate::core::{EntityKind, Fields, Record, RecordId, Result};
use crate::query::FindQuery;
use async_trait::async_trait;
use std::sync::Arc;

/// Request/response boundary between display surfaces and the store.
///
/// Implementors provide [`execute`](DataGateway::execute); the typed methods
/// wrap it.
#[async_trait]
pub trait DataGateway: Send + Sync {
    async fn execute(&self, operation: Operation) -> Result<Reply>;

    async fn create(&self, kind: EntityKind, payload: Fields) -> Result<Record> {
        self.execute(Operation::Create { kind, payload })
            .await?
            .into_record()
    }

    async fn update(&self, kind: EntityKind, id: RecordId, patch: Fields) -> Result<Record> {
        self.execute(Operation::Update { kind, id, patch })
            .await?
            .into_record()
    }

    async fn destroy(&self, kind: EntityKind, id: RecordId) -> Result<Record> {
        self.execute(Operation::Destroy { kind, id }).await?.into_record()
    }

    async fn find_all(&self, kind: EntityKind, query: FindQuery) -> Result<Vec<Record>> {
        self.execute(Operation::FindAll { kind, query })
            .await?
            .into_records()
    }

    async fn find_one(&self, kind: EntityKind, query: FindQuery) -> Result<Option<Record>> {
        self.execute(Operation::FindOne { kind, query })
            .await?
            .into_optional()
    }
}

#[async_trait]
impl<T: DataGateway + ?Sized> DataGateway for Arc<T> {
    async fn execute(&self, operation: Operation) -> Result<Reply> {
        (**self).execute(operation).await
    }
}
