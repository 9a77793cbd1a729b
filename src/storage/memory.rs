use super::{EntitySchema, RecordTable};
use crate::core::{EntityKind, Fields, MirrorError, Record, RecordId, Result, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The authoritative store: one independently locked table per entity kind.
///
/// Writers to the same table are serialized by its lock; writers to different
/// tables proceed independently.
pub struct InMemoryStore {
    tables: HashMap<EntityKind, Arc<RwLock<RecordTable>>>,
}

impl InMemoryStore {
    /// Store with the built-in declaration of every entity kind.
    pub fn new() -> Self {
        Self::with_schemas(EntityKind::ALL.into_iter().map(EntitySchema::for_kind))
    }

    pub fn with_schemas(schemas: impl IntoIterator<Item = EntitySchema>) -> Self {
        let tables = schemas
            .into_iter()
            .map(|schema| (schema.kind(), Arc::new(RwLock::new(RecordTable::new(schema)))))
            .collect();
        Self { tables }
    }

    /// Handle on a table for concurrent access.
    pub fn table(&self, kind: EntityKind) -> Result<Arc<RwLock<RecordTable>>> {
        self.tables
            .get(&kind)
            .cloned()
            .ok_or_else(|| MirrorError::NotFound(format!("table '{}'", kind.table_name())))
    }

    pub async fn schema(&self, kind: EntityKind) -> Result<EntitySchema> {
        let table = self.table(kind)?;
        let guard = table.read().await;
        Ok(guard.schema().clone())
    }

    pub async fn insert(&self, record: Record) -> Result<Record> {
        let table = self.table(record.kind)?;
        let mut guard = table.write().await;
        guard.insert(record.clone())?;
        Ok(record)
    }

    pub async fn update(&self, kind: EntityKind, id: &RecordId, patch: &Fields) -> Result<Record> {
        let table = self.table(kind)?;
        let mut guard = table.write().await;
        guard.update(id, patch)
    }

    pub async fn delete(&self, kind: EntityKind, id: &RecordId) -> Result<Record> {
        let table = self.table(kind)?;
        let mut guard = table.write().await;
        guard.delete(id)
    }

    pub async fn get(&self, kind: EntityKind, id: &RecordId) -> Result<Option<Record>> {
        let table = self.table(kind)?;
        let guard = table.read().await;
        Ok(guard.get(id).cloned())
    }

    pub async fn contains(&self, kind: EntityKind, id: &RecordId) -> Result<bool> {
        Ok(self.get(kind, id).await?.is_some())
    }

    /// Snapshot of every row in insertion order.
    pub async fn scan(&self, kind: EntityKind) -> Result<Vec<Record>> {
        let table = self.table(kind)?;
        let guard = table.read().await;
        Ok(guard.scan().cloned().collect())
    }

    pub async fn find_by(&self, kind: EntityKind, column: &str, value: &Value) -> Result<Vec<RecordId>> {
        let table = self.table(kind)?;
        let guard = table.read().await;
        Ok(guard.find_by(column, value))
    }

    /// Kinds holding a foreign key to `target`, with the referencing column.
    pub async fn dependents_of(&self, target: EntityKind) -> Vec<(EntityKind, String)> {
        let mut dependents = Vec::new();
        for kind in EntityKind::ALL {
            let Ok(table) = self.table(kind) else {
                continue;
            };
            let guard = table.read().await;
            for (column, fk) in guard.schema().foreign_keys() {
                if fk.references == target {
                    dependents.push((kind, column.to_string()));
                }
            }
        }
        dependents
    }

    pub async fn row_count(&self, kind: EntityKind) -> Result<usize> {
        let table = self.table(kind)?;
        let guard = table.read().await;
        Ok(guard.len())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(name: &str, category: Option<RecordId>) -> Record {
        let mut fields = Fields::from([("name".to_string(), Value::from(name))]);
        fields.insert("categoryId".to_string(), Value::from(category));
        Record::new(EntityKind::Audio, RecordId::new(), fields)
    }

    #[tokio::test]
    async fn test_insert_get_delete() {
        let store = InMemoryStore::new();
        let record = store.insert(audio("Lesson 1", None)).await.unwrap();

        assert!(store.contains(EntityKind::Audio, &record.id).await.unwrap());
        assert_eq!(store.row_count(EntityKind::Audio).await.unwrap(), 1);

        store.delete(EntityKind::Audio, &record.id).await.unwrap();
        assert!(store.get(EntityKind::Audio, &record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_foreign_key() {
        let store = InMemoryStore::new();
        let category = RecordId::new();
        store.insert(audio("Lesson 1", Some(category))).await.unwrap();
        store.insert(audio("Lesson 2", None)).await.unwrap();
        store.insert(audio("Lesson 3", Some(category))).await.unwrap();

        let ids = store
            .find_by(EntityKind::Audio, "categoryId", &Value::from(category))
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn test_dependents_of_category() {
        let store = InMemoryStore::new();
        let dependents = store.dependents_of(EntityKind::Category).await;
        assert_eq!(
            dependents,
            vec![
                (EntityKind::Audio, "categoryId".to_string()),
                (EntityKind::Video, "categoryId".to_string()),
            ]
        );
    }
}
