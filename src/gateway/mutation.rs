use super::{DataGateway, Operation, Reply};
use crate::core::{EntityKind, Fields, MirrorError, Record, RecordId, Result, Value};
use crate::notify::{PostCommitHook, TransactionRecord};
use crate::query::FindQuery;
use crate::storage::{CREATED_AT, EntitySchema, InMemoryStore, UPDATED_AT};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info_span};

/// Owns the store and executes operations against it.
///
/// Every committed create, update and destroy is handed to the post-commit
/// hooks exactly once, in commit order, before the call returns.
///
/// Mutations run one at a time under the commit lock: reference checks, the
/// write and the hooks of one mutation all happen before the next one starts.
/// Reads do not take the lock.
pub struct MutationGateway {
    store: Arc<InMemoryStore>,
    hooks: Vec<Arc<dyn PostCommitHook>>,
    commit_lock: Mutex<()>,
}

impl MutationGateway {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self {
            store,
            hooks: Vec::new(),
            commit_lock: Mutex::new(()),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn PostCommitHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    pub async fn dispatch(&self, operation: Operation) -> Result<Reply> {
        let target = operation.target().map(|id| id.to_string()).unwrap_or_default();
        let span = info_span!("gateway", channel = %operation.channel(), id = %target);

        async move {
            let _commit_guard = if operation.is_mutation() {
                Some(self.commit_lock.lock().await)
            } else {
                None
            };
            let reply = match operation {
                Operation::Create { kind, payload } => Reply::Record(self.insert(kind, payload).await?),
                Operation::Update { kind, id, patch } => Reply::Record(self.patch(kind, id, patch).await?),
                Operation::Destroy { kind, id } => Reply::Record(self.remove(kind, id).await?),
                Operation::FindAll { kind, query } => Reply::Records(self.select(kind, &query).await?),
                Operation::FindOne { kind, query } => {
                    Reply::Optional(self.select(kind, &query).await?.into_iter().next())
                }
            };
            Ok(reply)
        }
        .instrument(span)
        .await
    }

    /// Makes sure a `lookup_kind` record called `name` exists and points every
    /// `kind` record whose `column` is NULL at it. Returns the number of rows
    /// updated.
    pub async fn assign_default(
        &self,
        kind: EntityKind,
        column: &str,
        lookup_kind: EntityKind,
        name: &str,
    ) -> Result<usize> {
        let _commit_guard = self.commit_lock.lock().await;
        let existing = self
            .store
            .find_by(lookup_kind, "name", &Value::from(name))
            .await?
            .into_iter()
            .next();

        let lookup_id = match existing {
            Some(id) => id,
            None => {
                let payload = Fields::from([("name".to_string(), Value::from(name))]);
                self.insert(lookup_kind, payload).await?.id
            }
        };

        let orphans: Vec<RecordId> = self
            .store
            .scan(kind)
            .await?
            .into_iter()
            .filter(|record| record.value(column).is_null())
            .map(|record| record.id)
            .collect();

        for id in &orphans {
            let patch = Fields::from([(column.to_string(), Value::from(lookup_id))]);
            self.patch(kind, *id, patch).await?;
        }

        debug!(%kind, column, %lookup_kind, name, updated = orphans.len(), "assigned default lookup");
        Ok(orphans.len())
    }

    async fn insert(&self, kind: EntityKind, payload: Fields) -> Result<Record> {
        let schema = self.store.schema(kind).await?;
        schema.validate_payload(&payload, false)?;
        self.check_references(&schema, &payload).await?;

        let now = timestamp();
        let mut fields = payload;
        fields.insert(CREATED_AT.to_string(), Value::Text(now.clone()));
        fields.insert(UPDATED_AT.to_string(), Value::Text(now));

        let record = self
            .store
            .insert(Record::new(kind, RecordId::new(), fields))
            .await?;
        self.commit(TransactionRecord::created(&record));
        Ok(record)
    }

    async fn patch(&self, kind: EntityKind, id: RecordId, patch: Fields) -> Result<Record> {
        let schema = self.store.schema(kind).await?;
        schema.validate_payload(&patch, true)?;
        self.check_references(&schema, &patch).await?;

        let mut patch = patch;
        patch.insert(UPDATED_AT.to_string(), Value::Text(timestamp()));

        let merged = self.store.update(kind, &id, &patch).await?;
        self.commit(TransactionRecord::updated(&merged));
        Ok(merged)
    }

    async fn remove(&self, kind: EntityKind, id: RecordId) -> Result<Record> {
        if !self.store.contains(kind, &id).await? {
            return Err(MirrorError::NotFound(format!("{} '{}'", kind, id)));
        }

        // foreign keys are cleared, never cascaded; one update per dependent row
        for (dependent, column) in self.store.dependents_of(kind).await {
            let rows = self
                .store
                .find_by(dependent, &column, &Value::from(id))
                .await?;
            for row in rows {
                let patch = Fields::from([
                    (column.clone(), Value::Null),
                    (UPDATED_AT.to_string(), Value::Text(timestamp())),
                ]);
                let cleared = self.store.update(dependent, &row, &patch).await?;
                self.commit(TransactionRecord::updated(&cleared));
            }
        }

        let removed = self.store.delete(kind, &id).await?;
        self.commit(TransactionRecord::destroyed(kind, id));
        Ok(removed)
    }

    async fn select(&self, kind: EntityKind, query: &FindQuery) -> Result<Vec<Record>> {
        let schema = self.store.schema(kind).await?;
        let rows = self.store.scan(kind).await?;
        Ok(query.execute(rows, schema.search_columns()))
    }

    async fn check_references(&self, schema: &EntitySchema, fields: &Fields) -> Result<()> {
        for (column, fk) in schema.foreign_keys() {
            let Some(Value::Text(target)) = fields.get(column) else {
                continue;
            };
            let target_id = RecordId::from_str(target).map_err(|_| {
                MirrorError::ConstraintViolation(format!(
                    "{}.{} is not a valid reference: '{}'",
                    schema.kind(),
                    column,
                    target
                ))
            })?;
            if !self.store.contains(fk.references, &target_id).await? {
                return Err(MirrorError::ConstraintViolation(format!(
                    "{}.{} references missing {} '{}'",
                    schema.kind(),
                    column,
                    fk.references,
                    target
                )));
            }
        }
        Ok(())
    }

    fn commit(&self, record: TransactionRecord) {
        debug!(kind = %record.kind, action = %record.action, id = %record.id, "committed");
        for hook in &self.hooks {
            hook.after_commit(&record);
        }
    }
}

/// Store timestamps: RFC 3339, UTC, fixed microsecond precision so that text
/// order equals time order.
fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl DataGateway for MutationGateway {
    async fn execute(&self, operation: Operation) -> Result<Reply> {
        self.dispatch(operation).await
    }
}
