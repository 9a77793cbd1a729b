use super::EntitySchema;
use crate::core::{Fields, MirrorError, Record, RecordId, Result, Value};
use std::collections::{BTreeMap, HashMap};

/// Rows of one entity kind.
///
/// Rows are kept in insertion order, which is the store-default order of
/// `find_all` when no ordering is requested. Unique columns carry a hash
/// index so constraint checks do not scan the table.
#[derive(Debug, Clone)]
pub struct RecordTable {
    schema: EntitySchema,
    rows: BTreeMap<u64, Record>,
    positions: HashMap<RecordId, u64>,
    next_seq: u64,
    unique_indexes: HashMap<String, HashMap<Value, RecordId>>,
}

impl RecordTable {
    pub fn new(schema: EntitySchema) -> Self {
        let unique_indexes = schema
            .unique_columns()
            .map(|column| (column.name.clone(), HashMap::new()))
            .collect();

        Self {
            schema,
            rows: BTreeMap::new(),
            positions: HashMap::new(),
            next_seq: 0,
            unique_indexes,
        }
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.positions.get(id).and_then(|seq| self.rows.get(seq))
    }

    /// Rows in insertion order.
    pub fn scan(&self) -> impl Iterator<Item = &Record> {
        self.rows.values()
    }

    pub fn insert(&mut self, record: Record) -> Result<()> {
        if self.positions.contains_key(&record.id) {
            return Err(MirrorError::ConstraintViolation(format!(
                "{} '{}' already exists",
                record.kind, record.id
            )));
        }
        self.check_uniqueness(&record.fields, None)?;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.add_to_indexes(&record);
        self.positions.insert(record.id, seq);
        self.rows.insert(seq, record);
        Ok(())
    }

    /// Merges `patch` into the stored row and returns the post-merge copy.
    pub fn update(&mut self, id: &RecordId, patch: &Fields) -> Result<Record> {
        let seq = *self
            .positions
            .get(id)
            .ok_or_else(|| MirrorError::NotFound(format!("{} '{}'", self.schema.kind(), id)))?;

        let mut merged = self
            .rows
            .get(&seq)
            .cloned()
            .ok_or_else(|| MirrorError::NotFound(format!("{} '{}'", self.schema.kind(), id)))?;
        merged.merge(patch);
        self.check_uniqueness(&merged.fields, Some(id))?;

        if let Some(old) = self.rows.get(&seq).cloned() {
            self.remove_from_indexes(&old);
        }
        self.add_to_indexes(&merged);
        self.rows.insert(seq, merged.clone());
        Ok(merged)
    }

    pub fn delete(&mut self, id: &RecordId) -> Result<Record> {
        let seq = self
            .positions
            .remove(id)
            .ok_or_else(|| MirrorError::NotFound(format!("{} '{}'", self.schema.kind(), id)))?;
        let record = self
            .rows
            .remove(&seq)
            .ok_or_else(|| MirrorError::NotFound(format!("{} '{}'", self.schema.kind(), id)))?;
        self.remove_from_indexes(&record);
        Ok(record)
    }

    /// Ids of rows whose `column` equals `value`, in insertion order.
    pub fn find_by(&self, column: &str, value: &Value) -> Vec<RecordId> {
        if let Some(index) = self.unique_indexes.get(column) {
            return index.get(value).copied().into_iter().collect();
        }
        self.rows
            .values()
            .filter(|record| record.value(column) == value)
            .map(|record| record.id)
            .collect()
    }

    fn check_uniqueness(&self, fields: &Fields, ignore: Option<&RecordId>) -> Result<()> {
        for (column, index) in &self.unique_indexes {
            let Some(value) = fields.get(column) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if let Some(owner) = index.get(value)
                && Some(owner) != ignore
            {
                return Err(MirrorError::ConstraintViolation(format!(
                    "Unique constraint violation: {}.{} already contains value '{}'",
                    self.schema.kind(),
                    column,
                    value
                )));
            }
        }
        Ok(())
    }

    fn add_to_indexes(&mut self, record: &Record) {
        for (column, index) in &mut self.unique_indexes {
            if let Some(value) = record.get(column)
                && !value.is_null()
            {
                index.insert(value.clone(), record.id);
            }
        }
    }

    fn remove_from_indexes(&mut self, record: &Record) {
        for (column, index) in &mut self.unique_indexes {
            if let Some(value) = record.get(column)
                && index.get(value) == Some(&record.id)
            {
                index.remove(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EntityKind;

    fn category(name: &str) -> Record {
        Record::new(
            EntityKind::Category,
            RecordId::new(),
            Fields::from([("name".to_string(), Value::from(name))]),
        )
    }

    #[test]
    fn test_insert_and_scan_keeps_insertion_order() {
        let mut table = RecordTable::new(EntitySchema::for_kind(EntityKind::Category));
        table.insert(category("b")).unwrap();
        table.insert(category("a")).unwrap();

        let names: Vec<_> = table.scan().filter_map(|r| r.name()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_unique_violation_on_insert_and_update() {
        let mut table = RecordTable::new(EntitySchema::for_kind(EntityKind::Category));
        let first = category("Default");
        let second = category("Music");
        let second_id = second.id;
        table.insert(first).unwrap();
        table.insert(second).unwrap();

        assert!(matches!(
            table.insert(category("Default")),
            Err(MirrorError::ConstraintViolation(_))
        ));

        let rename = Fields::from([("name".to_string(), Value::from("Default"))]);
        assert!(matches!(
            table.update(&second_id, &rename),
            Err(MirrorError::ConstraintViolation(_))
        ));

        // renaming a row to its own value is not a conflict
        let same = Fields::from([("name".to_string(), Value::from("Music"))]);
        assert!(table.update(&second_id, &same).is_ok());
    }

    #[test]
    fn test_update_frees_old_unique_value() {
        let mut table = RecordTable::new(EntitySchema::for_kind(EntityKind::Category));
        let record = category("Old");
        let id = record.id;
        table.insert(record).unwrap();

        let patch = Fields::from([("name".to_string(), Value::from("New"))]);
        let merged = table.update(&id, &patch).unwrap();
        assert_eq!(merged.name(), Some("New"));

        table.insert(category("Old")).unwrap();
        assert_eq!(table.find_by("name", &Value::from("New")), vec![id]);
    }

    #[test]
    fn test_missing_rows_are_not_found() {
        let mut table = RecordTable::new(EntitySchema::for_kind(EntityKind::Category));
        let missing = RecordId::new();
        assert!(matches!(table.delete(&missing), Err(MirrorError::NotFound(_))));
        assert!(matches!(
            table.update(&missing, &Fields::new()),
            Err(MirrorError::NotFound(_))
        ));
    }
}
