// ============================================================================
// Record sorting
// ============================================================================
//
// Multi-key comparator shared by the store (ORDER BY of find queries) and the
// views (insert position of created records, client-side re-sorting).
//
// - Stable sort (equal records keep their relative order)
// - NULLS LAST for ascending keys, NULLS FIRST for descending keys
// - Optional collator per key for display ordering of text
//
// ============================================================================

use super::Collator;
use crate::core::{MirrorError, Record, Result, Value};
use std::cmp::Ordering;

/// Strategy for handling NULL values during sorting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOrdering {
    NullsFirst,
    NullsLast,
}

impl NullOrdering {
    /// ASC → NULLS LAST, DESC → NULLS FIRST
    pub fn default_for_direction(descending: bool) -> Self {
        if descending {
            Self::NullsFirst
        } else {
            Self::NullsLast
        }
    }
}

/// One field of a sort specification.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
    pub null_ordering: NullOrdering,
    /// When set, text values compare with the collator instead of byte order.
    pub collator: Option<Collator>,
}

impl SortKey {
    pub fn new(field: impl Into<String>, descending: bool) -> Self {
        Self {
            field: field.into(),
            descending,
            null_ordering: NullOrdering::default_for_direction(descending),
            collator: None,
        }
    }

    pub fn collated(mut self, collator: Collator) -> Self {
        self.collator = Some(collator);
        self
    }
}

/// Compares records by a list of sort keys, first key first.
pub struct RecordComparator<'a> {
    sort_keys: &'a [SortKey],
}

impl<'a> RecordComparator<'a> {
    pub fn new(sort_keys: &'a [SortKey]) -> Self {
        Self { sort_keys }
    }

    pub fn compare(&self, a: &Record, b: &Record) -> Result<Ordering> {
        for key in self.sort_keys {
            let ordering = self.compare_values(a.value(&key.field), b.value(&key.field), key)?;
            if ordering != Ordering::Equal {
                return Ok(ordering);
            }
        }
        Ok(Ordering::Equal)
    }

    fn compare_values(&self, a: &Value, b: &Value, key: &SortKey) -> Result<Ordering> {
        let ordering = match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => match key.null_ordering {
                NullOrdering::NullsFirst => Ordering::Less,
                NullOrdering::NullsLast => Ordering::Greater,
            },
            (false, true) => match key.null_ordering {
                NullOrdering::NullsFirst => Ordering::Greater,
                NullOrdering::NullsLast => Ordering::Less,
            },
            (false, false) => match (key.collator, a, b) {
                (Some(collator), Value::Text(x), Value::Text(y)) => collator.compare(x, y),
                _ => a.compare(b).map_err(|_| {
                    MirrorError::TypeMismatch(format!(
                        "Cannot order '{}' by {} and {}",
                        key.field,
                        a.type_name(),
                        b.type_name()
                    ))
                })?,
            },
        };

        // NULL placement is fixed by the strategy, only values are reversed
        Ok(if key.descending && !a.is_null() && !b.is_null() {
            ordering.reverse()
        } else {
            ordering
        })
    }
}

/// Sorts records in place. Incomparable pairs are treated as equal.
pub fn sort_records(records: &mut [Record], sort_keys: &[SortKey]) {
    if records.is_empty() || sort_keys.is_empty() {
        return;
    }
    let comparator = RecordComparator::new(sort_keys);
    records.sort_by(|a, b| comparator.compare(a, b).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EntityKind, Fields, RecordId};

    fn record(pairs: &[(&str, Value)]) -> Record {
        let fields: Fields = pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        Record::new(EntityKind::Audio, RecordId::new(), fields)
    }

    fn names(records: &[Record]) -> Vec<&str> {
        records.iter().filter_map(|r| r.name()).collect()
    }

    #[test]
    fn test_null_ordering_defaults() {
        assert_eq!(NullOrdering::default_for_direction(false), NullOrdering::NullsLast);
        assert_eq!(NullOrdering::default_for_direction(true), NullOrdering::NullsFirst);
    }

    #[test]
    fn test_descending_integers_with_nulls_first() {
        let mut records = vec![
            record(&[("name", "a".into()), ("recordingsCount", 1i64.into())]),
            record(&[("name", "b".into())]),
            record(&[("name", "c".into()), ("recordingsCount", 5i64.into())]),
        ];
        sort_records(&mut records, &[SortKey::new("recordingsCount", true)]);
        assert_eq!(names(&records), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_multi_key_tie_break() {
        let mut records = vec![
            record(&[("name", "x".into()), ("recordingsCount", 1i64.into()), ("duration", 3.0f64.into())]),
            record(&[("name", "y".into()), ("recordingsCount", 1i64.into()), ("duration", 1.0f64.into())]),
            record(&[("name", "z".into()), ("recordingsCount", 0i64.into()), ("duration", 9.0f64.into())]),
        ];
        let keys = [SortKey::new("recordingsCount", false), SortKey::new("duration", false)];
        sort_records(&mut records, &keys);
        assert_eq!(names(&records), vec!["z", "y", "x"]);
    }

    #[test]
    fn test_collated_text_key() {
        let mut records = vec![
            record(&[("name", "Bob".into())]),
            record(&[("name", "alice".into())]),
            record(&[("name", "Åke".into())]),
        ];
        sort_records(&mut records, &[SortKey::new("name", false).collated(Collator::new())]);
        assert_eq!(names(&records), vec!["alice", "Åke", "Bob"]);

        sort_records(&mut records, &[SortKey::new("name", false)]);
        assert_eq!(names(&records), vec!["Bob", "alice", "Åke"]);
    }

    #[test]
    fn test_incomparable_values_error() {
        let keys = [SortKey::new("duration", false)];
        let comparator = RecordComparator::new(&keys);
        let a = record(&[("duration", "long".into())]);
        let b = record(&[("duration", 3i64.into())]);
        assert!(comparator.compare(&a, &b).is_err());
    }
}
