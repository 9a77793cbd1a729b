use super::{Projected, ProjectionTable, ViewState};
use crate::core::{Record, RecordId, Result};
use crate::notify::{Action, TransactionRecord};
use crate::query::RecordComparator;
use std::cmp::Ordering;
use tracing::warn;

/// Folds one transaction record into a view state.
///
/// Malformed records leave the state unchanged.
pub fn fold(state: ViewState, record: &TransactionRecord, table: &ProjectionTable) -> ViewState {
    let mut state = state;
    if let Err(err) = try_apply(&mut state, record, table) {
        warn!(view = %state.kind, error = %err, "dropping transaction record");
    }
    state
}

/// Applies `record` to `state` and returns the ids of items that were
/// created or updated by it. Fails without touching `state` when the record
/// is malformed.
pub fn try_apply(state: &mut ViewState, record: &TransactionRecord, table: &ProjectionTable) -> Result<Vec<RecordId>> {
    record.validate()?;

    let mut touched = Vec::new();
    for projected in table.project(record, state.kind) {
        match projected {
            Projected::Apply(own) => {
                if let Some(id) = apply_own(state, &own) {
                    touched.push(id);
                }
            }
            Projected::LookupStale(kind) => {
                state.stale_lookups.insert(kind);
            }
        }
    }
    Ok(touched)
}

fn apply_own(state: &mut ViewState, record: &TransactionRecord) -> Option<RecordId> {
    let mut fields = record.fields.clone();
    fields.remove("id");

    match record.action {
        Action::Create => {
            let item = Record::new(state.kind, record.id, fields);
            match state.position(&record.id) {
                Some(index) => state.items[index] = item,
                None => {
                    let index = insert_position(state, &item);
                    state.items.insert(index, item);
                }
            }
            Some(record.id)
        }
        Action::Update => {
            let index = state.position(&record.id)?;
            state.items[index].merge(&fields);
            Some(record.id)
        }
        Action::Destroy => {
            state.items.retain(|item| item.id != record.id);
            None
        }
    }
}

/// Before the first item that does not sort strictly ahead of `item`;
/// the front when the sort option has no local comparator.
fn insert_position(state: &ViewState, item: &Record) -> usize {
    let keys = state.filters.sort.sort_keys();
    if keys.is_empty() {
        return 0;
    }
    let comparator = RecordComparator::new(&keys);
    state
        .items
        .iter()
        .position(|existing| comparator.compare(item, existing).unwrap_or(Ordering::Equal) != Ordering::Greater)
        .unwrap_or(state.items.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EntityKind, Fields, MirrorError, Value};
    use crate::view::SortOption;

    fn fields(pairs: &[(&str, Value)]) -> Fields {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn created(id: RecordId, name: &str, count: i64) -> TransactionRecord {
        TransactionRecord::new(
            EntityKind::Audio,
            Action::Create,
            id,
            fields(&[("name", name.into()), ("recordingsCount", count.into())]),
        )
    }

    fn names(state: &ViewState) -> Vec<&str> {
        state.items.iter().filter_map(Record::name).collect()
    }

    fn audio_view(sort: SortOption) -> ViewState {
        ViewState::new(EntityKind::Audio, 500).with_sort(sort)
    }

    #[test]
    fn test_create_is_idempotent() {
        let table = ProjectionTable::builtin();
        let record = created(RecordId::new(), "Show", 1);

        let once = fold(audio_view(SortOption::Unsorted), &record, &table);
        let twice = fold(once.clone(), &record, &table);
        assert_eq!(once, twice);
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn test_create_without_comparator_prepends() {
        let table = ProjectionTable::builtin();
        let mut state = audio_view(SortOption::Unsorted);
        for name in ["first", "second", "third"] {
            state = fold(state, &created(RecordId::new(), name, 0), &table);
        }
        assert_eq!(names(&state), vec!["third", "second", "first"]);
    }

    #[test]
    fn test_create_lands_at_sorted_position() {
        let table = ProjectionTable::builtin();
        let mut state = audio_view(SortOption::RecordingsCountDesc);
        for (name, count) in [("nine", 9), ("five", 5), ("one", 1)] {
            state = fold(state, &created(RecordId::new(), name, count), &table);
        }
        assert_eq!(names(&state), vec!["nine", "five", "one"]);

        state = fold(state, &created(RecordId::new(), "other five", 5), &table);
        assert_eq!(names(&state), vec!["nine", "other five", "five", "one"]);
    }

    #[test]
    fn test_create_with_collated_sort() {
        let table = ProjectionTable::builtin();
        let mut state = audio_view(SortOption::NameAsc);
        for name in ["Bob", "alice", "Åke"] {
            state = fold(state, &created(RecordId::new(), name, 0), &table);
        }
        assert_eq!(names(&state), vec!["alice", "Åke", "Bob"]);
    }

    #[test]
    fn test_create_replaces_existing_in_place() {
        let table = ProjectionTable::builtin();
        let id = RecordId::new();
        let mut state = audio_view(SortOption::Unsorted);
        state = fold(state, &created(RecordId::new(), "a", 0), &table);
        state = fold(state, &created(id, "b", 0), &table);
        state = fold(state, &created(RecordId::new(), "c", 0), &table);

        state = fold(state, &created(id, "b2", 0), &table);
        assert_eq!(names(&state), vec!["c", "b2", "a"]);
    }

    #[test]
    fn test_update_merges_present_fields_only() {
        let table = ProjectionTable::builtin();
        let id = RecordId::new();
        let state = fold(audio_view(SortOption::Unsorted), &created(id, "Show", 3), &table);

        let patch = TransactionRecord::new(
            EntityKind::Audio,
            Action::Update,
            id,
            fields(&[("recordingsCount", 4i64.into())]),
        );
        let state = fold(state, &patch, &table);
        let item = state.get(&id).unwrap();
        assert_eq!(item.name(), Some("Show"));
        assert_eq!(item.value("recordingsCount"), &Value::Integer(4));
    }

    #[test]
    fn test_update_and_destroy_of_absent_id_are_noops() {
        let table = ProjectionTable::builtin();
        let state = fold(audio_view(SortOption::Unsorted), &created(RecordId::new(), "Show", 3), &table);

        let update = TransactionRecord::new(
            EntityKind::Audio,
            Action::Update,
            RecordId::new(),
            fields(&[("name", "Ghost".into())]),
        );
        let destroy = TransactionRecord::destroyed(EntityKind::Audio, RecordId::new());

        assert_eq!(fold(state.clone(), &update, &table), state);
        assert_eq!(fold(state.clone(), &destroy, &table), state);
    }

    #[test]
    fn test_destroy_removes_item() {
        let table = ProjectionTable::builtin();
        let id = RecordId::new();
        let state = fold(audio_view(SortOption::Unsorted), &created(id, "Show", 3), &table);
        let state = fold(state, &TransactionRecord::destroyed(EntityKind::Audio, id), &table);
        assert!(state.is_empty());
    }

    #[test]
    fn test_other_kinds_are_ignored() {
        let table = ProjectionTable::builtin();
        let state = audio_view(SortOption::Unsorted);
        let video = TransactionRecord::new(
            EntityKind::Video,
            Action::Create,
            RecordId::new(),
            fields(&[("name", "Clip".into())]),
        );
        assert_eq!(fold(state.clone(), &video, &table), state);
    }

    #[test]
    fn test_transcription_progress_projects_onto_item() {
        let table = ProjectionTable::builtin();
        let id = RecordId::new();
        let state = fold(audio_view(SortOption::Unsorted), &created(id, "Show", 3), &table);

        let job = |phase: &str| {
            TransactionRecord::new(
                EntityKind::Transcription,
                Action::Update,
                RecordId::new(),
                fields(&[("targetId", id.into()), ("state", phase.into())]),
            )
        };

        let state = fold(state, &job("processing"), &table);
        let item = state.get(&id).unwrap();
        assert_eq!(item.value("transcribing"), &Value::Boolean(true));
        assert_eq!(item.value("transcribed"), &Value::Boolean(false));

        let state = fold(state, &job("finished"), &table);
        let item = state.get(&id).unwrap();
        assert_eq!(item.value("transcribing"), &Value::Boolean(false));
        assert_eq!(item.value("transcribed"), &Value::Boolean(true));
    }

    #[test]
    fn test_category_change_marks_lookup_stale() {
        let table = ProjectionTable::builtin();
        let category = TransactionRecord::new(
            EntityKind::Category,
            Action::Create,
            RecordId::new(),
            fields(&[("name", "News".into())]),
        );
        let state = fold(audio_view(SortOption::Unsorted), &category, &table);
        assert!(state.stale_lookups.contains(&EntityKind::Category));
        assert!(state.is_empty());
    }

    #[test]
    fn test_malformed_record_rejected() {
        let table = ProjectionTable::builtin();
        let mut state = audio_view(SortOption::Unsorted);
        let record = TransactionRecord::new(
            EntityKind::Audio,
            Action::Create,
            RecordId::new(),
            fields(&[("id", RecordId::new().into()), ("name", "Liar".into())]),
        );

        let err = try_apply(&mut state, &record, &table).unwrap_err();
        assert!(matches!(err, MirrorError::MalformedRecord(_)));
        assert!(state.is_empty());
        assert!(fold(state.clone(), &record, &table).is_empty());
    }
}
