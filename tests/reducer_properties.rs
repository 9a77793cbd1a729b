use proptest::prelude::*;
use std::collections::BTreeMap;
use viewmirror::core::{EntityKind, Fields, RecordId, Value};
use viewmirror::notify::{Action, TransactionRecord};
use viewmirror::{ProjectionTable, SortOption, ViewState, fold};

#[derive(Debug, Clone, Copy)]
enum Step {
    Create(usize),
    Update(usize, u8),
    Destroy(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..6usize).prop_map(Step::Create),
        (0..6usize, any::<u8>()).prop_map(|(slot, tag)| Step::Update(slot, tag)),
        (0..6usize).prop_map(Step::Destroy),
    ]
}

fn record(step: Step, ids: &[RecordId]) -> TransactionRecord {
    match step {
        Step::Create(slot) => TransactionRecord::new(
            EntityKind::Audio,
            Action::Create,
            ids[slot],
            Fields::from([("name".to_string(), Value::from(format!("Item {}", slot)))]),
        ),
        Step::Update(slot, tag) => TransactionRecord::new(
            EntityKind::Audio,
            Action::Update,
            ids[slot],
            Fields::from([("recordingsCount".to_string(), Value::Integer(tag as i64))]),
        ),
        Step::Destroy(slot) => TransactionRecord::destroyed(EntityKind::Audio, ids[slot]),
    }
}

fn empty_view() -> ViewState {
    ViewState::new(EntityKind::Audio, 500).with_sort(SortOption::Unsorted)
}

proptest! {
    #[test]
    fn test_items_track_latest_membership(steps in prop::collection::vec(step(), 0..60)) {
        let ids: Vec<RecordId> = (0..6).map(|_| RecordId::new()).collect();
        let table = ProjectionTable::builtin();

        // expected membership and latest count since the last create
        let mut expected: BTreeMap<usize, Option<i64>> = BTreeMap::new();
        let mut state = empty_view();
        for step in &steps {
            match *step {
                Step::Create(slot) => {
                    expected.insert(slot, None);
                }
                Step::Update(slot, tag) => {
                    if let Some(count) = expected.get_mut(&slot) {
                        *count = Some(tag as i64);
                    }
                }
                Step::Destroy(slot) => {
                    expected.remove(&slot);
                }
            }
            state = fold(state, &record(*step, &ids), &table);
        }

        prop_assert_eq!(state.len(), expected.len());
        for (slot, count) in &expected {
            let item = state.get(&ids[*slot]);
            prop_assert!(item.is_some());
            let item = item.unwrap();
            let name = format!("Item {}", slot);
            prop_assert_eq!(item.name(), Some(name.as_str()));
            prop_assert_eq!(item.get("recordingsCount").and_then(Value::as_i64), *count);
        }
    }

    #[test]
    fn test_create_and_destroy_are_idempotent(
        steps in prop::collection::vec(step(), 0..30),
        last in step(),
    ) {
        let ids: Vec<RecordId> = (0..6).map(|_| RecordId::new()).collect();
        let table = ProjectionTable::builtin();
        let state = steps
            .iter()
            .fold(empty_view(), |state, step| fold(state, &record(*step, &ids), &table));

        let once = fold(state, &record(last, &ids), &table);
        let twice = fold(once.clone(), &record(last, &ids), &table);
        prop_assert_eq!(once, twice);
    }
}

#[test]
fn test_update_of_absent_item_is_a_noop() {
    let table = ProjectionTable::builtin();
    let present = RecordId::new();
    let state = fold(
        empty_view(),
        &TransactionRecord::new(
            EntityKind::Audio,
            Action::Create,
            present,
            Fields::from([("name".to_string(), Value::from("Kept"))]),
        ),
        &table,
    );

    let update = TransactionRecord::new(
        EntityKind::Audio,
        Action::Update,
        RecordId::new(),
        Fields::from([("name".to_string(), Value::from("Ghost"))]),
    );
    assert_eq!(fold(state.clone(), &update, &table), state);
}
