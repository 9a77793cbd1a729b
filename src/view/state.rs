use crate::core::{EntityKind, Fields, Record, RecordId, Value};
use crate::query::{Collator, FindQuery, OrderBy, SortDirection, SortKey, matches_filters, matches_text};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Sort choices offered by a list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOption {
    /// Store order; created items are prepended.
    Unsorted,
    NameAsc,
    NameDesc,
    #[default]
    UpdatedAtDesc,
    CreatedAtDesc,
    CreatedAtAsc,
    RecordingsDurationDesc,
    RecordingsCountDesc,
}

impl SortOption {
    pub const ALL: [SortOption; 8] = [
        Self::Unsorted,
        Self::NameAsc,
        Self::NameDesc,
        Self::UpdatedAtDesc,
        Self::CreatedAtDesc,
        Self::CreatedAtAsc,
        Self::RecordingsDurationDesc,
        Self::RecordingsCountDesc,
    ];

    fn key(&self) -> Option<(&'static str, SortDirection)> {
        match self {
            Self::Unsorted => None,
            Self::NameAsc => Some(("name", SortDirection::Asc)),
            Self::NameDesc => Some(("name", SortDirection::Desc)),
            Self::UpdatedAtDesc => Some(("updatedAt", SortDirection::Desc)),
            Self::CreatedAtDesc => Some(("createdAt", SortDirection::Desc)),
            Self::CreatedAtAsc => Some(("createdAt", SortDirection::Asc)),
            Self::RecordingsDurationDesc => Some(("recordingsDuration", SortDirection::Desc)),
            Self::RecordingsCountDesc => Some(("recordingsCount", SortDirection::Desc)),
        }
    }

    /// Text sorts are ordered by the collator on the client, not by the store.
    pub fn is_client_collated(&self) -> bool {
        matches!(self, Self::NameAsc | Self::NameDesc)
    }

    pub fn is_descending(&self) -> bool {
        self.key().is_some_and(|(_, direction)| direction.is_descending())
    }

    /// Ordering requested from the store.
    pub fn store_order(&self) -> Vec<OrderBy> {
        match self.key() {
            Some((field, direction)) if !self.is_client_collated() => vec![OrderBy::new(field, direction)],
            _ => Vec::new(),
        }
    }

    /// Local comparator used to place created items; empty for [`SortOption::Unsorted`].
    pub fn sort_keys(&self) -> Vec<SortKey> {
        let Some((field, direction)) = self.key() else {
            return Vec::new();
        };
        let key = SortKey::new(field, direction.is_descending());
        if self.is_client_collated() {
            vec![key.collated(Collator::new())]
        } else {
            vec![key]
        }
    }
}

/// Free-text query, equality filters and sort option of one view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewFilters {
    pub query: String,
    pub equality: Fields,
    pub sort: SortOption,
}

impl ViewFilters {
    pub fn normalized_query(&self) -> Option<String> {
        let trimmed = self.query.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
    }

    /// Whether `record` belongs in a view with these filters.
    pub fn admits(&self, record: &Record, search_columns: &[&str]) -> bool {
        matches_filters(record, &self.equality)
            && matches_text(record, self.normalized_query().as_deref(), search_columns)
    }

    pub fn to_find_query(&self, offset: usize, limit: usize) -> FindQuery {
        FindQuery {
            offset,
            limit: Some(limit),
            order: self.sort.store_order(),
            filters: self.equality.clone(),
            query: self.normalized_query(),
        }
    }
}

/// Locally cached, filtered, sorted and paginated slice of one entity kind.
///
/// `items` never holds two records with the same id. Their order is the one
/// set by the last fetch or client re-sort, not the arrival order of creates.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub kind: EntityKind,
    pub items: Vec<Record>,
    pub filters: ViewFilters,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
    pub stale_lookups: BTreeSet<EntityKind>,
}

impl ViewState {
    pub fn new(kind: EntityKind, limit: usize) -> Self {
        Self {
            kind,
            items: Vec::new(),
            filters: ViewFilters::default(),
            offset: 0,
            limit,
            has_more: false,
            stale_lookups: BTreeSet::new(),
        }
    }

    pub fn with_sort(mut self, sort: SortOption) -> Self {
        self.filters.sort = sort;
        self
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.equality.insert(field.into(), value.into());
        self
    }

    pub fn position(&self, id: &RecordId) -> Option<usize> {
        self.items.iter().position(|item| item.id == *id)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.items.iter().find(|item| item.id == *id)
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.items.iter().map(|item| item.id).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
